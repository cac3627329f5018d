use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use shopledger_core::{
    CustomerId, DomainError, DomainResult, PaymentId, PaymentMethod, UserId, VendorId,
};

/// Contact information for a counterparty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// A vendor or customer — the two parties a running balance is kept with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "party", content = "id", rename_all = "snake_case")]
pub enum CounterpartyRef {
    Vendor(VendorId),
    Customer(CustomerId),
}

impl core::fmt::Display for CounterpartyRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CounterpartyRef::Vendor(id) => write!(f, "vendor/{id}"),
            CounterpartyRef::Customer(id) => write!(f, "customer/{id}"),
        }
    }
}

/// Effect of a balance ledger entry.
///
/// `Charge` increases the counterparty's outstanding balance (purchases on
/// credit, customer charges); `Payment` decreases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceEntryKind {
    Payment,
    Charge,
}

/// Immutable record of one balance-affecting event. Never mutated after
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub id: PaymentId,
    pub counterparty: CounterpartyRef,
    pub kind: BalanceEntryKind,
    /// Always positive; the kind carries the sign.
    pub amount: Decimal,
    /// `None` for charges driven by business documents (e.g. a purchase's
    /// pending amount).
    pub method: Option<PaymentMethod>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub entry_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
}

impl BalanceEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        counterparty: CounterpartyRef,
        kind: BalanceEntryKind,
        amount: Decimal,
        method: Option<PaymentMethod>,
        reference: Option<String>,
        notes: Option<String>,
        entry_date: NaiveDate,
        created_at: DateTime<Utc>,
        created_by: UserId,
    ) -> DomainResult<Self> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::validation("amount must be positive"));
        }

        Ok(Self {
            id: PaymentId::new(),
            counterparty,
            kind,
            amount,
            method,
            reference,
            notes,
            entry_date,
            created_at,
            created_by,
        })
    }

    /// Amount with the kind's sign applied (charges positive, payments
    /// negative).
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            BalanceEntryKind::Charge => self.amount,
            BalanceEntryKind::Payment => -self.amount,
        }
    }
}

/// Authoritative balance for one counterparty: the signed fold of its ledger
/// entries. Entries for other counterparties are ignored.
pub fn compute_balance<'a>(
    counterparty: CounterpartyRef,
    entries: impl IntoIterator<Item = &'a BalanceEntry>,
) -> Decimal {
    entries
        .into_iter()
        .filter(|e| e.counterparty == counterparty)
        .map(BalanceEntry::signed_amount)
        .sum()
}

/// Deletion is allowed only once the (recomputed) balance is settled, within
/// `epsilon` to absorb floating rounding.
pub fn balance_clears_deletion(balance: Decimal, epsilon: Decimal) -> bool {
    balance.abs() <= epsilon
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(counterparty: CounterpartyRef, kind: BalanceEntryKind, cents: i64) -> BalanceEntry {
        BalanceEntry::new(
            counterparty,
            kind,
            Decimal::new(cents, 2),
            Some(PaymentMethod::Cash),
            None,
            None,
            Utc::now().date_naive(),
            Utc::now(),
            UserId::new(),
        )
        .unwrap()
    }

    #[test]
    fn charges_minus_payments() {
        let vendor = CounterpartyRef::Vendor(VendorId::new());
        let entries = vec![
            entry(vendor, BalanceEntryKind::Charge, 20_000),
            entry(vendor, BalanceEntryKind::Payment, 5_000),
            entry(
                CounterpartyRef::Vendor(VendorId::new()),
                BalanceEntryKind::Charge,
                99_900,
            ),
        ];

        assert_eq!(compute_balance(vendor, &entries), Decimal::new(15_000, 2));
    }

    #[test]
    fn zero_amount_entries_are_rejected() {
        let err = BalanceEntry::new(
            CounterpartyRef::Customer(CustomerId::new()),
            BalanceEntryKind::Payment,
            Decimal::ZERO,
            None,
            None,
            None,
            Utc::now().date_naive(),
            Utc::now(),
            UserId::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn deletion_gate_tolerates_epsilon() {
        let eps = Decimal::ONE;
        assert!(balance_clears_deletion(Decimal::new(99, 2), eps));
        assert!(balance_clears_deletion(Decimal::new(-100, 2), eps));
        assert!(!balance_clears_deletion(Decimal::new(150, 2), eps));
    }
}
