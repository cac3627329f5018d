use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use shopledger_core::{DomainError, DomainResult, UserId, VendorId};

use crate::ledger::ContactInfo;

/// A supplier the business buys stock from.
///
/// `outstanding_balance` is the denormalized running total of what the
/// business owes this vendor; the authoritative value is the fold of the
/// vendor's balance ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    id: VendorId,
    name: String,
    contact: ContactInfo,
    outstanding_balance: Decimal,
    total_purchases: Decimal,
    active: bool,
    created_at: DateTime<Utc>,
    created_by: UserId,
}

impl Vendor {
    pub fn new(
        id: VendorId,
        name: impl Into<String>,
        contact: ContactInfo,
        created_at: DateTime<Utc>,
        created_by: UserId,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(Self {
            id,
            name,
            contact,
            outstanding_balance: Decimal::ZERO,
            total_purchases: Decimal::ZERO,
            active: true,
            created_at,
            created_by,
        })
    }

    pub fn id(&self) -> VendorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    /// Denormalized balance (fast path).
    pub fn outstanding_balance(&self) -> Decimal {
        self.outstanding_balance
    }

    /// Lifetime purchase volume. Never decremented.
    pub fn total_purchases(&self) -> Decimal {
        self.total_purchases
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Record a purchase: the unpaid portion raises the balance, the full
    /// total accrues to the lifetime aggregate.
    pub fn record_purchase(&mut self, total: Decimal, pending: Decimal) -> DomainResult<()> {
        if total < Decimal::ZERO {
            return Err(DomainError::validation("purchase total cannot be negative"));
        }
        if pending < Decimal::ZERO || pending > total {
            return Err(DomainError::invariant(
                "pending amount must lie between zero and the purchase total",
            ));
        }

        self.outstanding_balance += pending;
        self.total_purchases += total;
        Ok(())
    }

    /// Record a payment made to this vendor.
    pub fn apply_payment(&mut self, amount: Decimal) -> DomainResult<()> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::validation("payment amount must be positive"));
        }

        self.outstanding_balance -= amount;
        Ok(())
    }

    /// Blind balance increment, offline fallback path only.
    pub fn apply_increment(&mut self, balance_delta: Decimal, purchases_delta: Decimal) {
        self.outstanding_balance += balance_delta;
        self.total_purchases += purchases_delta;
    }

    /// Overwrite the denormalized balance (reconciliation only).
    pub fn overwrite_balance(&mut self, balance: Decimal) {
        self.outstanding_balance = balance;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vendor() -> Vendor {
        Vendor::new(
            VendorId::new(),
            "Acme Wholesale",
            ContactInfo::default(),
            Utc::now(),
            UserId::new(),
        )
        .unwrap()
    }

    #[test]
    fn purchase_raises_balance_by_pending_only() {
        let mut vendor = test_vendor();
        vendor
            .record_purchase(Decimal::new(10_000, 2), Decimal::new(4_000, 2))
            .unwrap();

        assert_eq!(vendor.outstanding_balance(), Decimal::new(4_000, 2));
        assert_eq!(vendor.total_purchases(), Decimal::new(10_000, 2));
    }

    #[test]
    fn payment_reduces_balance() {
        let mut vendor = test_vendor();
        vendor
            .record_purchase(Decimal::new(20_000, 2), Decimal::new(20_000, 2))
            .unwrap();
        vendor.apply_payment(Decimal::new(5_000, 2)).unwrap();

        assert_eq!(vendor.outstanding_balance(), Decimal::new(15_000, 2));
    }

    #[test]
    fn pending_above_total_is_an_invariant_violation() {
        let mut vendor = test_vendor();
        let err = vendor
            .record_purchase(Decimal::new(100, 2), Decimal::new(200, 2))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
