use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use shopledger_core::{
    DomainError, DomainResult, ItemId, PurchaseId, UserId, VendorId, checked_sum, line_total,
};

/// Payment status lifecycle. Monotonic: payments can only move it forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

impl PaymentStatus {
    /// Derive the status from how much of the total has been paid.
    pub fn derive(paid: Decimal, total: Decimal) -> Self {
        if paid.is_zero() {
            PaymentStatus::Unpaid
        } else if paid < total {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Paid
        }
    }
}

/// One purchased line: item, quantity, and the rates in force at purchase
/// time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub item_id: ItemId,
    pub quantity: Decimal,
    pub purchase_rate: Decimal,
    pub sale_rate: Decimal,
    pub expiry: Option<NaiveDate>,
    pub shelf_location: Option<String>,
}

impl PurchaseLine {
    pub fn line_total(&self) -> DomainResult<Decimal> {
        line_total(self.quantity, self.purchase_rate)
    }

    fn validate(&self) -> DomainResult<()> {
        if self.quantity <= Decimal::ZERO {
            return Err(DomainError::validation("line quantity must be positive"));
        }
        if self.purchase_rate < Decimal::ZERO || self.sale_rate < Decimal::ZERO {
            return Err(DomainError::validation("line rates cannot be negative"));
        }
        Ok(())
    }
}

/// A vendor-sourced stock-in document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    id: PurchaseId,
    /// Server-assigned sequence number (store-wide, monotonic).
    number: u64,
    vendor_id: VendorId,
    lines: Vec<PurchaseLine>,
    subtotal: Decimal,
    tax: Decimal,
    discount: Decimal,
    total: Decimal,
    payment_status: PaymentStatus,
    paid_amount: Decimal,
    purchase_date: NaiveDate,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    created_by: UserId,
}

impl Purchase {
    /// Build a validated purchase. Totals are always computed from the lines,
    /// never taken from the caller.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PurchaseId,
        number: u64,
        vendor_id: VendorId,
        lines: Vec<PurchaseLine>,
        tax: Decimal,
        discount: Decimal,
        paid_amount: Decimal,
        purchase_date: NaiveDate,
        notes: Option<String>,
        created_at: DateTime<Utc>,
        created_by: UserId,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation("purchase must have line items"));
        }
        for line in &lines {
            line.validate()?;
        }
        if tax < Decimal::ZERO || discount < Decimal::ZERO {
            return Err(DomainError::validation("tax and discount cannot be negative"));
        }
        if paid_amount < Decimal::ZERO {
            return Err(DomainError::validation("paid amount cannot be negative"));
        }

        let subtotal = checked_sum(
            lines
                .iter()
                .map(|l| l.line_total())
                .collect::<DomainResult<Vec<_>>>()?,
        )?;
        let total = subtotal + tax - discount;
        if total < Decimal::ZERO {
            return Err(DomainError::validation("purchase total cannot be negative"));
        }
        if paid_amount > total {
            return Err(DomainError::validation(
                "paid amount cannot exceed the purchase total",
            ));
        }

        Ok(Self {
            id,
            number,
            vendor_id,
            lines,
            subtotal,
            tax,
            discount,
            total,
            payment_status: PaymentStatus::derive(paid_amount, total),
            paid_amount,
            purchase_date,
            notes,
            created_at,
            created_by,
        })
    }

    pub fn id(&self) -> PurchaseId {
        self.id
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn vendor_id(&self) -> VendorId {
        self.vendor_id
    }

    pub fn lines(&self) -> &[PurchaseLine] {
        &self.lines
    }

    pub fn subtotal(&self) -> Decimal {
        self.subtotal
    }

    pub fn tax(&self) -> Decimal {
        self.tax
    }

    pub fn discount(&self) -> Decimal {
        self.discount
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn paid_amount(&self) -> Decimal {
        self.paid_amount
    }

    /// `total - paid`; never negative while the invariants hold.
    pub fn pending_amount(&self) -> Decimal {
        self.total - self.paid_amount
    }

    pub fn purchase_date(&self) -> NaiveDate {
        self.purchase_date
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    /// Register a vendor payment against this purchase. `paid_amount` only
    /// ever grows; overpaying is rejected.
    pub fn register_payment(&mut self, amount: Decimal) -> DomainResult<()> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        if amount > self.pending_amount() {
            return Err(DomainError::invariant(format!(
                "payment {} exceeds pending amount {}",
                amount,
                self.pending_amount()
            )));
        }

        self.paid_amount += amount;
        self.payment_status = PaymentStatus::derive(self.paid_amount, self.total);
        Ok(())
    }

    /// Blind paid-amount increment, offline fallback path only. The status is
    /// re-derived; no pending-amount check is possible in degraded mode.
    pub fn apply_payment_increment(&mut self, amount: Decimal) {
        self.paid_amount += amount;
        self.payment_status = PaymentStatus::derive(self.paid_amount, self.total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(qty: i64, rate_cents: i64) -> PurchaseLine {
        PurchaseLine {
            item_id: ItemId::new(),
            quantity: Decimal::new(qty, 0),
            purchase_rate: Decimal::new(rate_cents, 2),
            sale_rate: Decimal::new(rate_cents + 100, 2),
            expiry: None,
            shelf_location: None,
        }
    }

    fn purchase(lines: Vec<PurchaseLine>, paid_cents: i64) -> DomainResult<Purchase> {
        Purchase::new(
            PurchaseId::new(),
            1,
            VendorId::new(),
            lines,
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::new(paid_cents, 2),
            Utc::now().date_naive(),
            None,
            Utc::now(),
            UserId::new(),
        )
    }

    #[test]
    fn totals_are_computed_from_lines() {
        let p = purchase(vec![line(10, 500), line(2, 250)], 0).unwrap();
        assert_eq!(p.subtotal(), Decimal::new(5_500, 2));
        assert_eq!(p.total(), Decimal::new(5_500, 2));
        assert_eq!(p.pending_amount(), Decimal::new(5_500, 2));
        assert_eq!(p.payment_status(), PaymentStatus::Unpaid);
    }

    #[test]
    fn payments_advance_status_monotonically() {
        let mut p = purchase(vec![line(10, 500)], 0).unwrap();
        assert_eq!(p.payment_status(), PaymentStatus::Unpaid);

        p.register_payment(Decimal::new(2_000, 2)).unwrap();
        assert_eq!(p.payment_status(), PaymentStatus::Partial);

        p.register_payment(Decimal::new(3_000, 2)).unwrap();
        assert_eq!(p.payment_status(), PaymentStatus::Paid);
        assert_eq!(p.pending_amount(), Decimal::ZERO);
    }

    #[test]
    fn overpayment_is_rejected() {
        let mut p = purchase(vec![line(1, 500)], 0).unwrap();
        let err = p.register_payment(Decimal::new(600, 2)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(p.paid_amount(), Decimal::ZERO);
    }

    #[test]
    fn paid_above_total_at_creation_is_rejected() {
        let err = purchase(vec![line(1, 500)], 600).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn empty_line_set_is_rejected() {
        let err = purchase(vec![], 0).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: however payments are sliced, `paid_amount` never
        /// decreases, `pending = total - paid` holds, and the status never
        /// moves backwards.
        #[test]
        fn payment_status_never_regresses(
            payments in prop::collection::vec(1i64..2_000, 0..12)
        ) {
            let mut p = purchase(vec![line(10, 1_000)], 0).unwrap();

            let mut last_paid = Decimal::ZERO;
            let mut reached_partial = false;
            let mut reached_paid = false;

            for cents in payments {
                let amount = Decimal::new(cents, 2);
                if p.register_payment(amount).is_ok() {
                    prop_assert!(p.paid_amount() > last_paid);
                    last_paid = p.paid_amount();
                }

                prop_assert_eq!(p.pending_amount(), p.total() - p.paid_amount());
                prop_assert!(p.pending_amount() >= Decimal::ZERO);

                match p.payment_status() {
                    PaymentStatus::Unpaid => {
                        prop_assert!(!reached_partial && !reached_paid);
                    }
                    PaymentStatus::Partial => {
                        prop_assert!(!reached_paid);
                        reached_partial = true;
                    }
                    PaymentStatus::Paid => reached_paid = true,
                }
            }
        }
    }
}
