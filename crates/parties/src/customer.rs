use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use shopledger_core::{CustomerId, DomainError, DomainResult, UserId};

use crate::ledger::ContactInfo;

/// A customer with a running balance (credit sales, charges, payments).
///
/// `outstanding_balance` is what the customer owes the business; the
/// authoritative value is the fold of the customer's balance ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    id: CustomerId,
    name: String,
    contact: ContactInfo,
    outstanding_balance: Decimal,
    total_purchases: Decimal,
    active: bool,
    created_at: DateTime<Utc>,
    created_by: UserId,
}

impl Customer {
    pub fn new(
        id: CustomerId,
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

    pub fn id(&self) -> CustomerId {
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

    /// Record a credit sale: the full total is owed and accrues to the
    /// lifetime aggregate.
    pub fn record_credit_sale(&mut self, total: Decimal) -> DomainResult<()> {
        if total <= Decimal::ZERO {
            return Err(DomainError::validation("sale total must be positive"));
        }

        self.outstanding_balance += total;
        self.total_purchases += total;
        Ok(())
    }

    /// Record a standalone charge (raises what the customer owes).
    pub fn apply_charge(&mut self, amount: Decimal) -> DomainResult<()> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::validation("charge amount must be positive"));
        }

        self.outstanding_balance += amount;
        Ok(())
    }

    /// Record a payment received from this customer.
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

    fn test_customer() -> Customer {
        Customer::new(
            CustomerId::new(),
            "Walk-in Regular",
            ContactInfo::default(),
            Utc::now(),
            UserId::new(),
        )
        .unwrap()
    }

    #[test]
    fn credit_sale_raises_balance_and_lifetime_total() {
        let mut customer = test_customer();
        customer.record_credit_sale(Decimal::new(7_500, 2)).unwrap();

        assert_eq!(customer.outstanding_balance(), Decimal::new(7_500, 2));
        assert_eq!(customer.total_purchases(), Decimal::new(7_500, 2));
    }

    #[test]
    fn payment_reduces_balance_but_not_lifetime_total() {
        let mut customer = test_customer();
        customer.record_credit_sale(Decimal::new(7_500, 2)).unwrap();
        customer.apply_payment(Decimal::new(2_500, 2)).unwrap();

        assert_eq!(customer.outstanding_balance(), Decimal::new(5_000, 2));
        assert_eq!(customer.total_purchases(), Decimal::new(7_500, 2));
    }

    #[test]
    fn charge_does_not_count_as_a_purchase() {
        let mut customer = test_customer();
        customer.apply_charge(Decimal::new(1_000, 2)).unwrap();

        assert_eq!(customer.outstanding_balance(), Decimal::new(1_000, 2));
        assert_eq!(customer.total_purchases(), Decimal::ZERO);
    }
}
