use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use shopledger_core::{
    DomainError, DomainResult, EntryId, ItemId, PurchaseId, ReturnId, SaleId, UserId, line_total,
};

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockDirection {
    StockIn,
    StockOut,
}

impl StockDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            StockDirection::StockIn => "stock_in",
            StockDirection::StockOut => "stock_out",
        }
    }
}

impl core::fmt::Display for StockDirection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference back to the business document that caused a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SourceRef {
    Purchase(PurchaseId),
    Sale(SaleId),
    Return(ReturnId),
    /// Manual stock correction by an operator.
    Adjustment,
}

/// Immutable record of one stock movement.
///
/// Once created this is never mutated or deleted; a wrong entry is corrected
/// by appending an offsetting one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: EntryId,
    pub item_id: ItemId,
    pub direction: StockDirection,
    /// Always positive; the direction carries the sign.
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_value: Decimal,
    pub movement_date: NaiveDate,
    pub counterparty_name: Option<String>,
    pub source: SourceRef,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
}

impl JournalEntry {
    /// Build a validated entry. `total_value` is always computed, never taken
    /// from the caller.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        item_id: ItemId,
        direction: StockDirection,
        quantity: Decimal,
        unit_price: Decimal,
        movement_date: NaiveDate,
        counterparty_name: Option<String>,
        source: SourceRef,
        notes: Option<String>,
        created_at: DateTime<Utc>,
        created_by: UserId,
    ) -> DomainResult<Self> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if unit_price < Decimal::ZERO {
            return Err(DomainError::validation("unit price cannot be negative"));
        }

        let total_value = line_total(quantity, unit_price)?;

        Ok(Self {
            id: EntryId::new(),
            item_id,
            direction,
            quantity,
            unit_price,
            total_value,
            movement_date,
            counterparty_name,
            source,
            notes,
            created_at,
            created_by,
        })
    }

    /// Quantity with the direction's sign applied (`stock_in` positive,
    /// `stock_out` negative).
    pub fn signed_quantity(&self) -> Decimal {
        match self.direction {
            StockDirection::StockIn => self.quantity,
            StockDirection::StockOut => -self.quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_entry(direction: StockDirection, quantity: i64, price_cents: i64) -> JournalEntry {
        JournalEntry::new(
            ItemId::new(),
            direction,
            Decimal::new(quantity, 0),
            Decimal::new(price_cents, 2),
            Utc::now().date_naive(),
            Some("Acme Wholesale".to_string()),
            SourceRef::Adjustment,
            None,
            Utc::now(),
            UserId::new(),
        )
        .unwrap()
    }

    #[test]
    fn computes_total_value() {
        let entry = test_entry(StockDirection::StockIn, 10, 500);
        assert_eq!(entry.total_value, Decimal::new(5000, 2));
    }

    #[test]
    fn stock_out_carries_negative_sign() {
        let entry = test_entry(StockDirection::StockOut, 4, 500);
        assert_eq!(entry.signed_quantity(), Decimal::new(-4, 0));
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let err = JournalEntry::new(
            ItemId::new(),
            StockDirection::StockIn,
            Decimal::ZERO,
            Decimal::ONE,
            Utc::now().date_naive(),
            None,
            SourceRef::Adjustment,
            None,
            Utc::now(),
            UserId::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
