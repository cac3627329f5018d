use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use shopledger_core::{CategoryId, DomainError, DomainResult, ItemId, UserId, line_total};
use shopledger_journal::StockSummary;

/// A stocked product.
///
/// `current_quantity` and `average_unit_cost` are denormalized copies of what
/// the journal derives; they must equal the journal fold after any committed
/// sequence of atomic operations, modulo reconciliation lag on the offline
/// path. The two lifetime counters are the inputs of the lifetime
/// weighted-average cost, kept here so the average stays updatable in O(1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    name: String,
    category: Option<CategoryId>,
    unit: String,
    current_quantity: Decimal,
    average_unit_cost: Decimal,
    lifetime_in_quantity: Decimal,
    lifetime_in_value: Decimal,
    purchase_rate: Decimal,
    sale_rate: Decimal,
    archived: bool,
    created_at: DateTime<Utc>,
    created_by: UserId,
}

/// Increment-style counter update, used by the offline fallback path instead
/// of read-modify-write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDelta {
    pub quantity: Decimal,
    pub stock_in_quantity: Decimal,
    pub stock_in_value: Decimal,
    pub purchase_rate: Option<Decimal>,
    pub sale_rate: Option<Decimal>,
}

impl StockDelta {
    /// Delta for a stock-in of `quantity` at `unit_cost`.
    pub fn stock_in(quantity: Decimal, unit_cost: Decimal) -> DomainResult<Self> {
        Ok(Self {
            quantity,
            stock_in_quantity: quantity,
            stock_in_value: line_total(quantity, unit_cost)?,
            purchase_rate: None,
            sale_rate: None,
        })
    }

    /// Delta for a stock-out of `quantity`.
    pub fn stock_out(quantity: Decimal) -> Self {
        Self {
            quantity: -quantity,
            stock_in_quantity: Decimal::ZERO,
            stock_in_value: Decimal::ZERO,
            purchase_rate: None,
            sale_rate: None,
        }
    }

    pub fn with_rates(mut self, purchase_rate: Decimal, sale_rate: Decimal) -> Self {
        self.purchase_rate = Some(purchase_rate);
        self.sale_rate = Some(sale_rate);
        self
    }
}

impl Item {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ItemId,
        name: impl Into<String>,
        category: Option<CategoryId>,
        unit: impl Into<String>,
        purchase_rate: Decimal,
        sale_rate: Decimal,
        created_at: DateTime<Utc>,
        created_by: UserId,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if purchase_rate < Decimal::ZERO || sale_rate < Decimal::ZERO {
            return Err(DomainError::validation("rates cannot be negative"));
        }

        Ok(Self {
            id,
            name,
            category,
            unit: unit.into(),
            current_quantity: Decimal::ZERO,
            average_unit_cost: Decimal::ZERO,
            lifetime_in_quantity: Decimal::ZERO,
            lifetime_in_value: Decimal::ZERO,
            purchase_rate,
            sale_rate,
            archived: false,
            created_at,
            created_by,
        })
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Option<CategoryId> {
        self.category
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Denormalized quantity (fast path). May be negative after drift; use
    /// [`Item::display_quantity`] for UI surfaces.
    pub fn current_quantity(&self) -> Decimal {
        self.current_quantity
    }

    /// Quantity clamped at a floor of zero for display.
    pub fn display_quantity(&self) -> Decimal {
        self.current_quantity.max(Decimal::ZERO)
    }

    pub fn average_unit_cost(&self) -> Decimal {
        self.average_unit_cost
    }

    pub fn purchase_rate(&self) -> Decimal {
        self.purchase_rate
    }

    pub fn sale_rate(&self) -> Decimal {
        self.sale_rate
    }

    pub fn is_archived(&self) -> bool {
        self.archived
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    /// Record incoming stock: bumps the quantity and folds the cost into the
    /// lifetime weighted average.
    pub fn apply_stock_in(&mut self, quantity: Decimal, unit_cost: Decimal) -> DomainResult<()> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if unit_cost < Decimal::ZERO {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }

        let value = line_total(quantity, unit_cost)?;
        self.current_quantity += quantity;
        self.lifetime_in_quantity += quantity;
        self.lifetime_in_value += value;
        self.recompute_average();
        Ok(())
    }

    /// Record outgoing stock. The caller is responsible for the no-oversell
    /// business decision; this guard is the last line of defense.
    pub fn apply_stock_out(&mut self, quantity: Decimal) -> DomainResult<()> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if quantity > self.current_quantity {
            return Err(DomainError::invariant(format!(
                "stock cannot go negative (available {}, requested {})",
                self.current_quantity, quantity
            )));
        }

        self.current_quantity -= quantity;
        Ok(())
    }

    pub fn update_purchase_rate(&mut self, rate: Decimal) -> DomainResult<()> {
        if rate < Decimal::ZERO {
            return Err(DomainError::validation("purchase rate cannot be negative"));
        }
        self.purchase_rate = rate;
        Ok(())
    }

    pub fn update_sale_rate(&mut self, rate: Decimal) -> DomainResult<()> {
        if rate < Decimal::ZERO {
            return Err(DomainError::validation("sale rate cannot be negative"));
        }
        self.sale_rate = rate;
        Ok(())
    }

    /// Blind counter increment, used only on the offline fallback path where
    /// no conditional checks are possible.
    pub fn apply_increment(&mut self, delta: &StockDelta) {
        self.current_quantity += delta.quantity;
        self.lifetime_in_quantity += delta.stock_in_quantity;
        self.lifetime_in_value += delta.stock_in_value;
        if let Some(rate) = delta.purchase_rate {
            self.purchase_rate = rate;
        }
        if let Some(rate) = delta.sale_rate {
            self.sale_rate = rate;
        }
        self.recompute_average();
    }

    /// Overwrite the denormalized counters from a journal-derived summary
    /// (reconciliation only).
    pub fn overwrite_from_summary(&mut self, summary: &StockSummary) {
        self.current_quantity = summary.raw_quantity();
        self.lifetime_in_quantity = summary.stock_in_quantity();
        self.lifetime_in_value = summary.stock_in_value();
        self.recompute_average();
    }

    /// True when the denormalized counters already agree with `summary`.
    pub fn matches_summary(&self, summary: &StockSummary) -> bool {
        self.current_quantity == summary.raw_quantity()
            && self.lifetime_in_quantity == summary.stock_in_quantity()
            && self.lifetime_in_value == summary.stock_in_value()
    }

    /// Items referenced by journal entries are archived, never deleted.
    pub fn archive(&mut self) {
        self.archived = true;
    }

    fn recompute_average(&mut self) {
        self.average_unit_cost = if self.lifetime_in_quantity.is_zero() {
            Decimal::ZERO
        } else {
            self.lifetime_in_value / self.lifetime_in_quantity
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_item() -> Item {
        Item::new(
            ItemId::new(),
            "Basmati Rice 5kg",
            None,
            "bag",
            Decimal::new(500, 2),
            Decimal::new(650, 2),
            Utc::now(),
            UserId::new(),
        )
        .unwrap()
    }

    #[test]
    fn stock_in_updates_quantity_and_average() {
        let mut item = test_item();
        item.apply_stock_in(Decimal::new(10, 0), Decimal::new(500, 2))
            .unwrap();
        item.apply_stock_in(Decimal::new(10, 0), Decimal::new(700, 2))
            .unwrap();

        assert_eq!(item.current_quantity(), Decimal::new(20, 0));
        assert_eq!(item.average_unit_cost(), Decimal::new(600, 2));
    }

    #[test]
    fn stock_out_does_not_move_average() {
        let mut item = test_item();
        item.apply_stock_in(Decimal::new(10, 0), Decimal::new(500, 2))
            .unwrap();
        item.apply_stock_out(Decimal::new(6, 0)).unwrap();

        assert_eq!(item.current_quantity(), Decimal::new(4, 0));
        assert_eq!(item.average_unit_cost(), Decimal::new(500, 2));
    }

    #[test]
    fn stock_out_beyond_available_is_rejected() {
        let mut item = test_item();
        item.apply_stock_in(Decimal::new(3, 0), Decimal::new(500, 2))
            .unwrap();

        let err = item.apply_stock_out(Decimal::new(5, 0)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(item.current_quantity(), Decimal::new(3, 0));
    }

    #[test]
    fn increment_path_skips_conditional_checks() {
        let mut item = test_item();
        // Degraded mode may drive the counter negative; reconciliation is the
        // backstop.
        item.apply_increment(&StockDelta::stock_out(Decimal::new(2, 0)));
        assert_eq!(item.current_quantity(), Decimal::new(-2, 0));
        assert_eq!(item.display_quantity(), Decimal::ZERO);
    }

    #[test]
    fn archive_flags_without_destroying_counters() {
        let mut item = test_item();
        item.apply_stock_in(Decimal::new(7, 0), Decimal::new(500, 2))
            .unwrap();
        item.archive();

        assert!(item.is_archived());
        assert_eq!(item.current_quantity(), Decimal::new(7, 0));
    }

    #[test]
    fn overwrite_from_summary_restores_consistency() {
        use shopledger_journal::{JournalEntry, SourceRef, StockDirection, StockSummary};

        let mut item = test_item();
        let entries = vec![
            JournalEntry::new(
                item.id(),
                StockDirection::StockIn,
                Decimal::new(42, 0),
                Decimal::new(500, 2),
                Utc::now().date_naive(),
                None,
                SourceRef::Adjustment,
                None,
                Utc::now(),
                UserId::new(),
            )
            .unwrap(),
        ];
        let summary = StockSummary::from_entries(item.id(), &entries);

        item.apply_increment(&StockDelta::stock_out(Decimal::new(999, 0)));
        assert!(!item.matches_summary(&summary));

        item.overwrite_from_summary(&summary);
        assert!(item.matches_summary(&summary));
        assert_eq!(item.current_quantity(), Decimal::new(42, 0));
    }
}
