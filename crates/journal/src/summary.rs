use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use shopledger_core::ItemId;

use crate::entry::{JournalEntry, StockDirection};

/// Authoritative stock figures derived from a full journal scan.
///
/// This is the correctness oracle for an item's denormalized counters: an
/// O(n) fold over the item's journal entries, used by reconciliation rather
/// than the per-request hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSummary {
    quantity: Decimal,
    stock_in_quantity: Decimal,
    stock_in_value: Decimal,
}

impl StockSummary {
    /// Fold the entries that reference `item_id`. Entries for other items are
    /// ignored so a mixed slice can be summarized safely.
    pub fn from_entries<'a>(
        item_id: ItemId,
        entries: impl IntoIterator<Item = &'a JournalEntry>,
    ) -> Self {
        let mut quantity = Decimal::ZERO;
        let mut stock_in_quantity = Decimal::ZERO;
        let mut stock_in_value = Decimal::ZERO;

        for entry in entries {
            if entry.item_id != item_id {
                continue;
            }
            quantity += entry.signed_quantity();
            if entry.direction == StockDirection::StockIn {
                stock_in_quantity += entry.quantity;
                stock_in_value += entry.total_value;
            }
        }

        Self {
            quantity,
            stock_in_quantity,
            stock_in_value,
        }
    }

    /// Signed sum of all movements. Negative values indicate a data
    /// integrity problem and are surfaced, not hidden.
    pub fn raw_quantity(&self) -> Decimal {
        self.quantity
    }

    /// Quantity clamped at a floor of zero, for display.
    pub fn display_quantity(&self) -> Decimal {
        self.quantity.max(Decimal::ZERO)
    }

    /// True when the journal sums below zero — more stock left than ever
    /// arrived.
    pub fn is_negative(&self) -> bool {
        self.quantity < Decimal::ZERO
    }

    /// Lifetime weighted-average unit cost: total cost of all stock-in
    /// divided by total quantity of all stock-in. Zero when nothing has ever
    /// been received. This formula is deliberate — it is not FIFO/LIFO.
    pub fn average_unit_cost(&self) -> Decimal {
        if self.stock_in_quantity.is_zero() {
            Decimal::ZERO
        } else {
            self.stock_in_value / self.stock_in_quantity
        }
    }

    /// Total quantity ever received (stock-in only).
    pub fn stock_in_quantity(&self) -> Decimal {
        self.stock_in_quantity
    }

    /// Total value ever received (stock-in only).
    pub fn stock_in_value(&self) -> Decimal {
        self.stock_in_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::SourceRef;
    use chrono::Utc;
    use proptest::prelude::*;
    use shopledger_core::UserId;

    fn entry(item_id: ItemId, direction: StockDirection, qty: i64, price_cents: i64) -> JournalEntry {
        JournalEntry::new(
            item_id,
            direction,
            Decimal::new(qty, 0),
            Decimal::new(price_cents, 2),
            Utc::now().date_naive(),
            None,
            SourceRef::Adjustment,
            None,
            Utc::now(),
            UserId::new(),
        )
        .unwrap()
    }

    #[test]
    fn sums_signed_quantities() {
        let item_id = ItemId::new();
        let entries = vec![
            entry(item_id, StockDirection::StockIn, 10, 500),
            entry(item_id, StockDirection::StockOut, 3, 700),
            entry(item_id, StockDirection::StockIn, 5, 600),
        ];

        let summary = StockSummary::from_entries(item_id, &entries);
        assert_eq!(summary.raw_quantity(), Decimal::new(12, 0));
        assert!(!summary.is_negative());
    }

    #[test]
    fn average_cost_is_lifetime_weighted_over_stock_in_only() {
        let item_id = ItemId::new();
        let entries = vec![
            // 10 @ 5.00 and 10 @ 7.00 in; sales do not move the average.
            entry(item_id, StockDirection::StockIn, 10, 500),
            entry(item_id, StockDirection::StockIn, 10, 700),
            entry(item_id, StockDirection::StockOut, 15, 900),
        ];

        let summary = StockSummary::from_entries(item_id, &entries);
        assert_eq!(summary.average_unit_cost(), Decimal::new(600, 2));
    }

    #[test]
    fn negative_total_is_surfaced_and_clamped_for_display() {
        let item_id = ItemId::new();
        let entries = vec![
            entry(item_id, StockDirection::StockIn, 2, 500),
            entry(item_id, StockDirection::StockOut, 5, 500),
        ];

        let summary = StockSummary::from_entries(item_id, &entries);
        assert!(summary.is_negative());
        assert_eq!(summary.raw_quantity(), Decimal::new(-3, 0));
        assert_eq!(summary.display_quantity(), Decimal::ZERO);
    }

    #[test]
    fn ignores_entries_for_other_items() {
        let item_id = ItemId::new();
        let entries = vec![
            entry(item_id, StockDirection::StockIn, 4, 500),
            entry(ItemId::new(), StockDirection::StockIn, 99, 500),
        ];

        let summary = StockSummary::from_entries(item_id, &entries);
        assert_eq!(summary.raw_quantity(), Decimal::new(4, 0));
    }

    #[test]
    fn empty_journal_yields_zeroes() {
        let summary = StockSummary::from_entries(ItemId::new(), &[]);
        assert_eq!(summary.raw_quantity(), Decimal::ZERO);
        assert_eq!(summary.average_unit_cost(), Decimal::ZERO);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the summary quantity always equals the signed fold of
        /// the same entries, and the average cost only depends on stock-in.
        #[test]
        fn summary_matches_signed_fold(
            movements in prop::collection::vec((any::<bool>(), 1i64..1_000, 1i64..100_000), 0..40)
        ) {
            let item_id = ItemId::new();
            let entries: Vec<JournalEntry> = movements
                .iter()
                .map(|&(incoming, qty, price)| {
                    let direction = if incoming {
                        StockDirection::StockIn
                    } else {
                        StockDirection::StockOut
                    };
                    entry(item_id, direction, qty, price)
                })
                .collect();

            let summary = StockSummary::from_entries(item_id, &entries);

            let expected: Decimal = entries.iter().map(JournalEntry::signed_quantity).sum();
            prop_assert_eq!(summary.raw_quantity(), expected);

            let in_qty: Decimal = entries
                .iter()
                .filter(|e| e.direction == StockDirection::StockIn)
                .map(|e| e.quantity)
                .sum();
            prop_assert_eq!(summary.stock_in_quantity(), in_qty);

            if in_qty.is_zero() {
                prop_assert_eq!(summary.average_unit_cost(), Decimal::ZERO);
            }
        }
    }
}
