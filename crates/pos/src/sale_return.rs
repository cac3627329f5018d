use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use shopledger_core::{
    DomainError, DomainResult, ItemId, PaymentMethod, ReturnId, SaleId, UserId, checked_sum,
    line_total,
};

use crate::sale::PosTransaction;

/// One returned line. `unit_price` is the price at which the line was sold,
/// which is what the refund is computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLine {
    pub item_id: ItemId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl ReturnLine {
    pub fn line_total(&self) -> DomainResult<Decimal> {
        line_total(self.quantity, self.unit_price)
    }
}

/// Record of a partial or full reversal of a prior sale. The original
/// transaction is never edited; it is marked `returned` only once fully
/// covered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosReturn {
    id: ReturnId,
    sale_id: SaleId,
    lines: Vec<ReturnLine>,
    refund_method: PaymentMethod,
    reason: Option<String>,
    total_refund: Decimal,
    created_at: DateTime<Utc>,
    created_by: UserId,
}

impl PosReturn {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ReturnId,
        sale_id: SaleId,
        lines: Vec<ReturnLine>,
        refund_method: PaymentMethod,
        reason: Option<String>,
        created_at: DateTime<Utc>,
        created_by: UserId,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation("return must have line items"));
        }
        for line in &lines {
            if line.quantity <= Decimal::ZERO {
                return Err(DomainError::validation("returned quantity must be positive"));
            }
            if line.unit_price < Decimal::ZERO {
                return Err(DomainError::validation("unit price cannot be negative"));
            }
        }

        let total_refund = checked_sum(
            lines
                .iter()
                .map(|l| l.line_total())
                .collect::<DomainResult<Vec<_>>>()?,
        )?;

        Ok(Self {
            id,
            sale_id,
            lines,
            refund_method,
            reason,
            total_refund,
            created_at,
            created_by,
        })
    }

    pub fn id(&self) -> ReturnId {
        self.id
    }

    pub fn sale_id(&self) -> SaleId {
        self.sale_id
    }

    pub fn lines(&self) -> &[ReturnLine] {
        &self.lines
    }

    pub fn refund_method(&self) -> PaymentMethod {
        self.refund_method
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn total_refund(&self) -> Decimal {
        self.total_refund
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }
}

/// Per item, how much of the original sale is still returnable after the
/// returns recorded so far.
pub fn remaining_returnable(
    sale: &PosTransaction,
    prior_returns: &[PosReturn],
) -> HashMap<ItemId, Decimal> {
    let mut remaining: HashMap<ItemId, Decimal> = HashMap::new();
    for line in sale.lines() {
        *remaining.entry(line.item_id).or_default() += line.quantity;
    }
    for ret in prior_returns {
        if ret.sale_id() != sale.id() {
            continue;
        }
        for line in ret.lines() {
            if let Some(qty) = remaining.get_mut(&line.item_id) {
                *qty -= line.quantity;
            }
        }
    }
    remaining
}

/// True when every original line is fully covered by the given returns.
pub fn fully_returned(sale: &PosTransaction, returns: &[PosReturn]) -> bool {
    remaining_returnable(sale, returns)
        .values()
        .all(|qty| *qty <= Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sale::{BillType, SaleLine};

    fn sale_of(item_a: ItemId, item_b: ItemId) -> PosTransaction {
        PosTransaction::new(
            SaleId::new(),
            1,
            vec![
                SaleLine::new(item_a, Decimal::new(3, 0), Decimal::new(500, 2)).unwrap(),
                SaleLine::new(item_b, Decimal::new(1, 0), Decimal::new(900, 2)).unwrap(),
            ],
            Decimal::ZERO,
            Decimal::ZERO,
            PaymentMethod::Cash,
            None,
            BillType::CashSale,
            None,
            Utc::now(),
            UserId::new(),
        )
        .unwrap()
    }

    fn return_of(sale_id: SaleId, item_id: ItemId, qty: i64) -> PosReturn {
        PosReturn::new(
            ReturnId::new(),
            sale_id,
            vec![ReturnLine {
                item_id,
                quantity: Decimal::new(qty, 0),
                unit_price: Decimal::new(500, 2),
            }],
            PaymentMethod::Cash,
            Some("damaged".to_string()),
            Utc::now(),
            UserId::new(),
        )
        .unwrap()
    }

    #[test]
    fn refund_total_is_computed() {
        let ret = return_of(SaleId::new(), ItemId::new(), 2);
        assert_eq!(ret.total_refund(), Decimal::new(1_000, 2));
    }

    #[test]
    fn remaining_shrinks_with_each_return() {
        let item_a = ItemId::new();
        let item_b = ItemId::new();
        let sale = sale_of(item_a, item_b);

        let first = return_of(sale.id(), item_a, 2);
        let remaining = remaining_returnable(&sale, std::slice::from_ref(&first));
        assert_eq!(remaining[&item_a], Decimal::new(1, 0));
        assert_eq!(remaining[&item_b], Decimal::new(1, 0));
        assert!(!fully_returned(&sale, std::slice::from_ref(&first)));

        let rest = vec![
            first,
            return_of(sale.id(), item_a, 1),
            return_of(sale.id(), item_b, 1),
        ];
        assert!(fully_returned(&sale, &rest));
    }

    #[test]
    fn returns_for_other_sales_are_ignored() {
        let item_a = ItemId::new();
        let sale = sale_of(item_a, ItemId::new());
        let unrelated = return_of(SaleId::new(), item_a, 3);

        let remaining = remaining_returnable(&sale, &[unrelated]);
        assert_eq!(remaining[&item_a], Decimal::new(3, 0));
    }
}
