use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use shopledger_core::{
    CustomerId, DomainError, DomainResult, ItemId, PaymentMethod, SaleId, UserId, checked_sum,
    line_total,
};

/// What kind of bill this is. Flags are derived from it: a quotation moves
/// neither stock nor money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillType {
    CashSale,
    CreditSale,
    Quotation,
}

impl BillType {
    pub fn affects_inventory(self) -> bool {
        !matches!(self, BillType::Quotation)
    }

    pub fn affects_accounting(self) -> bool {
        !matches!(self, BillType::Quotation)
    }
}

/// Sale status lifecycle. `Completed` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Completed,
    Cancelled,
    Returned,
    Voided,
}

impl SaleStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SaleStatus::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SaleStatus::Completed => "completed",
            SaleStatus::Cancelled => "cancelled",
            SaleStatus::Returned => "returned",
            SaleStatus::Voided => "voided",
        }
    }
}

impl core::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sold line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub item_id: ItemId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl SaleLine {
    pub fn new(item_id: ItemId, quantity: Decimal, unit_price: Decimal) -> DomainResult<Self> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::validation("line quantity must be positive"));
        }
        if unit_price < Decimal::ZERO {
            return Err(DomainError::validation("unit price cannot be negative"));
        }

        Ok(Self {
            item_id,
            quantity,
            unit_price,
            line_total: line_total(quantity, unit_price)?,
        })
    }
}

/// A sale document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosTransaction {
    id: SaleId,
    /// Server-assigned receipt number (store-wide, monotonic).
    receipt_number: u64,
    lines: Vec<SaleLine>,
    subtotal: Decimal,
    tax: Decimal,
    discount: Decimal,
    total: Decimal,
    payment_method: PaymentMethod,
    customer_id: Option<CustomerId>,
    bill_type: BillType,
    amount_tendered: Option<Decimal>,
    change_due: Option<Decimal>,
    status: SaleStatus,
    status_reason: Option<String>,
    created_at: DateTime<Utc>,
    created_by: UserId,
}

impl PosTransaction {
    /// Build a validated, `Completed` sale. Totals are always computed from
    /// the lines.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: SaleId,
        receipt_number: u64,
        lines: Vec<SaleLine>,
        tax: Decimal,
        discount: Decimal,
        payment_method: PaymentMethod,
        customer_id: Option<CustomerId>,
        bill_type: BillType,
        amount_tendered: Option<Decimal>,
        created_at: DateTime<Utc>,
        created_by: UserId,
    ) -> DomainResult<Self> {
        if lines.is_empty() {
            return Err(DomainError::validation("sale must have line items"));
        }
        if tax < Decimal::ZERO || discount < Decimal::ZERO {
            return Err(DomainError::validation("tax and discount cannot be negative"));
        }
        if bill_type == BillType::CreditSale && customer_id.is_none() {
            return Err(DomainError::validation(
                "credit sale requires a customer",
            ));
        }

        let subtotal = checked_sum(lines.iter().map(|l| l.line_total))?;
        let total = subtotal + tax - discount;
        if total < Decimal::ZERO {
            return Err(DomainError::validation("sale total cannot be negative"));
        }

        let change_due = match amount_tendered {
            Some(tendered) if tendered < total => {
                return Err(DomainError::validation(
                    "amount tendered is less than the total",
                ));
            }
            Some(tendered) => Some(tendered - total),
            None => None,
        };

        Ok(Self {
            id,
            receipt_number,
            lines,
            subtotal,
            tax,
            discount,
            total,
            payment_method,
            customer_id,
            bill_type,
            amount_tendered,
            change_due,
            status: SaleStatus::Completed,
            status_reason: None,
            created_at,
            created_by,
        })
    }

    pub fn id(&self) -> SaleId {
        self.id
    }

    pub fn receipt_number(&self) -> u64 {
        self.receipt_number
    }

    pub fn lines(&self) -> &[SaleLine] {
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

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn bill_type(&self) -> BillType {
        self.bill_type
    }

    pub fn amount_tendered(&self) -> Option<Decimal> {
        self.amount_tendered
    }

    pub fn change_due(&self) -> Option<Decimal> {
        self.change_due
    }

    pub fn status(&self) -> SaleStatus {
        self.status
    }

    pub fn status_reason(&self) -> Option<&str> {
        self.status_reason.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn affects_inventory(&self) -> bool {
        self.bill_type.affects_inventory()
    }

    pub fn affects_accounting(&self) -> bool {
        self.bill_type.affects_accounting()
    }

    pub fn is_credit_sale(&self) -> bool {
        self.bill_type == BillType::CreditSale
    }

    /// Flip to `Cancelled`. Only a `Completed` sale can be cancelled.
    pub fn cancel(&mut self, reason: impl Into<String>) -> DomainResult<()> {
        self.leave_completed(SaleStatus::Cancelled, Some(reason.into()))
    }

    /// Flip to `Voided`. Only a `Completed` sale can be voided.
    pub fn void(&mut self, reason: impl Into<String>) -> DomainResult<()> {
        self.leave_completed(SaleStatus::Voided, Some(reason.into()))
    }

    /// Flip to `Returned` once every original line is covered by returns.
    pub fn mark_returned(&mut self) -> DomainResult<()> {
        self.leave_completed(SaleStatus::Returned, None)
    }

    fn leave_completed(
        &mut self,
        next: SaleStatus,
        reason: Option<String>,
    ) -> DomainResult<()> {
        if self.status != SaleStatus::Completed {
            return Err(DomainError::invariant(format!(
                "no transition leaves the terminal state {}",
                self.status
            )));
        }

        self.status = next;
        self.status_reason = reason;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines() -> Vec<SaleLine> {
        vec![SaleLine::new(ItemId::new(), Decimal::new(2, 0), Decimal::new(650, 2)).unwrap()]
    }

    fn cash_sale() -> PosTransaction {
        PosTransaction::new(
            SaleId::new(),
            1,
            lines(),
            Decimal::ZERO,
            Decimal::ZERO,
            PaymentMethod::Cash,
            None,
            BillType::CashSale,
            Some(Decimal::new(2_000, 2)),
            Utc::now(),
            UserId::new(),
        )
        .unwrap()
    }

    #[test]
    fn computes_totals_and_change() {
        let sale = cash_sale();
        assert_eq!(sale.total(), Decimal::new(1_300, 2));
        assert_eq!(sale.change_due(), Some(Decimal::new(700, 2)));
        assert_eq!(sale.status(), SaleStatus::Completed);
    }

    #[test]
    fn quotation_moves_nothing() {
        let sale = PosTransaction::new(
            SaleId::new(),
            1,
            lines(),
            Decimal::ZERO,
            Decimal::ZERO,
            PaymentMethod::Cash,
            None,
            BillType::Quotation,
            None,
            Utc::now(),
            UserId::new(),
        )
        .unwrap();

        assert!(!sale.affects_inventory());
        assert!(!sale.affects_accounting());
    }

    #[test]
    fn credit_sale_requires_customer() {
        let err = PosTransaction::new(
            SaleId::new(),
            1,
            lines(),
            Decimal::ZERO,
            Decimal::ZERO,
            PaymentMethod::Cash,
            None,
            BillType::CreditSale,
            None,
            Utc::now(),
            UserId::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn terminal_states_admit_no_transition() {
        let mut sale = cash_sale();
        sale.cancel("customer changed mind").unwrap();
        assert_eq!(sale.status(), SaleStatus::Cancelled);

        let err = sale.void("too late").unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(sale.status(), SaleStatus::Cancelled);

        let err = sale.mark_returned().unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn short_tender_is_rejected() {
        let err = PosTransaction::new(
            SaleId::new(),
            1,
            lines(),
            Decimal::ZERO,
            Decimal::ZERO,
            PaymentMethod::Cash,
            None,
            BillType::CashSale,
            Some(Decimal::new(100, 2)),
            Utc::now(),
            UserId::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
