//! Command drafts: the validated input of one business event.
//!
//! Drafts are plain serializable data. They double as the payload of
//! [`BusinessEvent`], the record persisted by the offline queue when the
//! atomic path is unavailable.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use shopledger_core::{
    CustomerId, ItemId, PaymentMethod, PurchaseId, SaleId, UserId, VendorId,
};
use shopledger_journal::StockDirection;
use shopledger_parties::BalanceEntryKind;
use shopledger_pos::BillType;

/// One line of a purchase being recorded. Items flagged "new" are created by
/// catalog management before the event reaches the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLineDraft {
    pub item_id: ItemId,
    pub quantity: Decimal,
    pub purchase_rate: Decimal,
    pub sale_rate: Decimal,
    pub expiry: Option<NaiveDate>,
    pub shelf_location: Option<String>,
}

/// RecordPurchase input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseDraft {
    pub vendor_id: VendorId,
    pub lines: Vec<PurchaseLineDraft>,
    pub tax: Decimal,
    pub discount: Decimal,
    pub paid_amount: Decimal,
    pub purchase_date: NaiveDate,
    pub notes: Option<String>,
    pub recorded_by: UserId,
}

/// One cart line of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineDraft {
    pub item_id: ItemId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// RecordSale input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDraft {
    pub lines: Vec<SaleLineDraft>,
    pub tax: Decimal,
    pub discount: Decimal,
    pub payment_method: PaymentMethod,
    pub customer_id: Option<CustomerId>,
    pub bill_type: BillType,
    pub amount_tendered: Option<Decimal>,
    /// A sale must be confirmed at the point of sale; it is only queued
    /// offline when the operator has explicitly acknowledged the deferral.
    pub acknowledge_offline: bool,
    pub recorded_by: UserId,
}

/// One returned line. The refund price is resolved from the original sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLineDraft {
    pub item_id: ItemId,
    pub quantity: Decimal,
}

/// ProcessReturn input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnDraft {
    pub sale_id: SaleId,
    pub lines: Vec<ReturnLineDraft>,
    pub refund_method: PaymentMethod,
    pub reason: Option<String>,
    pub recorded_by: UserId,
}

/// RecordVendorPayment input. When `purchase_id` is given, the same commit
/// advances that purchase's payment status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorPaymentDraft {
    pub vendor_id: VendorId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub purchase_id: Option<PurchaseId>,
    pub entry_date: NaiveDate,
    pub recorded_by: UserId,
}

/// RecordCustomerTransaction input: a payment reduces the customer's
/// balance, a charge increases it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerTransactionDraft {
    pub customer_id: CustomerId,
    pub amount: Decimal,
    pub kind: BalanceEntryKind,
    pub method: Option<PaymentMethod>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub entry_date: NaiveDate,
    pub recorded_by: UserId,
}

/// RecordStockAdjustment input: a manual correction journaled with an
/// adjustment source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentDraft {
    pub item_id: ItemId,
    pub direction: StockDirection,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub reason: Option<String>,
    pub movement_date: NaiveDate,
    pub recorded_by: UserId,
}

/// A business event as captured by the offline fallback queue.
///
/// Cancellations and returns are deliberately absent: they depend on server
/// state (sale status, prior returns) an offline session cannot trust, so
/// they never defer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusinessEvent {
    Purchase(PurchaseDraft),
    Sale(SaleDraft),
    VendorPayment(VendorPaymentDraft),
    CustomerTransaction(CustomerTransactionDraft),
    StockAdjustment(AdjustmentDraft),
}

impl BusinessEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            BusinessEvent::Purchase(_) => "purchase",
            BusinessEvent::Sale(_) => "sale",
            BusinessEvent::VendorPayment(_) => "vendor_payment",
            BusinessEvent::CustomerTransaction(_) => "customer_transaction",
            BusinessEvent::StockAdjustment(_) => "stock_adjustment",
        }
    }
}
