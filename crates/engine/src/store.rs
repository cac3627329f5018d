//! Store abstraction for the ledger engine.
//!
//! Every read and write is an async suspension point: the engine runs
//! single-threaded cooperative against a remote shared store, and true
//! parallelism exists only on the store's side. Two write disciplines are
//! exposed:
//!
//! - [`LedgerStore::commit`] — the atomic path. The whole batch applies or
//!   none of it does, and every versioned put is checked against the
//!   revision observed when the document was read. A concurrent commit that
//!   invalidates the read set aborts the batch with [`StoreError::Conflict`].
//! - [`LedgerStore::apply`] — the degraded path. One op at a time, no
//!   conditional checks; counter updates are increments rather than
//!   read-modify-write. Used only by the offline fallback replay.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use shopledger_core::{CustomerId, ItemId, PurchaseId, SaleId, VendorId};
use shopledger_inventory::{Item, StockDelta};
use shopledger_journal::JournalEntry;
use shopledger_parties::{BalanceEntry, CounterpartyRef, Customer, Vendor};
use shopledger_pos::{PosReturn, PosTransaction};
use shopledger_purchasing::Purchase;

/// A document together with the store revision at which it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub doc: T,
    pub revision: u64,
}

/// Store-level failure, classified so the engine can branch without
/// inspecting message text.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic-concurrency check failed; the batch was not applied.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// The store cannot be reached (offline, timeout).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Malformed or missing data where the schema requires it.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// A single write.
///
/// `Put*` ops carry the revision observed at read time and fail the whole
/// atomic batch when it has moved. `Insert*` ops append immutable records.
/// `Adjust*` ops are the increment primitives of the degraded path.
#[derive(Debug, Clone)]
pub enum WriteOp {
    PutItem {
        expected: u64,
        item: Item,
    },
    PutVendor {
        expected: u64,
        vendor: Vendor,
    },
    PutCustomer {
        expected: u64,
        customer: Customer,
    },
    PutPurchase {
        expected: u64,
        purchase: Purchase,
    },
    PutSale {
        expected: u64,
        sale: PosTransaction,
    },
    InsertJournalEntry(JournalEntry),
    InsertPurchase(Purchase),
    InsertSale(PosTransaction),
    InsertReturn(PosReturn),
    InsertBalanceEntry(BalanceEntry),
    AdjustItemCounters {
        item_id: ItemId,
        delta: StockDelta,
    },
    AdjustVendorBalance {
        vendor_id: VendorId,
        balance_delta: Decimal,
        purchases_delta: Decimal,
    },
    AdjustCustomerBalance {
        customer_id: CustomerId,
        balance_delta: Decimal,
        purchases_delta: Decimal,
    },
    AdjustPurchasePayment {
        purchase_id: PurchaseId,
        amount: Decimal,
    },
}

pub type WriteBatch = Vec<WriteOp>;

/// The five logical collections (`items`, `journal_entries`, `purchases`,
/// `pos_transactions`, `pos_returns`) plus the counterparty collections,
/// behind one async trait.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_item(&self, id: ItemId) -> Result<Option<Versioned<Item>>, StoreError>;
    async fn get_vendor(&self, id: VendorId) -> Result<Option<Versioned<Vendor>>, StoreError>;
    async fn get_customer(&self, id: CustomerId)
    -> Result<Option<Versioned<Customer>>, StoreError>;
    async fn get_purchase(&self, id: PurchaseId)
    -> Result<Option<Versioned<Purchase>>, StoreError>;
    async fn get_sale(&self, id: SaleId) -> Result<Option<Versioned<PosTransaction>>, StoreError>;

    /// All journal entries referencing the item, in creation order.
    async fn journal_for_item(&self, item_id: ItemId) -> Result<Vec<JournalEntry>, StoreError>;

    /// All balance ledger entries for the counterparty, in creation order.
    async fn balance_entries(
        &self,
        counterparty: CounterpartyRef,
    ) -> Result<Vec<BalanceEntry>, StoreError>;

    /// All returns recorded against the sale.
    async fn returns_for_sale(&self, sale_id: SaleId) -> Result<Vec<PosReturn>, StoreError>;

    async fn list_item_ids(&self) -> Result<Vec<ItemId>, StoreError>;
    async fn list_counterparties(&self) -> Result<Vec<CounterpartyRef>, StoreError>;

    /// Next store-wide purchase sequence number.
    async fn allocate_purchase_number(&self) -> Result<u64, StoreError>;

    /// Next store-wide POS receipt number.
    async fn allocate_receipt_number(&self) -> Result<u64, StoreError>;

    /// Atomically apply the batch: all revision checks pass and every op
    /// lands, or nothing does.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Apply one op without atomicity or revision checks (degraded path).
    async fn apply(&self, op: WriteOp) -> Result<(), StoreError>;
}
