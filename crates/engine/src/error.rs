//! Engine error taxonomy.
//!
//! The orchestrator is the boundary where business-rule errors become typed
//! outcomes. Store errors are classified (connectivity vs. not) before they
//! surface, so no caller ever string-matches an error message to decide on a
//! fallback.

use rust_decimal::Decimal;
use thiserror::Error;

use shopledger_core::{CustomerId, DomainError, ItemId, PurchaseId, SaleId, VendorId};
use shopledger_parties::CounterpartyRef;
use shopledger_pos::SaleStatus;

use crate::store::StoreError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Typed outcome of a rejected or failed business event.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Validation or invariant failure from a domain type. Rejected before
    /// any write.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("vendor not found: {0}")]
    VendorNotFound(VendorId),

    #[error("customer not found: {0}")]
    CustomerNotFound(CustomerId),

    #[error("purchase not found: {0}")]
    PurchaseNotFound(PurchaseId),

    #[error("transaction not found: {0}")]
    SaleNotFound(SaleId),

    /// The sale would drive the item's stock negative. Carries the available
    /// quantity so the caller can act on it.
    #[error("insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: Decimal,
        available: Decimal,
    },

    #[error(
        "return exceeds sold quantity for item {item_id}: requested {requested}, returnable {returnable}"
    )]
    ReturnExceedsSold {
        item_id: ItemId,
        requested: Decimal,
        returnable: Decimal,
    },

    #[error("transaction {sale_id} cannot be cancelled from status {status}")]
    TransactionNotCancellable { sale_id: SaleId, status: SaleStatus },

    /// Deletion guard: the counterparty's recomputed balance is not settled.
    #[error("{counterparty} still has an outstanding balance of {balance}")]
    BalanceNotSettled {
        counterparty: CounterpartyRef,
        balance: Decimal,
    },

    /// Deletion guard: items referenced by journal entries are archived, not
    /// deleted.
    #[error("item {0} is referenced by journal entries; archive it instead")]
    ItemHasMovements(ItemId),

    /// Optimistic-concurrency abort that survived the internal retries. Safe
    /// to re-run from scratch: the atomic path leaves no partial effect.
    #[error("commit conflict: {0}")]
    Conflict(String),

    /// Connectivity failure. Deferrable events are routed to the offline
    /// queue instead of surfacing this.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Hard store failure unrelated to connectivity or concurrency.
    #[error("store failure: {0}")]
    Store(String),
}

impl EngineError {
    /// Whether the caller may safely retry the whole operation from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Conflict(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, EngineError::Unavailable(_))
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => EngineError::Conflict(msg),
            StoreError::Unavailable(msg) => EngineError::Unavailable(msg),
            StoreError::Corrupt(msg) => EngineError::Store(msg),
        }
    }
}
