//! Deletion guards for catalog management.
//!
//! Catalog CRUD is outside the engine, but deleting a counterparty or an
//! item has ledger consequences, so the checks live here. Balances are
//! recomputed server-side from the ledger before the decision — the
//! denormalized copy is never trusted for deletion.

use std::sync::Arc;

use shopledger_core::{CustomerId, ItemId, VendorId};
use shopledger_parties::{CounterpartyRef, balance_clears_deletion, compute_balance};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::store::LedgerStore;

pub struct DeletionGuards<S> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: LedgerStore> DeletionGuards<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// A vendor may be deleted only once its recomputed balance is settled
    /// within epsilon.
    pub async fn guard_vendor_deletion(&self, id: VendorId) -> EngineResult<()> {
        self.store
            .get_vendor(id)
            .await?
            .ok_or(EngineError::VendorNotFound(id))?;

        let counterparty = CounterpartyRef::Vendor(id);
        let entries = self.store.balance_entries(counterparty).await?;
        let balance = compute_balance(counterparty, &entries);

        if balance_clears_deletion(balance, self.config.balance_epsilon) {
            Ok(())
        } else {
            Err(EngineError::BalanceNotSettled {
                counterparty,
                balance,
            })
        }
    }

    /// A customer may be deleted only once its recomputed balance is settled
    /// within epsilon.
    pub async fn guard_customer_deletion(&self, id: CustomerId) -> EngineResult<()> {
        self.store
            .get_customer(id)
            .await?
            .ok_or(EngineError::CustomerNotFound(id))?;

        let counterparty = CounterpartyRef::Customer(id);
        let entries = self.store.balance_entries(counterparty).await?;
        let balance = compute_balance(counterparty, &entries);

        if balance_clears_deletion(balance, self.config.balance_epsilon) {
            Ok(())
        } else {
            Err(EngineError::BalanceNotSettled {
                counterparty,
                balance,
            })
        }
    }

    /// An item referenced by journal entries can only be archived, never
    /// deleted.
    pub async fn guard_item_deletion(&self, id: ItemId) -> EngineResult<()> {
        self.store
            .get_item(id)
            .await?
            .ok_or(EngineError::ItemNotFound(id))?;

        if self.store.journal_for_item(id).await?.is_empty() {
            Ok(())
        } else {
            Err(EngineError::ItemHasMovements(id))
        }
    }
}
