//! Reconciliation service: detects and corrects drift between the
//! denormalized fast-path values and the journal-derived authoritative ones.
//!
//! This is background self-healing. Counterparty reconciliation never raises
//! to its caller; sweeps isolate each unit's failure and report aggregate
//! counts. Running any of it twice with no intervening writes is a no-op.

use std::sync::Arc;

use rust_decimal::Decimal;

use shopledger_core::{CustomerId, ItemId, VendorId, within_epsilon};
use shopledger_journal::StockSummary;
use shopledger_parties::{CounterpartyRef, compute_balance};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::read::{BalanceOverview, CacheInvalidator, NoCache};
use crate::store::{LedgerStore, Versioned, WriteBatch, WriteOp};

/// What a stock reconciliation changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCorrection {
    pub item_id: ItemId,
    pub previous_quantity: Decimal,
    pub corrected_quantity: Decimal,
    pub previous_average_cost: Decimal,
    pub corrected_average_cost: Decimal,
}

/// What a balance reconciliation changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceCorrection {
    pub counterparty: CounterpartyRef,
    pub previous_balance: Decimal,
    pub corrected_balance: Decimal,
}

/// Aggregate result of a sweep. Per-unit failures never halt the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub corrected: usize,
    pub failed: usize,
}

/// The corrective mutator: recomputes from the journal/ledger and overwrites
/// denormalized copies that drifted.
pub struct ReconciliationService<S> {
    store: Arc<S>,
    config: EngineConfig,
    cache: Arc<dyn CacheInvalidator>,
}

impl<S: LedgerStore> ReconciliationService<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            cache: Arc::new(NoCache),
        }
    }

    /// Attach the read cache to receive invalidation calls after corrections.
    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = cache;
        self
    }

    /// Recompute one item from its journal and overwrite the denormalized
    /// counters if they differ. Returns what changed, if anything.
    pub async fn reconcile_item(&self, item_id: ItemId) -> EngineResult<Option<ItemCorrection>> {
        let Versioned {
            doc: mut item,
            revision,
        } = self
            .store
            .get_item(item_id)
            .await?
            .ok_or(EngineError::ItemNotFound(item_id))?;

        let entries = self.store.journal_for_item(item_id).await?;
        let summary = StockSummary::from_entries(item_id, &entries);

        if item.matches_summary(&summary) {
            return Ok(None);
        }
        if summary.is_negative() {
            tracing::warn!(
                %item_id,
                raw_quantity = %summary.raw_quantity(),
                "journal sums below zero; data integrity issue"
            );
        }

        let correction = ItemCorrection {
            item_id,
            previous_quantity: item.current_quantity(),
            corrected_quantity: summary.raw_quantity(),
            previous_average_cost: item.average_unit_cost(),
            corrected_average_cost: summary.average_unit_cost(),
        };

        item.overwrite_from_summary(&summary);
        self.store
            .commit(vec![WriteOp::PutItem {
                expected: revision,
                item,
            }])
            .await?;
        self.cache.invalidate_item(item_id);
        tracing::warn!(
            %item_id,
            previous = %correction.previous_quantity,
            corrected = %correction.corrected_quantity,
            "stock drift corrected"
        );
        Ok(Some(correction))
    }

    /// Full sweep over all items, with writes bounded per commit by the
    /// store's write-batch limit.
    pub async fn reconcile_all_items(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let ids = match self.store.list_item_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                tracing::error!(error = %err, "item sweep could not list items");
                report.failed += 1;
                return report;
            }
        };

        let batch_size = self.config.reconcile_batch_size.max(1);
        for chunk in ids.chunks(batch_size) {
            let mut batch: WriteBatch = Vec::new();
            let mut corrected_ids: Vec<ItemId> = Vec::new();

            for &item_id in chunk {
                report.scanned += 1;
                match self.drifted_item_put(item_id).await {
                    Ok(Some(op)) => {
                        corrected_ids.push(item_id);
                        batch.push(op);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        report.failed += 1;
                        tracing::warn!(%item_id, error = %err, "item reconciliation failed");
                    }
                }
            }

            if batch.is_empty() {
                continue;
            }
            match self.store.commit(batch).await {
                Ok(()) => {
                    report.corrected += corrected_ids.len();
                    for id in corrected_ids {
                        self.cache.invalidate_item(id);
                    }
                }
                Err(err) => {
                    // The whole chunk is retried by the next sweep.
                    report.failed += corrected_ids.len();
                    tracing::warn!(error = %err, "reconciliation batch commit failed");
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            corrected = report.corrected,
            failed = report.failed,
            "item reconciliation sweep finished"
        );
        report
    }

    async fn drifted_item_put(&self, item_id: ItemId) -> EngineResult<Option<WriteOp>> {
        let Versioned {
            doc: mut item,
            revision,
        } = self
            .store
            .get_item(item_id)
            .await?
            .ok_or(EngineError::ItemNotFound(item_id))?;

        let entries = self.store.journal_for_item(item_id).await?;
        let summary = StockSummary::from_entries(item_id, &entries);
        if item.matches_summary(&summary) {
            return Ok(None);
        }

        item.overwrite_from_summary(&summary);
        Ok(Some(WriteOp::PutItem {
            expected: revision,
            item,
        }))
    }

    /// Recompute a vendor's balance from the ledger; overwrite and log when
    /// the difference exceeds epsilon. Never raises — this is a background
    /// self-healing operation, not a request-blocking one.
    pub async fn reconcile_vendor(&self, id: VendorId) -> Option<BalanceCorrection> {
        match self.try_reconcile_vendor(id).await {
            Ok(correction) => correction,
            Err(err) => {
                tracing::warn!(vendor_id = %id, error = %err, "balance reconciliation skipped");
                None
            }
        }
    }

    /// Recompute a customer's balance from the ledger; same contract as
    /// [`ReconciliationService::reconcile_vendor`].
    pub async fn reconcile_customer(&self, id: CustomerId) -> Option<BalanceCorrection> {
        match self.try_reconcile_customer(id).await {
            Ok(correction) => correction,
            Err(err) => {
                tracing::warn!(customer_id = %id, error = %err, "balance reconciliation skipped");
                None
            }
        }
    }

    pub async fn reconcile_counterparty(
        &self,
        counterparty: CounterpartyRef,
    ) -> Option<BalanceCorrection> {
        match counterparty {
            CounterpartyRef::Vendor(id) => self.reconcile_vendor(id).await,
            CounterpartyRef::Customer(id) => self.reconcile_customer(id).await,
        }
    }

    /// Opportunistic healing from a display read that already fetched the
    /// entries and noticed a mismatch.
    pub async fn heal_overview(&self, overview: &BalanceOverview) -> Option<BalanceCorrection> {
        if !overview.drifted {
            return None;
        }
        self.reconcile_counterparty(overview.counterparty).await
    }

    /// Full sweep over all counterparties.
    pub async fn reconcile_all_counterparties(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let parties = match self.store.list_counterparties().await {
            Ok(parties) => parties,
            Err(err) => {
                tracing::error!(error = %err, "counterparty sweep could not list parties");
                report.failed += 1;
                return report;
            }
        };

        for counterparty in parties {
            report.scanned += 1;
            let result = match counterparty {
                CounterpartyRef::Vendor(id) => self.try_reconcile_vendor(id).await,
                CounterpartyRef::Customer(id) => self.try_reconcile_customer(id).await,
            };
            match result {
                Ok(Some(_)) => report.corrected += 1,
                Ok(None) => {}
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(%counterparty, error = %err, "balance reconciliation failed");
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            corrected = report.corrected,
            failed = report.failed,
            "counterparty reconciliation sweep finished"
        );
        report
    }

    async fn try_reconcile_vendor(&self, id: VendorId) -> EngineResult<Option<BalanceCorrection>> {
        let Versioned {
            doc: mut vendor,
            revision,
        } = self
            .store
            .get_vendor(id)
            .await?
            .ok_or(EngineError::VendorNotFound(id))?;

        let counterparty = CounterpartyRef::Vendor(id);
        let entries = self.store.balance_entries(counterparty).await?;
        let computed = compute_balance(counterparty, &entries);
        let stored = vendor.outstanding_balance();

        if within_epsilon(stored, computed, self.config.balance_epsilon) {
            return Ok(None);
        }

        vendor.overwrite_balance(computed);
        self.store
            .commit(vec![WriteOp::PutVendor {
                expected: revision,
                vendor,
            }])
            .await?;
        self.cache.invalidate_vendor(id);
        tracing::warn!(
            vendor_id = %id,
            previous = %stored,
            corrected = %computed,
            "balance drift corrected"
        );
        Ok(Some(BalanceCorrection {
            counterparty,
            previous_balance: stored,
            corrected_balance: computed,
        }))
    }

    async fn try_reconcile_customer(
        &self,
        id: CustomerId,
    ) -> EngineResult<Option<BalanceCorrection>> {
        let Versioned {
            doc: mut customer,
            revision,
        } = self
            .store
            .get_customer(id)
            .await?
            .ok_or(EngineError::CustomerNotFound(id))?;

        let counterparty = CounterpartyRef::Customer(id);
        let entries = self.store.balance_entries(counterparty).await?;
        let computed = compute_balance(counterparty, &entries);
        let stored = customer.outstanding_balance();

        if within_epsilon(stored, computed, self.config.balance_epsilon) {
            return Ok(None);
        }

        customer.overwrite_balance(computed);
        self.store
            .commit(vec![WriteOp::PutCustomer {
                expected: revision,
                customer,
            }])
            .await?;
        self.cache.invalidate_customer(id);
        tracing::warn!(
            customer_id = %id,
            previous = %stored,
            corrected = %computed,
            "balance drift corrected"
        );
        Ok(Some(BalanceCorrection {
            counterparty,
            previous_balance: stored,
            corrected_balance: computed,
        }))
    }
}
