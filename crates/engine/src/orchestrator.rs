//! Transaction orchestrator: executes one business event as a single unit.
//!
//! On the atomic path every read happens before every write; the write set
//! carries the revisions observed at read time, and the store aborts the
//! whole batch when a concurrent commit invalidated them. Aborts are retried
//! a bounded number of times, then surfaced as a retryable error — safe to
//! re-run because an aborted batch leaves no partial effect.
//!
//! When the store is unreachable, deferrable events are handed to the
//! offline queue and reported as pending rather than failed. A sale only
//! defers when the draft carries the operator's explicit acknowledgment.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shopledger_core::{ItemId, UserId};
use shopledger_inventory::{Item, StockDelta};
use shopledger_journal::{JournalEntry, SourceRef, StockDirection};
use shopledger_parties::{BalanceEntry, BalanceEntryKind, CounterpartyRef};
use shopledger_pos::{
    PosReturn, PosTransaction, ReturnLine, SaleLine, SaleStatus, fully_returned,
    remaining_returnable,
};
use shopledger_purchasing::{Purchase, PurchaseLine};

use crate::commands::{
    AdjustmentDraft, BusinessEvent, CustomerTransactionDraft, PurchaseDraft, ReturnDraft,
    SaleDraft, VendorPaymentDraft,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::read::{CacheInvalidator, NoCache};
use crate::store::{LedgerStore, Versioned, WriteBatch, WriteOp};

/// Run one commit attempt, retrying on optimistic `Conflict` up to the
/// configured bound. Implemented as a macro rather than a helper taking a
/// closure: a closure returning a borrowing future defeats the compiler's
/// higher-ranked `Send` inference, so the resulting futures could not be
/// `tokio::spawn`ed. Inlining the loop keeps every `record_*` future `Send`.
/// `$attempt` is re-evaluated each iteration, exactly as a re-invoked closure
/// would be.
macro_rules! commit_with_retry {
    ($self:expr, $attempt:expr) => {{
        let mut attempts: u32 = 0;
        loop {
            match $attempt.await {
                Err(EngineError::Conflict(reason))
                    if attempts < $self.config.max_commit_retries =>
                {
                    attempts += 1;
                    tracing::debug!(attempt = attempts, %reason, "optimistic conflict, retrying");
                }
                other => break other,
            }
        }
    }};
}

/// Outcome of a successfully handled business event.
///
/// Rejections are the typed error branch of [`EngineResult`]; callers match
/// on values, never on message text.
#[derive(Debug, Clone)]
pub enum Commit<T> {
    /// The event is durably applied, all effects included.
    Committed(T),
    /// The atomic path was unavailable; the event is saved offline, pending
    /// sync.
    DeferredOffline(PendingReceipt),
}

impl<T> Commit<T> {
    pub fn committed(self) -> Option<T> {
        match self {
            Commit::Committed(value) => Some(value),
            Commit::DeferredOffline(_) => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Commit::DeferredOffline(_))
    }
}

/// Handle to an event parked in the offline queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReceipt {
    /// Temporary identifier; the server assigns the real one at replay.
    pub pending_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
}

/// Local durable capture for events that could not be committed atomically.
#[async_trait]
pub trait FallbackQueue: Send + Sync {
    async fn enqueue(&self, event: &BusinessEvent) -> anyhow::Result<PendingReceipt>;
}

/// The core coordinator. The only mutator of stock counters and balances
/// besides the reconciliation service.
pub struct TransactionOrchestrator<S> {
    store: Arc<S>,
    config: EngineConfig,
    cache: Arc<dyn CacheInvalidator>,
    queue: Option<Arc<dyn FallbackQueue>>,
}

impl<S: LedgerStore> TransactionOrchestrator<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            cache: Arc::new(NoCache),
            queue: None,
        }
    }

    /// Attach the read cache to receive invalidation calls after commits.
    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = cache;
        self
    }

    /// Attach the offline queue for deferrable events.
    pub fn with_fallback_queue(mut self, queue: Arc<dyn FallbackQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Record a vendor-sourced stock-in: the purchase document, one journal
    /// entry per line, item counter updates, and the vendor's balance
    /// increase by the pending amount — atomically.
    pub async fn record_purchase(&self, draft: PurchaseDraft) -> EngineResult<Commit<Purchase>> {
        let result = commit_with_retry!(self, self.try_record_purchase(&draft));
        match result {
            Ok(purchase) => Ok(Commit::Committed(purchase)),
            Err(err) if err.is_unavailable() => {
                self.defer(BusinessEvent::Purchase(draft), err).await
            }
            Err(err) => Err(err),
        }
    }

    /// Record a sale: stock checks and decrements, journal entries, and (for
    /// a credit sale) the customer's balance increase — atomically. The
    /// stock check and the decrement share one atomic unit, so two
    /// concurrent sales cannot both pass the check against the same stale
    /// quantity.
    pub async fn record_sale(&self, draft: SaleDraft) -> EngineResult<Commit<PosTransaction>> {
        let result = commit_with_retry!(self, self.try_record_sale(&draft));
        match result {
            Ok(sale) => Ok(Commit::Committed(sale)),
            Err(err) if err.is_unavailable() && draft.acknowledge_offline => {
                self.defer(BusinessEvent::Sale(draft), err).await
            }
            Err(err) => Err(err),
        }
    }

    /// Cancel a completed sale by compensation: offsetting stock-in journal
    /// entries, counter restores, and the status flip. The original document
    /// is never edited beyond its status.
    pub async fn cancel_sale(
        &self,
        sale_id: shopledger_core::SaleId,
        reason: &str,
        cancelled_by: UserId,
    ) -> EngineResult<PosTransaction> {
        commit_with_retry!(self, self.try_close_sale(sale_id, reason, cancelled_by, false))
    }

    /// Void a completed sale. Same compensation as cancellation, different
    /// terminal state.
    pub async fn void_sale(
        &self,
        sale_id: shopledger_core::SaleId,
        reason: &str,
        voided_by: UserId,
    ) -> EngineResult<PosTransaction> {
        commit_with_retry!(self, self.try_close_sale(sale_id, reason, voided_by, true))
    }

    /// Process a partial or full return against a completed sale.
    pub async fn process_return(&self, draft: ReturnDraft) -> EngineResult<PosReturn> {
        commit_with_retry!(self, self.try_process_return(&draft))
    }

    /// Record a payment to a vendor: a ledger entry plus the balance
    /// decrement, optionally settling a purchase in the same commit.
    pub async fn record_vendor_payment(
        &self,
        draft: VendorPaymentDraft,
    ) -> EngineResult<Commit<BalanceEntry>> {
        let result = commit_with_retry!(self, self.try_vendor_payment(&draft));
        match result {
            Ok(entry) => Ok(Commit::Committed(entry)),
            Err(err) if err.is_unavailable() => {
                self.defer(BusinessEvent::VendorPayment(draft), err).await
            }
            Err(err) => Err(err),
        }
    }

    /// Record a customer payment or charge.
    pub async fn record_customer_transaction(
        &self,
        draft: CustomerTransactionDraft,
    ) -> EngineResult<Commit<BalanceEntry>> {
        let result = commit_with_retry!(self, self.try_customer_transaction(&draft));
        match result {
            Ok(entry) => Ok(Commit::Committed(entry)),
            Err(err) if err.is_unavailable() => {
                self.defer(BusinessEvent::CustomerTransaction(draft), err)
                    .await
            }
            Err(err) => Err(err),
        }
    }

    /// Record a manual stock adjustment with its journal trail.
    pub async fn record_stock_adjustment(
        &self,
        draft: AdjustmentDraft,
    ) -> EngineResult<Commit<JournalEntry>> {
        let result = commit_with_retry!(self, self.try_stock_adjustment(&draft));
        match result {
            Ok(entry) => Ok(Commit::Committed(entry)),
            Err(err) if err.is_unavailable() => {
                self.defer(BusinessEvent::StockAdjustment(draft), err).await
            }
            Err(err) => Err(err),
        }
    }

    // ---- atomic path -----------------------------------------------------

    async fn defer<T>(&self, event: BusinessEvent, cause: EngineError) -> EngineResult<Commit<T>> {
        let Some(queue) = &self.queue else {
            return Err(cause);
        };

        let receipt = queue
            .enqueue(&event)
            .await
            .map_err(|e| EngineError::Unavailable(format!("offline queue failed: {e}")))?;
        tracing::info!(
            event_type = event.event_type(),
            pending_id = %receipt.pending_id,
            "atomic path unavailable; event saved offline, pending sync"
        );
        Ok(Commit::DeferredOffline(receipt))
    }

    /// Read every distinct item once, keeping the revision of each read.
    async fn read_items(
        &self,
        ids: impl IntoIterator<Item = ItemId>,
    ) -> EngineResult<HashMap<ItemId, Versioned<Item>>> {
        let mut docs = HashMap::new();
        for id in ids {
            if docs.contains_key(&id) {
                continue;
            }
            let versioned = self
                .store
                .get_item(id)
                .await?
                .ok_or(EngineError::ItemNotFound(id))?;
            docs.insert(id, versioned);
        }
        Ok(docs)
    }

    async fn try_record_purchase(&self, draft: &PurchaseDraft) -> EngineResult<Purchase> {
        let Versioned {
            doc: mut vendor,
            revision: vendor_revision,
        } = self
            .store
            .get_vendor(draft.vendor_id)
            .await?
            .ok_or(EngineError::VendorNotFound(draft.vendor_id))?;
        let vendor_name = vendor.name().to_string();

        let now = Utc::now();
        let number = self.store.allocate_purchase_number().await?;
        let lines: Vec<PurchaseLine> = draft
            .lines
            .iter()
            .map(|l| PurchaseLine {
                item_id: l.item_id,
                quantity: l.quantity,
                purchase_rate: l.purchase_rate,
                sale_rate: l.sale_rate,
                expiry: l.expiry,
                shelf_location: l.shelf_location.clone(),
            })
            .collect();
        let purchase = Purchase::new(
            shopledger_core::PurchaseId::new(),
            number,
            draft.vendor_id,
            lines,
            draft.tax,
            draft.discount,
            draft.paid_amount,
            draft.purchase_date,
            draft.notes.clone(),
            now,
            draft.recorded_by,
        )?;

        let mut items = self
            .read_items(purchase.lines().iter().map(|l| l.item_id))
            .await?;
        let mut batch: WriteBatch = Vec::new();

        for line in purchase.lines() {
            let versioned = items
                .get_mut(&line.item_id)
                .ok_or(EngineError::ItemNotFound(line.item_id))?;
            versioned.doc.apply_stock_in(line.quantity, line.purchase_rate)?;
            versioned.doc.update_purchase_rate(line.purchase_rate)?;
            versioned.doc.update_sale_rate(line.sale_rate)?;

            batch.push(WriteOp::InsertJournalEntry(JournalEntry::new(
                line.item_id,
                StockDirection::StockIn,
                line.quantity,
                line.purchase_rate,
                draft.purchase_date,
                Some(vendor_name.clone()),
                SourceRef::Purchase(purchase.id()),
                None,
                now,
                draft.recorded_by,
            )?));
        }
        for (_, versioned) in items.iter() {
            batch.push(WriteOp::PutItem {
                expected: versioned.revision,
                item: versioned.doc.clone(),
            });
        }

        vendor.record_purchase(purchase.total(), purchase.pending_amount())?;
        if purchase.pending_amount() > Decimal::ZERO {
            batch.push(WriteOp::InsertBalanceEntry(BalanceEntry::new(
                CounterpartyRef::Vendor(draft.vendor_id),
                BalanceEntryKind::Charge,
                purchase.pending_amount(),
                None,
                Some(format!("purchase #{number}")),
                None,
                draft.purchase_date,
                now,
                draft.recorded_by,
            )?));
        }
        batch.push(WriteOp::PutVendor {
            expected: vendor_revision,
            vendor,
        });
        batch.push(WriteOp::InsertPurchase(purchase.clone()));

        self.store.commit(batch).await?;

        for id in items.keys() {
            self.cache.invalidate_item(*id);
        }
        self.cache.invalidate_vendor(draft.vendor_id);
        tracing::info!(
            purchase_id = %purchase.id(),
            vendor_id = %purchase.vendor_id(),
            total = %purchase.total(),
            pending = %purchase.pending_amount(),
            "purchase recorded"
        );
        Ok(purchase)
    }

    async fn try_record_sale(&self, draft: &SaleDraft) -> EngineResult<PosTransaction> {
        let now = Utc::now();
        let lines = draft
            .lines
            .iter()
            .map(|l| SaleLine::new(l.item_id, l.quantity, l.unit_price))
            .collect::<Result<Vec<_>, _>>()?;
        let receipt_number = self.store.allocate_receipt_number().await?;
        let sale = PosTransaction::new(
            shopledger_core::SaleId::new(),
            receipt_number,
            lines,
            draft.tax,
            draft.discount,
            draft.payment_method,
            draft.customer_id,
            draft.bill_type,
            draft.amount_tendered,
            now,
            draft.recorded_by,
        )?;

        // Resolve the customer before any write so a missing customer aborts
        // the whole event.
        let customer = match (sale.is_credit_sale(), draft.customer_id) {
            (true, Some(id)) => Some(
                self.store
                    .get_customer(id)
                    .await?
                    .ok_or(EngineError::CustomerNotFound(id))?,
            ),
            _ => None,
        };
        let counterparty_name = customer
            .as_ref()
            .map(|versioned| versioned.doc.name().to_string());

        let mut batch: WriteBatch = Vec::new();
        let mut touched_items: Vec<ItemId> = Vec::new();

        if sale.affects_inventory() {
            let line_item_ids: Vec<ItemId> = sale.lines().iter().map(|l| l.item_id).collect();
            let mut items = self.read_items(line_item_ids).await?;

            // The check and the decrement are part of the same atomic unit;
            // a concurrent commit that moves a read revision aborts this one.
            let mut requested: HashMap<ItemId, Decimal> = HashMap::new();
            for line in sale.lines() {
                *requested.entry(line.item_id).or_default() += line.quantity;
            }
            for (item_id, quantity) in &requested {
                let available = items[item_id].doc.current_quantity();
                if *quantity > available {
                    return Err(EngineError::InsufficientStock {
                        item_id: *item_id,
                        requested: *quantity,
                        available,
                    });
                }
            }

            for line in sale.lines() {
                let versioned = items
                    .get_mut(&line.item_id)
                    .ok_or(EngineError::ItemNotFound(line.item_id))?;
                versioned.doc.apply_stock_out(line.quantity)?;

                batch.push(WriteOp::InsertJournalEntry(JournalEntry::new(
                    line.item_id,
                    StockDirection::StockOut,
                    line.quantity,
                    line.unit_price,
                    now.date_naive(),
                    counterparty_name.clone(),
                    SourceRef::Sale(sale.id()),
                    None,
                    now,
                    draft.recorded_by,
                )?));
            }
            for (id, versioned) in items.iter() {
                touched_items.push(*id);
                batch.push(WriteOp::PutItem {
                    expected: versioned.revision,
                    item: versioned.doc.clone(),
                });
            }
        }

        if sale.affects_accounting()
            && sale.is_credit_sale()
            && sale.total() > Decimal::ZERO
            && let Some(Versioned {
                doc: mut customer,
                revision,
            }) = customer
        {
            let customer_id = customer.id();
            customer.record_credit_sale(sale.total())?;
            batch.push(WriteOp::InsertBalanceEntry(BalanceEntry::new(
                CounterpartyRef::Customer(customer_id),
                BalanceEntryKind::Charge,
                sale.total(),
                None,
                Some(format!("receipt #{receipt_number}")),
                None,
                now.date_naive(),
                now,
                draft.recorded_by,
            )?));
            batch.push(WriteOp::PutCustomer {
                expected: revision,
                customer,
            });
        }

        batch.push(WriteOp::InsertSale(sale.clone()));
        self.store.commit(batch).await?;

        for id in &touched_items {
            self.cache.invalidate_item(*id);
        }
        if let Some(id) = draft.customer_id {
            self.cache.invalidate_customer(id);
        }
        tracing::info!(
            sale_id = %sale.id(),
            receipt_number,
            total = %sale.total(),
            bill_type = ?sale.bill_type(),
            "sale recorded"
        );
        Ok(sale)
    }

    async fn try_close_sale(
        &self,
        sale_id: shopledger_core::SaleId,
        reason: &str,
        closed_by: UserId,
        voided: bool,
    ) -> EngineResult<PosTransaction> {
        let Versioned {
            doc: mut sale,
            revision,
        } = self
            .store
            .get_sale(sale_id)
            .await?
            .ok_or(EngineError::SaleNotFound(sale_id))?;

        if sale.status() != SaleStatus::Completed {
            return Err(EngineError::TransactionNotCancellable {
                sale_id,
                status: sale.status(),
            });
        }

        if voided {
            sale.void(reason)?;
        } else {
            sale.cancel(reason)?;
        }

        let now = Utc::now();
        let note = if voided {
            format!("void: {reason}")
        } else {
            format!("cancellation: {reason}")
        };

        let (mut batch, touched_items) = self
            .build_sale_reversal(&sale, &note, now, closed_by)
            .await?;
        batch.push(WriteOp::PutSale {
            expected: revision,
            sale: sale.clone(),
        });

        self.store.commit(batch).await?;

        for id in &touched_items {
            self.cache.invalidate_item(*id);
        }
        if let Some(id) = sale.customer_id() {
            self.cache.invalidate_customer(id);
        }
        tracing::info!(%sale_id, status = %sale.status(), reason, "sale closed by compensation");
        Ok(sale)
    }

    /// Compensating ops for a full reversal: stock-in journal entries and
    /// counter restores per line, plus the customer balance reversal for a
    /// credit sale.
    async fn build_sale_reversal(
        &self,
        sale: &PosTransaction,
        note: &str,
        now: DateTime<Utc>,
        by: UserId,
    ) -> EngineResult<(WriteBatch, Vec<ItemId>)> {
        let mut batch: WriteBatch = Vec::new();
        let mut touched = Vec::new();

        if sale.affects_inventory() {
            let mut items = self
                .read_items(sale.lines().iter().map(|l| l.item_id))
                .await?;

            for line in sale.lines() {
                let versioned = items
                    .get_mut(&line.item_id)
                    .ok_or(EngineError::ItemNotFound(line.item_id))?;
                versioned.doc.apply_stock_in(line.quantity, line.unit_price)?;

                batch.push(WriteOp::InsertJournalEntry(JournalEntry::new(
                    line.item_id,
                    StockDirection::StockIn,
                    line.quantity,
                    line.unit_price,
                    now.date_naive(),
                    None,
                    SourceRef::Sale(sale.id()),
                    Some(note.to_string()),
                    now,
                    by,
                )?));
            }
            for (id, versioned) in items.iter() {
                touched.push(*id);
                batch.push(WriteOp::PutItem {
                    expected: versioned.revision,
                    item: versioned.doc.clone(),
                });
            }
        }

        if sale.affects_accounting()
            && sale.is_credit_sale()
            && sale.total() > Decimal::ZERO
            && let Some(customer_id) = sale.customer_id()
        {
            let Versioned {
                doc: mut customer,
                revision,
            } = self
                .store
                .get_customer(customer_id)
                .await?
                .ok_or(EngineError::CustomerNotFound(customer_id))?;
            customer.apply_payment(sale.total())?;

            batch.push(WriteOp::InsertBalanceEntry(BalanceEntry::new(
                CounterpartyRef::Customer(customer_id),
                BalanceEntryKind::Payment,
                sale.total(),
                None,
                Some(format!("receipt #{}", sale.receipt_number())),
                Some(note.to_string()),
                now.date_naive(),
                now,
                by,
            )?));
            batch.push(WriteOp::PutCustomer {
                expected: revision,
                customer,
            });
        }

        Ok((batch, touched))
    }

    async fn try_process_return(&self, draft: &ReturnDraft) -> EngineResult<PosReturn> {
        let Versioned {
            doc: sale,
            revision: sale_revision,
        } = self
            .store
            .get_sale(draft.sale_id)
            .await?
            .ok_or(EngineError::SaleNotFound(draft.sale_id))?;

        match sale.status() {
            SaleStatus::Completed => {}
            status @ (SaleStatus::Cancelled | SaleStatus::Voided | SaleStatus::Returned) => {
                return Err(EngineError::TransactionNotCancellable {
                    sale_id: draft.sale_id,
                    status,
                });
            }
        }

        let prior = self.store.returns_for_sale(draft.sale_id).await?;
        let remaining = remaining_returnable(&sale, &prior);
        let sold_price: HashMap<ItemId, Decimal> = sale
            .lines()
            .iter()
            .map(|l| (l.item_id, l.unit_price))
            .collect();

        let now = Utc::now();
        let mut lines = Vec::with_capacity(draft.lines.len());
        for line in &draft.lines {
            let returnable = remaining.get(&line.item_id).copied().unwrap_or(Decimal::ZERO);
            if line.quantity > returnable {
                return Err(EngineError::ReturnExceedsSold {
                    item_id: line.item_id,
                    requested: line.quantity,
                    returnable: returnable.max(Decimal::ZERO),
                });
            }
            lines.push(ReturnLine {
                item_id: line.item_id,
                quantity: line.quantity,
                unit_price: sold_price[&line.item_id],
            });
        }

        let ret = PosReturn::new(
            shopledger_core::ReturnId::new(),
            draft.sale_id,
            lines,
            draft.refund_method,
            draft.reason.clone(),
            now,
            draft.recorded_by,
        )?;

        let mut batch: WriteBatch = vec![WriteOp::InsertReturn(ret.clone())];
        let mut touched_items: Vec<ItemId> = Vec::new();

        if sale.affects_inventory() {
            let mut items = self
                .read_items(ret.lines().iter().map(|l| l.item_id))
                .await?;

            for line in ret.lines() {
                let versioned = items
                    .get_mut(&line.item_id)
                    .ok_or(EngineError::ItemNotFound(line.item_id))?;
                versioned.doc.apply_stock_in(line.quantity, line.unit_price)?;

                batch.push(WriteOp::InsertJournalEntry(JournalEntry::new(
                    line.item_id,
                    StockDirection::StockIn,
                    line.quantity,
                    line.unit_price,
                    now.date_naive(),
                    None,
                    SourceRef::Return(ret.id()),
                    draft.reason.clone(),
                    now,
                    draft.recorded_by,
                )?));
            }
            for (id, versioned) in items.iter() {
                touched_items.push(*id);
                batch.push(WriteOp::PutItem {
                    expected: versioned.revision,
                    item: versioned.doc.clone(),
                });
            }
        }

        if sale.affects_accounting()
            && sale.is_credit_sale()
            && ret.total_refund() > Decimal::ZERO
            && let Some(customer_id) = sale.customer_id()
        {
            let Versioned {
                doc: mut customer,
                revision,
            } = self
                .store
                .get_customer(customer_id)
                .await?
                .ok_or(EngineError::CustomerNotFound(customer_id))?;
            customer.apply_payment(ret.total_refund())?;

            batch.push(WriteOp::InsertBalanceEntry(BalanceEntry::new(
                CounterpartyRef::Customer(customer_id),
                BalanceEntryKind::Payment,
                ret.total_refund(),
                Some(draft.refund_method),
                Some(format!("receipt #{}", sale.receipt_number())),
                draft.reason.clone(),
                now.date_naive(),
                now,
                draft.recorded_by,
            )?));
            batch.push(WriteOp::PutCustomer {
                expected: revision,
                customer,
            });
        }

        // Mark the original returned once every line is covered; it is never
        // deleted or otherwise edited.
        let mut all_returns = prior;
        all_returns.push(ret.clone());
        if fully_returned(&sale, &all_returns) {
            let mut sale = sale;
            sale.mark_returned()?;
            batch.push(WriteOp::PutSale {
                expected: sale_revision,
                sale,
            });
        }

        self.store.commit(batch).await?;

        for id in &touched_items {
            self.cache.invalidate_item(*id);
        }
        tracing::info!(
            return_id = %ret.id(),
            sale_id = %draft.sale_id,
            refund = %ret.total_refund(),
            "return processed"
        );
        Ok(ret)
    }

    async fn try_vendor_payment(&self, draft: &VendorPaymentDraft) -> EngineResult<BalanceEntry> {
        let Versioned {
            doc: mut vendor,
            revision,
        } = self
            .store
            .get_vendor(draft.vendor_id)
            .await?
            .ok_or(EngineError::VendorNotFound(draft.vendor_id))?;

        let now = Utc::now();
        vendor.apply_payment(draft.amount)?;
        let entry = BalanceEntry::new(
            CounterpartyRef::Vendor(draft.vendor_id),
            BalanceEntryKind::Payment,
            draft.amount,
            Some(draft.method),
            draft.reference.clone(),
            draft.notes.clone(),
            draft.entry_date,
            now,
            draft.recorded_by,
        )?;

        let mut batch: WriteBatch = vec![
            WriteOp::InsertBalanceEntry(entry.clone()),
            WriteOp::PutVendor {
                expected: revision,
                vendor,
            },
        ];

        if let Some(purchase_id) = draft.purchase_id {
            let Versioned {
                doc: mut purchase,
                revision,
            } = self
                .store
                .get_purchase(purchase_id)
                .await?
                .ok_or(EngineError::PurchaseNotFound(purchase_id))?;
            purchase.register_payment(draft.amount)?;
            batch.push(WriteOp::PutPurchase {
                expected: revision,
                purchase,
            });
        }

        self.store.commit(batch).await?;
        self.cache.invalidate_vendor(draft.vendor_id);
        tracing::info!(
            vendor_id = %draft.vendor_id,
            amount = %draft.amount,
            "vendor payment recorded"
        );
        Ok(entry)
    }

    async fn try_customer_transaction(
        &self,
        draft: &CustomerTransactionDraft,
    ) -> EngineResult<BalanceEntry> {
        let Versioned {
            doc: mut customer,
            revision,
        } = self
            .store
            .get_customer(draft.customer_id)
            .await?
            .ok_or(EngineError::CustomerNotFound(draft.customer_id))?;

        let now = Utc::now();
        match draft.kind {
            BalanceEntryKind::Payment => customer.apply_payment(draft.amount)?,
            BalanceEntryKind::Charge => customer.apply_charge(draft.amount)?,
        }
        let entry = BalanceEntry::new(
            CounterpartyRef::Customer(draft.customer_id),
            draft.kind,
            draft.amount,
            draft.method,
            draft.reference.clone(),
            draft.notes.clone(),
            draft.entry_date,
            now,
            draft.recorded_by,
        )?;

        self.store
            .commit(vec![
                WriteOp::InsertBalanceEntry(entry.clone()),
                WriteOp::PutCustomer {
                    expected: revision,
                    customer,
                },
            ])
            .await?;
        self.cache.invalidate_customer(draft.customer_id);
        tracing::info!(
            customer_id = %draft.customer_id,
            amount = %draft.amount,
            kind = ?draft.kind,
            "customer transaction recorded"
        );
        Ok(entry)
    }

    async fn try_stock_adjustment(&self, draft: &AdjustmentDraft) -> EngineResult<JournalEntry> {
        let Versioned {
            doc: mut item,
            revision,
        } = self
            .store
            .get_item(draft.item_id)
            .await?
            .ok_or(EngineError::ItemNotFound(draft.item_id))?;

        match draft.direction {
            StockDirection::StockIn => item.apply_stock_in(draft.quantity, draft.unit_cost)?,
            StockDirection::StockOut => {
                let available = item.current_quantity();
                if draft.quantity > available {
                    return Err(EngineError::InsufficientStock {
                        item_id: draft.item_id,
                        requested: draft.quantity,
                        available,
                    });
                }
                item.apply_stock_out(draft.quantity)?;
            }
        }

        let now = Utc::now();
        let entry = JournalEntry::new(
            draft.item_id,
            draft.direction,
            draft.quantity,
            draft.unit_cost,
            draft.movement_date,
            None,
            SourceRef::Adjustment,
            draft.reason.clone(),
            now,
            draft.recorded_by,
        )?;

        self.store
            .commit(vec![
                WriteOp::InsertJournalEntry(entry.clone()),
                WriteOp::PutItem {
                    expected: revision,
                    item,
                },
            ])
            .await?;
        self.cache.invalidate_item(draft.item_id);
        tracing::info!(
            item_id = %draft.item_id,
            direction = %draft.direction,
            quantity = %draft.quantity,
            "stock adjustment recorded"
        );
        Ok(entry)
    }

    // ---- offline fallback path -------------------------------------------

    /// Replay one queued event using best-effort sequential writes: the
    /// primary record first, then counters via increment primitives. No
    /// conditional checks, no atomicity — partial application is possible
    /// and reconciliation is the backstop.
    pub async fn apply_fallback(&self, event: &BusinessEvent) -> EngineResult<()> {
        match event {
            BusinessEvent::Purchase(draft) => self.fallback_purchase(draft).await,
            BusinessEvent::Sale(draft) => self.fallback_sale(draft).await,
            BusinessEvent::VendorPayment(draft) => self.fallback_vendor_payment(draft).await,
            BusinessEvent::CustomerTransaction(draft) => {
                self.fallback_customer_transaction(draft).await
            }
            BusinessEvent::StockAdjustment(draft) => self.fallback_adjustment(draft).await,
        }
    }

    async fn fallback_purchase(&self, draft: &PurchaseDraft) -> EngineResult<()> {
        let now = Utc::now();
        let number = self.store.allocate_purchase_number().await?;
        let lines: Vec<PurchaseLine> = draft
            .lines
            .iter()
            .map(|l| PurchaseLine {
                item_id: l.item_id,
                quantity: l.quantity,
                purchase_rate: l.purchase_rate,
                sale_rate: l.sale_rate,
                expiry: l.expiry,
                shelf_location: l.shelf_location.clone(),
            })
            .collect();
        let purchase = Purchase::new(
            shopledger_core::PurchaseId::new(),
            number,
            draft.vendor_id,
            lines,
            draft.tax,
            draft.discount,
            draft.paid_amount,
            draft.purchase_date,
            draft.notes.clone(),
            now,
            draft.recorded_by,
        )?;

        self.store
            .apply(WriteOp::InsertPurchase(purchase.clone()))
            .await?;

        for line in purchase.lines() {
            self.store
                .apply(WriteOp::InsertJournalEntry(JournalEntry::new(
                    line.item_id,
                    StockDirection::StockIn,
                    line.quantity,
                    line.purchase_rate,
                    draft.purchase_date,
                    None,
                    SourceRef::Purchase(purchase.id()),
                    None,
                    now,
                    draft.recorded_by,
                )?))
                .await?;

            let delta = StockDelta::stock_in(line.quantity, line.purchase_rate)?
                .with_rates(line.purchase_rate, line.sale_rate);
            self.store
                .apply(WriteOp::AdjustItemCounters {
                    item_id: line.item_id,
                    delta,
                })
                .await?;
            self.cache.invalidate_item(line.item_id);
        }

        if purchase.pending_amount() > Decimal::ZERO {
            self.store
                .apply(WriteOp::InsertBalanceEntry(BalanceEntry::new(
                    CounterpartyRef::Vendor(draft.vendor_id),
                    BalanceEntryKind::Charge,
                    purchase.pending_amount(),
                    None,
                    Some(format!("purchase #{number}")),
                    None,
                    draft.purchase_date,
                    now,
                    draft.recorded_by,
                )?))
                .await?;
        }
        self.store
            .apply(WriteOp::AdjustVendorBalance {
                vendor_id: draft.vendor_id,
                balance_delta: purchase.pending_amount(),
                purchases_delta: purchase.total(),
            })
            .await?;
        self.cache.invalidate_vendor(draft.vendor_id);
        tracing::info!(purchase_id = %purchase.id(), "purchase replayed on fallback path");
        Ok(())
    }

    async fn fallback_sale(&self, draft: &SaleDraft) -> EngineResult<()> {
        let now = Utc::now();
        let receipt_number = self.store.allocate_receipt_number().await?;
        let lines = draft
            .lines
            .iter()
            .map(|l| SaleLine::new(l.item_id, l.quantity, l.unit_price))
            .collect::<Result<Vec<_>, _>>()?;
        let sale = PosTransaction::new(
            shopledger_core::SaleId::new(),
            receipt_number,
            lines,
            draft.tax,
            draft.discount,
            draft.payment_method,
            draft.customer_id,
            draft.bill_type,
            draft.amount_tendered,
            now,
            draft.recorded_by,
        )?;

        self.store.apply(WriteOp::InsertSale(sale.clone())).await?;

        if sale.affects_inventory() {
            for line in sale.lines() {
                self.store
                    .apply(WriteOp::InsertJournalEntry(JournalEntry::new(
                        line.item_id,
                        StockDirection::StockOut,
                        line.quantity,
                        line.unit_price,
                        now.date_naive(),
                        None,
                        SourceRef::Sale(sale.id()),
                        None,
                        now,
                        draft.recorded_by,
                    )?))
                    .await?;
                self.store
                    .apply(WriteOp::AdjustItemCounters {
                        item_id: line.item_id,
                        delta: StockDelta::stock_out(line.quantity),
                    })
                    .await?;
                self.cache.invalidate_item(line.item_id);
            }
        }

        if sale.affects_accounting()
            && sale.is_credit_sale()
            && sale.total() > Decimal::ZERO
            && let Some(customer_id) = draft.customer_id
        {
            self.store
                .apply(WriteOp::InsertBalanceEntry(BalanceEntry::new(
                    CounterpartyRef::Customer(customer_id),
                    BalanceEntryKind::Charge,
                    sale.total(),
                    None,
                    Some(format!("receipt #{receipt_number}")),
                    None,
                    now.date_naive(),
                    now,
                    draft.recorded_by,
                )?))
                .await?;
            self.store
                .apply(WriteOp::AdjustCustomerBalance {
                    customer_id,
                    balance_delta: sale.total(),
                    purchases_delta: sale.total(),
                })
                .await?;
            self.cache.invalidate_customer(customer_id);
        }
        tracing::info!(sale_id = %sale.id(), "sale replayed on fallback path");
        Ok(())
    }

    async fn fallback_vendor_payment(&self, draft: &VendorPaymentDraft) -> EngineResult<()> {
        let now = Utc::now();
        let entry = BalanceEntry::new(
            CounterpartyRef::Vendor(draft.vendor_id),
            BalanceEntryKind::Payment,
            draft.amount,
            Some(draft.method),
            draft.reference.clone(),
            draft.notes.clone(),
            draft.entry_date,
            now,
            draft.recorded_by,
        )?;

        self.store.apply(WriteOp::InsertBalanceEntry(entry)).await?;
        self.store
            .apply(WriteOp::AdjustVendorBalance {
                vendor_id: draft.vendor_id,
                balance_delta: -draft.amount,
                purchases_delta: Decimal::ZERO,
            })
            .await?;
        if let Some(purchase_id) = draft.purchase_id {
            self.store
                .apply(WriteOp::AdjustPurchasePayment {
                    purchase_id,
                    amount: draft.amount,
                })
                .await?;
        }
        self.cache.invalidate_vendor(draft.vendor_id);
        tracing::info!(vendor_id = %draft.vendor_id, "vendor payment replayed on fallback path");
        Ok(())
    }

    async fn fallback_customer_transaction(
        &self,
        draft: &CustomerTransactionDraft,
    ) -> EngineResult<()> {
        let now = Utc::now();
        let entry = BalanceEntry::new(
            CounterpartyRef::Customer(draft.customer_id),
            draft.kind,
            draft.amount,
            draft.method,
            draft.reference.clone(),
            draft.notes.clone(),
            draft.entry_date,
            now,
            draft.recorded_by,
        )?;
        let balance_delta = match draft.kind {
            BalanceEntryKind::Charge => draft.amount,
            BalanceEntryKind::Payment => -draft.amount,
        };

        self.store.apply(WriteOp::InsertBalanceEntry(entry)).await?;
        self.store
            .apply(WriteOp::AdjustCustomerBalance {
                customer_id: draft.customer_id,
                balance_delta,
                purchases_delta: Decimal::ZERO,
            })
            .await?;
        self.cache.invalidate_customer(draft.customer_id);
        tracing::info!(
            customer_id = %draft.customer_id,
            "customer transaction replayed on fallback path"
        );
        Ok(())
    }

    async fn fallback_adjustment(&self, draft: &AdjustmentDraft) -> EngineResult<()> {
        let now = Utc::now();
        let entry = JournalEntry::new(
            draft.item_id,
            draft.direction,
            draft.quantity,
            draft.unit_cost,
            draft.movement_date,
            None,
            SourceRef::Adjustment,
            draft.reason.clone(),
            now,
            draft.recorded_by,
        )?;
        let delta = match draft.direction {
            StockDirection::StockIn => StockDelta::stock_in(draft.quantity, draft.unit_cost)?,
            StockDirection::StockOut => StockDelta::stock_out(draft.quantity),
        };

        self.store.apply(WriteOp::InsertJournalEntry(entry)).await?;
        self.store
            .apply(WriteOp::AdjustItemCounters {
                item_id: draft.item_id,
                delta,
            })
            .await?;
        self.cache.invalidate_item(draft.item_id);
        tracing::info!(item_id = %draft.item_id, "stock adjustment replayed on fallback path");
        Ok(())
    }
}
