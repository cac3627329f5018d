//! Queue drain: replay captured events through the orchestrator's fallback
//! path.
//!
//! Each event is replayed independently; one failure never blocks the rest.
//! Successful events leave the queue, failures stay for their bounded retry,
//! and the aggregate counts are reported to the caller.

use shopledger_engine::{LedgerStore, TransactionOrchestrator};

use crate::queue::OfflineQueue;

/// Aggregate result of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub attempted: usize,
    pub applied: usize,
    pub failed: usize,
}

/// Replay every eligible event, oldest first.
pub async fn drain<S: LedgerStore>(
    queue: &OfflineQueue,
    orchestrator: &TransactionOrchestrator<S>,
) -> anyhow::Result<DrainReport> {
    let mut report = DrainReport::default();

    for pending in queue.list_replayable().await? {
        report.attempted += 1;
        queue.mark_replaying(pending.id).await?;

        match orchestrator.apply_fallback(&pending.event).await {
            Ok(()) => {
                queue.mark_applied(pending.id).await?;
                report.applied += 1;
            }
            Err(err) => {
                queue.mark_failed(pending.id, &err.to_string()).await?;
                report.failed += 1;
                tracing::warn!(
                    pending_id = %pending.id,
                    event_type = pending.event.event_type(),
                    error = %err,
                    "offline event replay failed; left for retry"
                );
            }
        }
    }

    tracing::info!(
        attempted = report.attempted,
        applied = report.applied,
        failed = report.failed,
        "offline queue drained"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::PendingStatus;

    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use shopledger_core::{ItemId, UserId, VendorId};
    use shopledger_engine::{
        BusinessEvent, EngineConfig, InMemoryLedgerStore, LedgerStore as _, PurchaseDraft,
        PurchaseLineDraft,
    };
    use shopledger_inventory::Item;
    use shopledger_parties::{ContactInfo, Vendor};

    fn purchase_event(vendor_id: VendorId, item_id: ItemId) -> BusinessEvent {
        BusinessEvent::Purchase(PurchaseDraft {
            vendor_id,
            lines: vec![PurchaseLineDraft {
                item_id,
                quantity: Decimal::new(10, 0),
                purchase_rate: Decimal::new(500, 2),
                sale_rate: Decimal::new(650, 2),
                expiry: None,
                shelf_location: None,
            }],
            tax: Decimal::ZERO,
            discount: Decimal::ZERO,
            paid_amount: Decimal::ZERO,
            purchase_date: Utc::now().date_naive(),
            notes: None,
            recorded_by: UserId::new(),
        })
    }

    fn seeded_store() -> (Arc<InMemoryLedgerStore>, VendorId, ItemId) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let vendor_id = VendorId::new();
        let item_id = ItemId::new();

        store.seed_vendor(
            Vendor::new(
                vendor_id,
                "Acme Wholesale",
                ContactInfo::default(),
                Utc::now(),
                UserId::new(),
            )
            .unwrap(),
        );
        store.seed_item(
            Item::new(
                item_id,
                "Basmati Rice 5kg",
                None,
                "bag",
                Decimal::ZERO,
                Decimal::ZERO,
                Utc::now(),
                UserId::new(),
            )
            .unwrap(),
        );
        (store, vendor_id, item_id)
    }

    #[tokio::test]
    async fn drained_purchase_lands_in_the_store() {
        let (store, vendor_id, item_id) = seeded_store();
        let orchestrator =
            TransactionOrchestrator::new(store.clone(), EngineConfig::default());
        let queue = OfflineQueue::open_in_memory().await.unwrap();

        queue
            .enqueue_event(&purchase_event(vendor_id, item_id))
            .await
            .unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 1);

        let report = drain(&queue, &orchestrator).await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(queue.pending_count().await.unwrap(), 0);

        let item = store.get_item(item_id).await.unwrap().unwrap();
        assert_eq!(item.doc.current_quantity(), Decimal::new(10, 0));

        let vendor = store.get_vendor(vendor_id).await.unwrap().unwrap();
        assert_eq!(vendor.doc.outstanding_balance(), Decimal::new(5_000, 2));
    }

    #[tokio::test]
    async fn one_failure_does_not_block_the_rest() {
        let (store, vendor_id, item_id) = seeded_store();
        let orchestrator =
            TransactionOrchestrator::new(store.clone(), EngineConfig::default());
        let queue = OfflineQueue::open_in_memory().await.unwrap();

        // First event references entities the store has never seen.
        queue
            .enqueue_event(&purchase_event(VendorId::new(), ItemId::new()))
            .await
            .unwrap();
        queue
            .enqueue_event(&purchase_event(vendor_id, item_id))
            .await
            .unwrap();

        let report = drain(&queue, &orchestrator).await.unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.applied, 1);
        assert_eq!(report.failed, 1);

        let item = store.get_item(item_id).await.unwrap().unwrap();
        assert_eq!(item.doc.current_quantity(), Decimal::new(10, 0));

        let statuses: Vec<PendingStatus> = queue
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.status)
            .collect();
        assert!(statuses.contains(&PendingStatus::Failed));
        assert!(statuses.contains(&PendingStatus::Applied));
    }

    #[tokio::test]
    async fn failed_events_retry_at_most_once_more() {
        let (store, _, _) = seeded_store();
        let orchestrator =
            TransactionOrchestrator::new(store.clone(), EngineConfig::default());
        let queue = OfflineQueue::open_in_memory().await.unwrap();

        // Always fails: unknown vendor and item.
        queue
            .enqueue_event(&purchase_event(VendorId::new(), ItemId::new()))
            .await
            .unwrap();

        let first = drain(&queue, &orchestrator).await.unwrap();
        assert_eq!(first.failed, 1);
        let second = drain(&queue, &orchestrator).await.unwrap();
        assert_eq!(second.failed, 1);

        // Retry budget exhausted; the event stays parked.
        let third = drain(&queue, &orchestrator).await.unwrap();
        assert_eq!(third.attempted, 0);

        // An operator can reset it.
        let parked = &queue.list_all().await.unwrap()[0];
        queue.retry_failed(parked.id).await.unwrap();
        let fourth = drain(&queue, &orchestrator).await.unwrap();
        assert_eq!(fourth.attempted, 1);
    }
}
