use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::runtime::Runtime;

use shopledger_core::{ItemId, PaymentMethod, UserId, VendorId};
use shopledger_engine::{
    EngineConfig, InMemoryLedgerStore, PurchaseDraft, PurchaseLineDraft, ReconciliationService,
    SaleDraft, SaleLineDraft, TransactionOrchestrator,
};
use shopledger_inventory::Item;
use shopledger_parties::{ContactInfo, Vendor};
use shopledger_pos::BillType;

fn seeded_engine(
    item_count: usize,
) -> (
    Arc<InMemoryLedgerStore>,
    TransactionOrchestrator<InMemoryLedgerStore>,
    Vec<ItemId>,
    VendorId,
) {
    let store = Arc::new(InMemoryLedgerStore::new());
    let user = UserId::new();
    let vendor_id = VendorId::new();
    store.seed_vendor(
        Vendor::new(
            vendor_id,
            "Bench Vendor",
            ContactInfo::default(),
            Utc::now(),
            user,
        )
        .unwrap(),
    );

    let items: Vec<ItemId> = (0..item_count)
        .map(|n| {
            let id = ItemId::new();
            store.seed_item(
                Item::new(
                    id,
                    format!("Item {n}"),
                    None,
                    "unit",
                    Decimal::ZERO,
                    Decimal::ZERO,
                    Utc::now(),
                    user,
                )
                .unwrap(),
            );
            id
        })
        .collect();

    let orchestrator = TransactionOrchestrator::new(store.clone(), EngineConfig::default());
    (store, orchestrator, items, vendor_id)
}

fn purchase_draft(vendor_id: VendorId, item_id: ItemId, quantity: i64) -> PurchaseDraft {
    PurchaseDraft {
        vendor_id,
        lines: vec![PurchaseLineDraft {
            item_id,
            quantity: Decimal::new(quantity, 0),
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
    }
}

fn sale_draft(item_id: ItemId) -> SaleDraft {
    SaleDraft {
        lines: vec![SaleLineDraft {
            item_id,
            quantity: Decimal::ONE,
            unit_price: Decimal::new(700, 2),
        }],
        tax: Decimal::ZERO,
        discount: Decimal::ZERO,
        payment_method: PaymentMethod::Cash,
        customer_id: None,
        bill_type: BillType::CashSale,
        amount_tendered: None,
        acknowledge_offline: false,
        recorded_by: UserId::new(),
    }
}

fn bench_record_sale(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (_store, orchestrator, items, vendor_id) = seeded_engine(1);
    let item_id = items[0];

    rt.block_on(async {
        orchestrator
            .record_purchase(purchase_draft(vendor_id, item_id, 2_000_000_000))
            .await
            .unwrap();
    });

    let mut group = c.benchmark_group("orchestrator");
    group.throughput(Throughput::Elements(1));
    group.bench_function("record_sale_single_line", |b| {
        b.iter(|| {
            rt.block_on(async {
                orchestrator.record_sale(sale_draft(item_id)).await.unwrap();
            })
        })
    });
    group.finish();
}

fn bench_reconcile_sweep(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("reconciliation");
    for item_count in [100usize, 500] {
        let (store, orchestrator, items, vendor_id) = seeded_engine(item_count);
        rt.block_on(async {
            for &item_id in &items {
                orchestrator
                    .record_purchase(purchase_draft(vendor_id, item_id, 50))
                    .await
                    .unwrap();
            }
        });
        let reconciler = ReconciliationService::new(store, EngineConfig::default());

        group.throughput(Throughput::Elements(item_count as u64));
        group.bench_with_input(
            BenchmarkId::new("reconcile_all_items", item_count),
            &item_count,
            |b, _| {
                b.iter(|| {
                    rt.block_on(async {
                        let report = reconciler.reconcile_all_items().await;
                        assert_eq!(report.failed, 0);
                    })
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_record_sale, bench_reconcile_sweep);
criterion_main!(benches);
