//! In-memory ledger store.
//!
//! Reference implementation for tests/dev. Atomic commits take a single
//! write lock, validate every revision check first, then apply — which gives
//! both all-or-nothing semantics and optimistic conflict detection on the
//! read set. Connectivity failures can be injected with
//! [`InMemoryLedgerStore::set_offline`] to exercise the fallback path.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;

use shopledger_core::{CustomerId, ItemId, PurchaseId, SaleId, VendorId};
use shopledger_inventory::Item;
use shopledger_journal::JournalEntry;
use shopledger_parties::{BalanceEntry, CounterpartyRef, Customer, Vendor};
use shopledger_pos::{PosReturn, PosTransaction};
use shopledger_purchasing::Purchase;

use crate::store::{LedgerStore, StoreError, Versioned, WriteBatch, WriteOp};

#[derive(Debug, Default)]
struct Collections {
    items: HashMap<ItemId, Versioned<Item>>,
    vendors: HashMap<VendorId, Versioned<Vendor>>,
    customers: HashMap<CustomerId, Versioned<Customer>>,
    purchases: HashMap<PurchaseId, Versioned<Purchase>>,
    sales: HashMap<SaleId, Versioned<PosTransaction>>,
    journal: Vec<JournalEntry>,
    balance_entries: Vec<BalanceEntry>,
    returns: Vec<PosReturn>,
}

#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    inner: RwLock<Collections>,
    offline: AtomicBool,
    purchase_seq: AtomicU64,
    receipt_seq: AtomicU64,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate loss of connectivity: every subsequent operation fails with
    /// [`StoreError::Unavailable`] until connectivity is restored.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("no connectivity".to_string()))
        } else {
            Ok(())
        }
    }

    fn lock_write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Collections>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Corrupt("lock poisoned".to_string()))
    }

    fn lock_read(&self) -> Result<std::sync::RwLockReadGuard<'_, Collections>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Corrupt("lock poisoned".to_string()))
    }

    /// Seed an item (catalog management's job, not the engine's).
    pub fn seed_item(&self, item: Item) {
        if let Ok(mut inner) = self.inner.write() {
            inner
                .items
                .insert(item.id(), Versioned { doc: item, revision: 1 });
        }
    }

    /// Seed a vendor.
    pub fn seed_vendor(&self, vendor: Vendor) {
        if let Ok(mut inner) = self.inner.write() {
            inner
                .vendors
                .insert(vendor.id(), Versioned { doc: vendor, revision: 1 });
        }
    }

    /// Seed a customer.
    pub fn seed_customer(&self, customer: Customer) {
        if let Ok(mut inner) = self.inner.write() {
            inner.customers.insert(
                customer.id(),
                Versioned {
                    doc: customer,
                    revision: 1,
                },
            );
        }
    }

    /// Corrupt an item's denormalized counters in place, bypassing the
    /// engine. Test hook for drift scenarios.
    pub fn corrupt_item<F: FnOnce(&mut Item)>(&self, id: ItemId, mutate: F) {
        if let Ok(mut inner) = self.inner.write()
            && let Some(versioned) = inner.items.get_mut(&id)
        {
            mutate(&mut versioned.doc);
            versioned.revision += 1;
        }
    }

    /// Corrupt a vendor's denormalized balance in place. Test hook.
    pub fn corrupt_vendor<F: FnOnce(&mut Vendor)>(&self, id: VendorId, mutate: F) {
        if let Ok(mut inner) = self.inner.write()
            && let Some(versioned) = inner.vendors.get_mut(&id)
        {
            mutate(&mut versioned.doc);
            versioned.revision += 1;
        }
    }

    fn check(op: &WriteOp, inner: &Collections) -> Result<(), StoreError> {
        fn expect<T>(
            current: Option<&Versioned<T>>,
            expected: u64,
            what: &str,
        ) -> Result<(), StoreError> {
            match current {
                None => Err(StoreError::Conflict(format!("{what}: document missing"))),
                Some(v) if v.revision != expected => Err(StoreError::Conflict(format!(
                    "{what}: expected revision {expected}, found {}",
                    v.revision
                ))),
                Some(_) => Ok(()),
            }
        }

        match op {
            WriteOp::PutItem { expected, item } => {
                expect(inner.items.get(&item.id()), *expected, "item")
            }
            WriteOp::PutVendor { expected, vendor } => {
                expect(inner.vendors.get(&vendor.id()), *expected, "vendor")
            }
            WriteOp::PutCustomer { expected, customer } => {
                expect(inner.customers.get(&customer.id()), *expected, "customer")
            }
            WriteOp::PutPurchase { expected, purchase } => {
                expect(inner.purchases.get(&purchase.id()), *expected, "purchase")
            }
            WriteOp::PutSale { expected, sale } => {
                expect(inner.sales.get(&sale.id()), *expected, "sale")
            }
            WriteOp::InsertPurchase(p) if inner.purchases.contains_key(&p.id()) => Err(
                StoreError::Conflict(format!("purchase {} already exists", p.id())),
            ),
            WriteOp::InsertSale(s) if inner.sales.contains_key(&s.id()) => Err(
                StoreError::Conflict(format!("sale {} already exists", s.id())),
            ),
            WriteOp::AdjustItemCounters { item_id, .. } if !inner.items.contains_key(item_id) => {
                Err(StoreError::Corrupt(format!("item {item_id} missing")))
            }
            WriteOp::AdjustVendorBalance { vendor_id, .. }
                if !inner.vendors.contains_key(vendor_id) =>
            {
                Err(StoreError::Corrupt(format!("vendor {vendor_id} missing")))
            }
            WriteOp::AdjustCustomerBalance { customer_id, .. }
                if !inner.customers.contains_key(customer_id) =>
            {
                Err(StoreError::Corrupt(format!("customer {customer_id} missing")))
            }
            WriteOp::AdjustPurchasePayment { purchase_id, .. }
                if !inner.purchases.contains_key(purchase_id) =>
            {
                Err(StoreError::Corrupt(format!("purchase {purchase_id} missing")))
            }
            _ => Ok(()),
        }
    }

    fn apply_op(op: WriteOp, inner: &mut Collections) {
        match op {
            WriteOp::PutItem { item, .. } => {
                let entry = inner.items.entry(item.id()).or_insert(Versioned {
                    doc: item.clone(),
                    revision: 0,
                });
                entry.doc = item;
                entry.revision += 1;
            }
            WriteOp::PutVendor { vendor, .. } => {
                let entry = inner.vendors.entry(vendor.id()).or_insert(Versioned {
                    doc: vendor.clone(),
                    revision: 0,
                });
                entry.doc = vendor;
                entry.revision += 1;
            }
            WriteOp::PutCustomer { customer, .. } => {
                let entry = inner.customers.entry(customer.id()).or_insert(Versioned {
                    doc: customer.clone(),
                    revision: 0,
                });
                entry.doc = customer;
                entry.revision += 1;
            }
            WriteOp::PutPurchase { purchase, .. } => {
                let entry = inner.purchases.entry(purchase.id()).or_insert(Versioned {
                    doc: purchase.clone(),
                    revision: 0,
                });
                entry.doc = purchase;
                entry.revision += 1;
            }
            WriteOp::PutSale { sale, .. } => {
                let entry = inner.sales.entry(sale.id()).or_insert(Versioned {
                    doc: sale.clone(),
                    revision: 0,
                });
                entry.doc = sale;
                entry.revision += 1;
            }
            WriteOp::InsertJournalEntry(entry) => inner.journal.push(entry),
            WriteOp::InsertPurchase(purchase) => {
                inner.purchases.insert(
                    purchase.id(),
                    Versioned {
                        doc: purchase,
                        revision: 1,
                    },
                );
            }
            WriteOp::InsertSale(sale) => {
                inner
                    .sales
                    .insert(sale.id(), Versioned { doc: sale, revision: 1 });
            }
            WriteOp::InsertReturn(ret) => inner.returns.push(ret),
            WriteOp::InsertBalanceEntry(entry) => inner.balance_entries.push(entry),
            WriteOp::AdjustItemCounters { item_id, delta } => {
                if let Some(versioned) = inner.items.get_mut(&item_id) {
                    versioned.doc.apply_increment(&delta);
                    versioned.revision += 1;
                }
            }
            WriteOp::AdjustVendorBalance {
                vendor_id,
                balance_delta,
                purchases_delta,
            } => {
                if let Some(versioned) = inner.vendors.get_mut(&vendor_id) {
                    versioned.doc.apply_increment(balance_delta, purchases_delta);
                    versioned.revision += 1;
                }
            }
            WriteOp::AdjustCustomerBalance {
                customer_id,
                balance_delta,
                purchases_delta,
            } => {
                if let Some(versioned) = inner.customers.get_mut(&customer_id) {
                    versioned.doc.apply_increment(balance_delta, purchases_delta);
                    versioned.revision += 1;
                }
            }
            WriteOp::AdjustPurchasePayment { purchase_id, amount } => {
                if let Some(versioned) = inner.purchases.get_mut(&purchase_id) {
                    versioned.doc.apply_payment_increment(amount);
                    versioned.revision += 1;
                }
            }
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get_item(&self, id: ItemId) -> Result<Option<Versioned<Item>>, StoreError> {
        self.ensure_online()?;
        Ok(self.lock_read()?.items.get(&id).cloned())
    }

    async fn get_vendor(&self, id: VendorId) -> Result<Option<Versioned<Vendor>>, StoreError> {
        self.ensure_online()?;
        Ok(self.lock_read()?.vendors.get(&id).cloned())
    }

    async fn get_customer(
        &self,
        id: CustomerId,
    ) -> Result<Option<Versioned<Customer>>, StoreError> {
        self.ensure_online()?;
        Ok(self.lock_read()?.customers.get(&id).cloned())
    }

    async fn get_purchase(
        &self,
        id: PurchaseId,
    ) -> Result<Option<Versioned<Purchase>>, StoreError> {
        self.ensure_online()?;
        Ok(self.lock_read()?.purchases.get(&id).cloned())
    }

    async fn get_sale(&self, id: SaleId) -> Result<Option<Versioned<PosTransaction>>, StoreError> {
        self.ensure_online()?;
        Ok(self.lock_read()?.sales.get(&id).cloned())
    }

    async fn journal_for_item(&self, item_id: ItemId) -> Result<Vec<JournalEntry>, StoreError> {
        self.ensure_online()?;
        Ok(self
            .lock_read()?
            .journal
            .iter()
            .filter(|e| e.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn balance_entries(
        &self,
        counterparty: CounterpartyRef,
    ) -> Result<Vec<BalanceEntry>, StoreError> {
        self.ensure_online()?;
        Ok(self
            .lock_read()?
            .balance_entries
            .iter()
            .filter(|e| e.counterparty == counterparty)
            .cloned()
            .collect())
    }

    async fn returns_for_sale(&self, sale_id: SaleId) -> Result<Vec<PosReturn>, StoreError> {
        self.ensure_online()?;
        Ok(self
            .lock_read()?
            .returns
            .iter()
            .filter(|r| r.sale_id() == sale_id)
            .cloned()
            .collect())
    }

    async fn list_item_ids(&self) -> Result<Vec<ItemId>, StoreError> {
        self.ensure_online()?;
        Ok(self.lock_read()?.items.keys().copied().collect())
    }

    async fn list_counterparties(&self) -> Result<Vec<CounterpartyRef>, StoreError> {
        self.ensure_online()?;
        let inner = self.lock_read()?;
        let mut parties: Vec<CounterpartyRef> = inner
            .vendors
            .keys()
            .copied()
            .map(CounterpartyRef::Vendor)
            .collect();
        parties.extend(inner.customers.keys().copied().map(CounterpartyRef::Customer));
        Ok(parties)
    }

    async fn allocate_purchase_number(&self) -> Result<u64, StoreError> {
        self.ensure_online()?;
        Ok(self.purchase_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn allocate_receipt_number(&self) -> Result<u64, StoreError> {
        self.ensure_online()?;
        Ok(self.receipt_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut inner = self.lock_write()?;

        // Validate the whole read set first; nothing applies on any failure.
        for op in &batch {
            Self::check(op, &inner)?;
        }
        for op in batch {
            Self::apply_op(op, &mut inner);
        }
        Ok(())
    }

    async fn apply(&self, op: WriteOp) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut inner = self.lock_write()?;

        // Existence is still checked (a blind increment against a missing
        // document is data corruption), but revisions are not.
        if let WriteOp::AdjustItemCounters { .. }
        | WriteOp::AdjustVendorBalance { .. }
        | WriteOp::AdjustCustomerBalance { .. }
        | WriteOp::AdjustPurchasePayment { .. } = &op
        {
            Self::check(&op, &inner)?;
        }
        Self::apply_op(op, &mut inner);
        Ok(())
    }
}
