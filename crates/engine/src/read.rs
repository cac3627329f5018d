//! Read layer: O(1) fast-path reads over the denormalized fields, an
//! explicit cache, and the O(n) authoritative recomputations.
//!
//! The cache is owned here and invalidated explicitly by the orchestrator
//! and the reconciliation service after every write that touches a cached
//! entity. There is no time-based invalidation and no global state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rust_decimal::Decimal;

use shopledger_core::{CustomerId, ItemId, VendorId, within_epsilon};
use shopledger_inventory::Item;
use shopledger_journal::StockSummary;
use shopledger_parties::{BalanceEntry, CounterpartyRef, Customer, Vendor, compute_balance};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::store::LedgerStore;

/// Receives invalidation calls after every committed write.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate_item(&self, id: ItemId);
    fn invalidate_vendor(&self, id: VendorId);
    fn invalidate_customer(&self, id: CustomerId);
}

/// No-op invalidator for callers that run without a read cache.
#[derive(Debug, Default)]
pub struct NoCache;

impl CacheInvalidator for NoCache {
    fn invalidate_item(&self, _id: ItemId) {}
    fn invalidate_vendor(&self, _id: VendorId) {}
    fn invalidate_customer(&self, _id: CustomerId) {}
}

/// Entity cache for read-heavy UI paths (search, cart, stock checks).
#[derive(Debug, Default)]
pub struct ReadCache {
    items: RwLock<HashMap<ItemId, Item>>,
    vendors: RwLock<HashMap<VendorId, Vendor>>,
    customers: RwLock<HashMap<CustomerId, Customer>>,
}

impl ReadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_item(&self, id: ItemId) -> Option<Item> {
        self.items.read().ok()?.get(&id).cloned()
    }

    pub fn put_item(&self, item: Item) {
        if let Ok(mut items) = self.items.write() {
            items.insert(item.id(), item);
        }
    }

    pub fn get_vendor(&self, id: VendorId) -> Option<Vendor> {
        self.vendors.read().ok()?.get(&id).cloned()
    }

    pub fn put_vendor(&self, vendor: Vendor) {
        if let Ok(mut vendors) = self.vendors.write() {
            vendors.insert(vendor.id(), vendor);
        }
    }

    pub fn get_customer(&self, id: CustomerId) -> Option<Customer> {
        self.customers.read().ok()?.get(&id).cloned()
    }

    pub fn put_customer(&self, customer: Customer) {
        if let Ok(mut customers) = self.customers.write() {
            customers.insert(customer.id(), customer);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut items) = self.items.write() {
            items.clear();
        }
        if let Ok(mut vendors) = self.vendors.write() {
            vendors.clear();
        }
        if let Ok(mut customers) = self.customers.write() {
            customers.clear();
        }
    }
}

impl CacheInvalidator for ReadCache {
    fn invalidate_item(&self, id: ItemId) {
        if let Ok(mut items) = self.items.write() {
            items.remove(&id);
        }
    }

    fn invalidate_vendor(&self, id: VendorId) {
        if let Ok(mut vendors) = self.vendors.write() {
            vendors.remove(&id);
        }
    }

    fn invalidate_customer(&self, id: CustomerId) {
        if let Ok(mut customers) = self.customers.write() {
            customers.remove(&id);
        }
    }
}

/// A counterparty's stored balance next to the one recomputed from the
/// entries already fetched for display. `drifted` is the opportunistic
/// reconciliation trigger.
#[derive(Debug, Clone)]
pub struct BalanceOverview {
    pub counterparty: CounterpartyRef,
    pub stored_balance: Decimal,
    pub computed_balance: Decimal,
    pub entries: Vec<BalanceEntry>,
    pub drifted: bool,
}

/// Read API consumed by UI, receipts, export, and reporting. Never writes.
pub struct LedgerReader<S> {
    store: Arc<S>,
    cache: Arc<ReadCache>,
    epsilon: Decimal,
}

impl<S: LedgerStore> LedgerReader<S> {
    pub fn new(store: Arc<S>, cache: Arc<ReadCache>, config: &EngineConfig) -> Self {
        Self {
            store,
            cache,
            epsilon: config.balance_epsilon,
        }
    }

    /// Fast-path item read: denormalized fields, O(1) via the cache.
    pub async fn item(&self, id: ItemId) -> EngineResult<Option<Item>> {
        if let Some(item) = self.cache.get_item(id) {
            return Ok(Some(item));
        }
        let Some(versioned) = self.store.get_item(id).await? else {
            return Ok(None);
        };
        self.cache.put_item(versioned.doc.clone());
        Ok(Some(versioned.doc))
    }

    /// Fast-path vendor read.
    pub async fn vendor(&self, id: VendorId) -> EngineResult<Option<Vendor>> {
        if let Some(vendor) = self.cache.get_vendor(id) {
            return Ok(Some(vendor));
        }
        let Some(versioned) = self.store.get_vendor(id).await? else {
            return Ok(None);
        };
        self.cache.put_vendor(versioned.doc.clone());
        Ok(Some(versioned.doc))
    }

    /// Fast-path customer read.
    pub async fn customer(&self, id: CustomerId) -> EngineResult<Option<Customer>> {
        if let Some(customer) = self.cache.get_customer(id) {
            return Ok(Some(customer));
        }
        let Some(versioned) = self.store.get_customer(id).await? else {
            return Ok(None);
        };
        self.cache.put_customer(versioned.doc.clone());
        Ok(Some(versioned.doc))
    }

    /// Authoritative stock: the O(n) journal fold. Reconciliation's oracle,
    /// not the hot path.
    pub async fn authoritative_stock(&self, id: ItemId) -> EngineResult<StockSummary> {
        let entries = self.store.journal_for_item(id).await?;
        Ok(StockSummary::from_entries(id, &entries))
    }

    /// Vendor statement: entries plus stored-vs-computed balance.
    pub async fn vendor_overview(&self, id: VendorId) -> EngineResult<BalanceOverview> {
        let versioned = self
            .store
            .get_vendor(id)
            .await?
            .ok_or(EngineError::VendorNotFound(id))?;
        let counterparty = CounterpartyRef::Vendor(id);
        let entries = self.store.balance_entries(counterparty).await?;
        let computed = compute_balance(counterparty, &entries);
        let stored = versioned.doc.outstanding_balance();

        Ok(BalanceOverview {
            counterparty,
            stored_balance: stored,
            computed_balance: computed,
            entries,
            drifted: !within_epsilon(stored, computed, self.epsilon),
        })
    }

    /// Customer statement: entries plus stored-vs-computed balance.
    pub async fn customer_overview(&self, id: CustomerId) -> EngineResult<BalanceOverview> {
        let versioned = self
            .store
            .get_customer(id)
            .await?
            .ok_or(EngineError::CustomerNotFound(id))?;
        let counterparty = CounterpartyRef::Customer(id);
        let entries = self.store.balance_entries(counterparty).await?;
        let computed = compute_balance(counterparty, &entries);
        let stored = versioned.doc.outstanding_balance();

        Ok(BalanceOverview {
            counterparty,
            stored_balance: stored,
            computed_balance: computed,
            entries,
            drifted: !within_epsilon(stored, computed, self.epsilon),
        })
    }
}
