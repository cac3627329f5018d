//! Counterparties (vendors and customers) and their balance ledger.
//!
//! Each counterparty carries a denormalized `outstanding_balance`; the
//! authoritative value is the signed fold of its immutable [`BalanceEntry`]
//! records (charges positive, payments negative). Pure domain logic, no IO.

pub mod customer;
pub mod ledger;
pub mod vendor;

pub use customer::Customer;
pub use ledger::{
    BalanceEntry, BalanceEntryKind, ContactInfo, CounterpartyRef, balance_clears_deletion,
    compute_balance,
};
pub use vendor::Vendor;
