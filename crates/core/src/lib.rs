//! `shopledger-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the domain error model, and money/quantity
//! helpers shared by every ledger module.

pub mod error;
pub mod id;
pub mod money;
pub mod payment;

pub use error::{DomainError, DomainResult};
pub use id::{
    CategoryId, CustomerId, EntryId, ItemId, PaymentId, PurchaseId, ReturnId, SaleId, UserId,
    VendorId,
};
pub use money::{checked_sum, line_total, within_epsilon};
pub use payment::PaymentMethod;
