//! Inventory domain module.
//!
//! This crate contains the `Item` entity: the stocked product with its
//! denormalized quantity/average-cost counters. Pure domain logic, no IO;
//! only the transaction orchestrator and the reconciliation service may
//! mutate these counters.

pub mod item;

pub use item::{Item, StockDelta};
