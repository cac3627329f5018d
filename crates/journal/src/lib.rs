//! Journal store record types and the stock aggregation oracle.
//!
//! A [`JournalEntry`] is the immutable record of a single stock movement.
//! Entries are never mutated or deleted; corrections are made via offsetting
//! entries. [`StockSummary`] folds an item's entries into its authoritative
//! quantity and lifetime weighted-average unit cost.

pub mod entry;
pub mod summary;

pub use entry::{JournalEntry, SourceRef, StockDirection};
pub use summary::StockSummary;
