//! Point-of-sale domain module.
//!
//! A [`PosTransaction`] is a sale document with a one-way status lifecycle:
//! `completed` can move to `cancelled`, `returned`, or `voided`, all of which
//! are terminal. Compensation never edits the original document — reversals
//! are new journal entries plus a status flip. [`PosReturn`] records partial
//! or full reversals.

pub mod sale;
pub mod sale_return;

pub use sale::{BillType, PosTransaction, SaleLine, SaleStatus};
pub use sale_return::{PosReturn, ReturnLine, fully_returned, remaining_returnable};
