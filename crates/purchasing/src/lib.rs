//! Purchasing domain module.
//!
//! A [`Purchase`] is a vendor-sourced stock-in document. It is immutable once
//! created except for its payment status, which only moves forward
//! (`unpaid -> partial -> paid`) as vendor payments accrue.

pub mod purchase;

pub use purchase::{PaymentStatus, Purchase, PurchaseLine};
