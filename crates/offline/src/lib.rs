//! Offline fallback queue.
//!
//! A local, session-scoped, durable store (SQLite) that captures business
//! events when the atomic commit path is unavailable, and replays them later
//! through the orchestrator's non-atomic fallback path. The queue is never
//! shared across concurrent sessions.

pub mod drain;
pub mod queue;

pub use drain::{DrainReport, drain};
pub use queue::{OfflineQueue, PendingEvent, PendingStatus};
