use rust_decimal::Decimal;

/// Tunables for the ledger engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tolerance when comparing a denormalized balance against the
    /// journal-derived one, and when gating counterparty deletion. Absorbs
    /// floating rounding; defaults to one unit of currency.
    pub balance_epsilon: Decimal,

    /// Upper bound on documents written per commit during a full
    /// reconciliation sweep (the underlying store's write-batch limit).
    pub reconcile_batch_size: usize,

    /// How many times an optimistic-conflict abort is retried before being
    /// surfaced to the caller as a retryable error.
    pub max_commit_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            balance_epsilon: Decimal::ONE,
            reconcile_batch_size: 500,
            max_commit_retries: 3,
        }
    }
}
