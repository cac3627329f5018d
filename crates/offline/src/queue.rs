//! SQLite-backed offline queue.
//!
//! Events are stored with a temporary identifier and an enqueue timestamp;
//! "enqueued" means pending, not committed. Replay is bounded: a failed
//! event is retried at most once before it stays parked for an operator,
//! with reconciliation as the ultimate backstop for anything it half-applied.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use uuid::Uuid;

use shopledger_engine::{BusinessEvent, FallbackQueue, PendingReceipt};

/// Maximum replay attempts before an event stays `Failed`.
const MAX_ATTEMPTS: i64 = 2;

/// Lifecycle of a queued event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    Pending,
    Replaying,
    Applied,
    Failed,
}

impl PendingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PendingStatus::Pending => "Pending",
            PendingStatus::Replaying => "Replaying",
            PendingStatus::Applied => "Applied",
            PendingStatus::Failed => "Failed",
        }
    }

    fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "Pending" => Ok(PendingStatus::Pending),
            "Replaying" => Ok(PendingStatus::Replaying),
            "Applied" => Ok(PendingStatus::Applied),
            "Failed" => Ok(PendingStatus::Failed),
            other => Err(anyhow::anyhow!("unknown queue status '{other}'")),
        }
    }
}

/// A queued business event.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub id: Uuid,
    pub event: BusinessEvent,
    pub status: PendingStatus,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Durable local queue of events awaiting the atomic path.
#[derive(Debug, Clone)]
pub struct OfflineQueue {
    pool: SqlitePool,
}

impl OfflineQueue {
    /// Open (or create) the queue database at `path`.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create queue directory at {parent:?}"))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("failed to open offline queue at {path:?}"))?;

        Self::init(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory queue for tests. A single connection keeps every handle on
    /// the same database.
    pub async fn open_in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("failed to open in-memory offline queue")?;

        Self::init(&pool).await?;
        Ok(Self { pool })
    }

    async fn init(pool: &SqlitePool) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS offline_queue (
                id          TEXT PRIMARY KEY,
                event_type  TEXT NOT NULL,
                payload     TEXT NOT NULL,
                status      TEXT NOT NULL,
                attempts    INTEGER NOT NULL DEFAULT 0,
                enqueued_at TEXT NOT NULL,
                applied_at  TEXT NULL,
                error       TEXT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .context("failed to create offline_queue table")?;
        Ok(())
    }

    /// Persist an event with a temporary identifier. The caller reports it
    /// as "saved offline, pending sync", not as committed.
    pub async fn enqueue_event(&self, event: &BusinessEvent) -> anyhow::Result<PendingReceipt> {
        let id = Uuid::now_v7();
        let enqueued_at = Utc::now();
        let payload =
            serde_json::to_string(event).context("failed to serialize queued event")?;

        sqlx::query(
            r#"
            INSERT INTO offline_queue (id, event_type, payload, status, attempts, enqueued_at)
            VALUES (?1, ?2, ?3, ?4, 0, ?5)
            "#,
        )
        .bind(id.to_string())
        .bind(event.event_type())
        .bind(payload)
        .bind(PendingStatus::Pending.as_str())
        .bind(enqueued_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("failed to enqueue event")?;

        tracing::debug!(pending_id = %id, event_type = event.event_type(), "event enqueued offline");
        Ok(PendingReceipt {
            pending_id: id,
            enqueued_at,
        })
    }

    /// Events eligible for replay, oldest first: pending ones plus failed
    /// ones that have not exhausted their retry.
    pub async fn list_replayable(&self) -> anyhow::Result<Vec<PendingEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload, status, attempts, enqueued_at, applied_at, error
            FROM offline_queue
            WHERE status = 'Pending'
               OR (status = 'Failed' AND attempts < ?1)
            ORDER BY enqueued_at ASC
            "#,
        )
        .bind(MAX_ATTEMPTS)
        .fetch_all(&self.pool)
        .await
        .context("failed to list replayable events")?;

        rows.into_iter().map(row_to_event).collect()
    }

    /// Every event still in the queue, regardless of status.
    pub async fn list_all(&self) -> anyhow::Result<Vec<PendingEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload, status, attempts, enqueued_at, applied_at, error
            FROM offline_queue
            ORDER BY enqueued_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list queued events")?;

        rows.into_iter().map(row_to_event).collect()
    }

    pub async fn pending_count(&self) -> anyhow::Result<u64> {
        let row = sqlx::query(
            r#"SELECT COUNT(*) AS n FROM offline_queue WHERE status IN ('Pending', 'Replaying')"#,
        )
        .fetch_one(&self.pool)
        .await
        .context("failed to count pending events")?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u64)
    }

    pub(crate) async fn mark_replaying(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE offline_queue
            SET status = 'Replaying', attempts = attempts + 1
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("failed to mark event replaying")?;
        Ok(())
    }

    pub(crate) async fn mark_applied(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE offline_queue
            SET status = 'Applied', applied_at = ?2, error = NULL
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("failed to mark event applied")?;
        Ok(())
    }

    pub(crate) async fn mark_failed(&self, id: Uuid, error: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE offline_queue
            SET status = 'Failed', error = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(error)
        .execute(&self.pool)
        .await
        .context("failed to mark event failed")?;
        Ok(())
    }

    /// Move a failed event back to `Pending` and reset its retry budget
    /// (operator action).
    pub async fn retry_failed(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE offline_queue
            SET status = 'Pending', attempts = 0, error = NULL
            WHERE id = ?1
              AND status = 'Failed'
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("failed to retry failed event")?;
        Ok(())
    }

    /// Delete applied events older than `max_age`. Returns how many were
    /// removed.
    pub async fn clear_applied_older_than(&self, max_age: Duration) -> anyhow::Result<u64> {
        let cutoff = (Utc::now() - max_age).to_rfc3339();
        let result = sqlx::query(
            r#"
            DELETE FROM offline_queue
            WHERE status = 'Applied'
              AND applied_at IS NOT NULL
              AND applied_at < ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .context("failed to clear applied events")?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl FallbackQueue for OfflineQueue {
    async fn enqueue(&self, event: &BusinessEvent) -> anyhow::Result<PendingReceipt> {
        self.enqueue_event(event).await
    }
}

fn row_to_event(row: sqlx::sqlite::SqliteRow) -> anyhow::Result<PendingEvent> {
    let id_str: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id_str).context("invalid UUID in offline_queue.id")?;

    let payload: String = row.try_get("payload")?;
    let event: BusinessEvent =
        serde_json::from_str(&payload).context("invalid JSON payload in offline_queue")?;

    let status_str: String = row.try_get("status")?;
    let status = PendingStatus::parse(&status_str)?;

    let attempts: i64 = row.try_get("attempts")?;

    let enqueued_str: String = row.try_get("enqueued_at")?;
    let enqueued_at = DateTime::parse_from_rfc3339(&enqueued_str)
        .map(|dt| dt.with_timezone(&Utc))
        .context("invalid enqueued_at in offline_queue")?;

    let applied_str: Option<String> = row.try_get("applied_at")?;
    let applied_at = match applied_str {
        Some(s) => Some(
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .context("invalid applied_at in offline_queue")?,
        ),
        None => None,
    };

    let error: Option<String> = row.try_get("error")?;

    Ok(PendingEvent {
        id,
        event,
        status,
        attempts: attempts as u32,
        enqueued_at,
        applied_at,
        error,
    })
}
