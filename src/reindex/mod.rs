//! Reindex Worker: a durable, deduplicated `(kind, uuid)` task queue and a
//! Tokio worker pool that drains it, rebuilding Text Index documents and
//! Vector Index points after cross-entity changes land in the Primary
//! Store.
//!
//! The retry/backoff state machine is the same shape as the teacher's
//! `indexer::{IndexTask, TaskStatus}`, generalized from an in-memory
//! `VecDeque` of file-indexing tasks to a `reindex_tasks` table keyed by
//! `"{kind}:{uuid}"`, so the queue survives a process restart and is shared
//! between producers (the Services Layer) and the worker pool.

pub mod error;

#[cfg(test)]
mod tests;

pub use error::Error;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::types::reindex::{ReindexKind, ReindexTask, TaskStatus};

pub type Result<T> = std::result::Result<T, Error>;

/// Default worker pool concurrency.
pub const DEFAULT_CONCURRENCY: usize = 16;
/// At-most-5-attempts, capped at a 3-minute overall retry window.
pub const MAX_ATTEMPTS: u32 = 5;
pub const MAX_TOTAL_RETRY_SECS: u64 = 180;
/// How long an abandoned task is retained for operator inspection.
pub fn abandoned_retention() -> chrono::Duration {
    chrono::Duration::hours(24)
}

/// Exponential backoff with jitter, capped so five attempts never exceed
/// three minutes end to end: 1s, 2s, 4s, 8s, 16s base delays (±25% jitter),
/// matching the teacher's `calculate_retry_delay_with_jitter` formula.
pub fn backoff_delay(attempt: u32, jitter_random: f64) -> Duration {
    let capped = attempt.min(4);
    let base_secs = 1u64 << capped;
    let jitter_factor = 0.75 + jitter_random * 0.5;
    Duration::from_secs_f64(base_secs as f64 * jitter_factor)
}

fn status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Processing => "processing",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Abandoned => "abandoned",
    }
}

fn parse_status(s: &str) -> Result<TaskStatus> {
    Ok(match s {
        "pending" => TaskStatus::Pending,
        "processing" => TaskStatus::Processing,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        "abandoned" => TaskStatus::Abandoned,
        other => return Err(Error::UnknownStatus(other.to_string())),
    })
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    task_key: String,
    kind: String,
    uuid: String,
    attempt: i64,
    not_before: DateTime<Utc>,
    status: String,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_task(self) -> Result<ReindexTask> {
        Ok(ReindexTask {
            id: self.id,
            task_key: self.task_key,
            kind: ReindexKind::parse(&self.kind).ok_or_else(|| Error::UnknownKind(self.kind.clone()))?,
            uuid: Uuid::parse_str(&self.uuid).map_err(|_| Error::UnknownKind(self.uuid.clone()))?,
            attempt: self.attempt as u32,
            not_before: self.not_before,
            status: parse_status(&self.status)?,
            last_error: self.last_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Durable handle to the `reindex_tasks` table. Cheaply cloneable; wraps a
/// shared connection pool.
#[derive(Clone)]
pub struct ReindexQueue {
    pool: SqlitePool,
}

impl ReindexQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Enqueues a reindex task for `(kind, uuid)`. A no-op if a task with the
    /// same key is already pending, processing, or awaiting retry; otherwise
    /// (completed, abandoned, or absent) a fresh pending task is written.
    pub async fn enqueue(&self, kind: ReindexKind, uuid: Uuid) -> Result<()> {
        let task_key = ReindexTask::task_key_for(kind, uuid);
        let now = Utc::now();

        let existing: Option<(i64, String)> =
            sqlx::query_as("SELECT id, status FROM reindex_tasks WHERE task_key = ?")
                .bind(&task_key)
                .fetch_optional(&self.pool)
                .await?;

        match existing {
            None => {
                sqlx::query(
                    "INSERT INTO reindex_tasks
                     (task_key, kind, uuid, attempt, not_before, status, last_error, created_at, updated_at)
                     VALUES (?, ?, ?, 0, ?, 'pending', NULL, ?, ?)",
                )
                .bind(&task_key)
                .bind(kind.as_str())
                .bind(uuid.to_string())
                .bind(now)
                .bind(now)
                .bind(now)
                .execute(&self.pool)
                .await?;
            }
            Some((id, status)) if status == "pending" || status == "processing" || status == "failed" => {
                tracing::debug!(%task_key, %status, "reindex task already active, skipping enqueue");
                let _ = id;
            }
            Some((id, _terminal_status)) => {
                sqlx::query(
                    "UPDATE reindex_tasks
                     SET attempt = 0, not_before = ?, status = 'pending', last_error = NULL, updated_at = ?
                     WHERE id = ?",
                )
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    /// Atomically claims up to `limit` ready tasks (pending/failed with
    /// `not_before` in the past), marking them `processing` so no other
    /// worker claims the same row.
    async fn claim_ready(&self, limit: i64) -> Result<Vec<ReindexTask>> {
        let now = Utc::now();
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT id, task_key, kind, uuid, attempt, not_before, status, last_error, created_at, updated_at
             FROM reindex_tasks
             WHERE status IN ('pending', 'failed') AND not_before <= ?
             ORDER BY not_before ASC
             LIMIT ?",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            let result = sqlx::query(
                "UPDATE reindex_tasks SET status = 'processing', updated_at = ? WHERE id = ? AND status IN ('pending', 'failed')",
            )
            .bind(now)
            .bind(row.id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 1 {
                claimed.push(row.into_task()?);
            }
        }
        Ok(claimed)
    }

    async fn mark_completed(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE reindex_tasks SET status = 'completed', updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64, attempt: u32, error: &str) -> Result<()> {
        let now = Utc::now();
        if attempt >= MAX_ATTEMPTS {
            sqlx::query(
                "UPDATE reindex_tasks SET status = 'abandoned', attempt = ?, last_error = ?, updated_at = ? WHERE id = ?",
            )
            .bind(attempt as i64)
            .bind(error)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        } else {
            let delay = backoff_delay(attempt, rand::random::<f64>());
            let delay = delay.min(Duration::from_secs(MAX_TOTAL_RETRY_SECS));
            let not_before = now + chrono::Duration::from_std(delay).unwrap_or_default();
            sqlx::query(
                "UPDATE reindex_tasks SET status = 'failed', attempt = ?, not_before = ?, last_error = ?, updated_at = ? WHERE id = ?",
            )
            .bind(attempt as i64)
            .bind(not_before)
            .bind(error)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Deletes abandoned tasks older than the retention window. Intended to
    /// be called periodically by the worker pool's maintenance loop.
    pub async fn purge_expired(&self) -> Result<u64> {
        let cutoff = Utc::now() - abandoned_retention();
        let result = sqlx::query("DELETE FROM reindex_tasks WHERE status = 'abandoned' AND updated_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[cfg(test)]
    async fn get(&self, task_key: &str) -> Result<Option<ReindexTask>> {
        let row: Option<TaskRow> = sqlx::query_as(
            "SELECT id, task_key, kind, uuid, attempt, not_before, status, last_error, created_at, updated_at
             FROM reindex_tasks WHERE task_key = ?",
        )
        .bind(task_key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TaskRow::into_task).transpose()
    }
}

/// What a worker does with one claimed task: fetch the entity from PS,
/// rebuild its secondary-index documents. Implemented by the Services
/// Layer, which alone holds handles to PS/TI/VI.
#[async_trait::async_trait]
pub trait ReindexHandler: Send + Sync {
    /// Rebuilds the secondary-index state for `(kind, uuid)`. Returning
    /// `Ok(())` for an entity that no longer exists in PS is the contract
    /// for "entity-not-found completes silently".
    async fn reindex(&self, kind: ReindexKind, uuid: Uuid) -> crate::error::Result<()>;
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Polls [`ReindexQueue`] and dispatches claimed tasks to a [`ReindexHandler`]
/// across a bounded pool of concurrent workers.
pub struct WorkerPool {
    queue: ReindexQueue,
    handler: Arc<dyn ReindexHandler>,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(queue: ReindexQueue, handler: Arc<dyn ReindexHandler>, config: WorkerConfig) -> Self {
        Self { queue, handler, config }
    }

    /// Runs until `cancellation` fires, repeatedly claiming a batch of ready
    /// tasks and executing them concurrently up to `config.concurrency`.
    pub async fn run(&self, cancellation: CancellationToken) {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        loop {
            if cancellation.is_cancelled() {
                return;
            }

            let batch = match self.queue.claim_ready(self.config.concurrency as i64).await {
                Ok(batch) => batch,
                Err(error) => {
                    tracing::warn!(%error, "failed to claim reindex tasks");
                    Vec::new()
                }
            };

            if batch.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    _ = cancellation.cancelled() => return,
                }
                continue;
            }

            let mut handles = Vec::with_capacity(batch.len());
            for task in batch {
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
                let queue = self.queue.clone();
                let handler = self.handler.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = permit;
                    execute_one(&queue, &handler, task).await;
                }));
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
    }
}

async fn execute_one(queue: &ReindexQueue, handler: &Arc<dyn ReindexHandler>, task: ReindexTask) {
    tracing::debug!(kind = task.kind.as_str(), uuid = %task.uuid, attempt = task.attempt, "reindex task started");
    match handler.reindex(task.kind, task.uuid).await {
        Ok(()) => {
            if let Err(error) = queue.mark_completed(task.id).await {
                tracing::warn!(%error, "failed to mark reindex task completed");
            }
        }
        Err(error) => {
            let next_attempt = task.attempt + 1;
            tracing::warn!(kind = task.kind.as_str(), uuid = %task.uuid, attempt = next_attempt, %error, "reindex task failed");
            if let Err(update_error) = queue.mark_failed(task.id, next_attempt, &error.to_string()).await {
                tracing::warn!(error = %update_error, "failed to record reindex task failure");
            }
        }
    }
}
