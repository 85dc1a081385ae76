use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::types::reindex::{ReindexKind, ReindexTask, TaskStatus};

use super::*;

async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::query(
        "CREATE TABLE reindex_tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_key TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL,
            uuid TEXT NOT NULL,
            attempt INTEGER NOT NULL DEFAULT 0,
            not_before TEXT NOT NULL,
            status TEXT NOT NULL,
            last_error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool
}

#[tokio::test]
async fn enqueue_is_idempotent_while_a_task_is_pending() {
    let queue = ReindexQueue::new(test_pool().await);
    let uuid = Uuid::new_v4();
    queue.enqueue(ReindexKind::Image, uuid).await.unwrap();
    queue.enqueue(ReindexKind::Image, uuid).await.unwrap();

    let key = ReindexTask::task_key_for(ReindexKind::Image, uuid);
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reindex_tasks WHERE task_key = ?")
        .bind(&key)
        .fetch_one(queue_pool(&queue))
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn enqueue_resets_a_completed_task_for_rerun() {
    let queue = ReindexQueue::new(test_pool().await);
    let uuid = Uuid::new_v4();
    queue.enqueue(ReindexKind::Tag, uuid).await.unwrap();

    let key = ReindexTask::task_key_for(ReindexKind::Tag, uuid);
    let task = queue.get(&key).await.unwrap().unwrap();
    queue.mark_completed(task.id).await.unwrap();

    let completed = queue.get(&key).await.unwrap().unwrap();
    assert_eq!(completed.status, TaskStatus::Completed);

    queue.enqueue(ReindexKind::Tag, uuid).await.unwrap();
    let reset = queue.get(&key).await.unwrap().unwrap();
    assert_eq!(reset.status, TaskStatus::Pending);
    assert_eq!(reset.attempt, 0);
}

#[tokio::test]
async fn claim_ready_marks_tasks_processing_and_excludes_future_backoff() {
    let queue = ReindexQueue::new(test_pool().await);
    let ready = Uuid::new_v4();
    let not_yet = Uuid::new_v4();
    queue.enqueue(ReindexKind::Person, ready).await.unwrap();
    queue.enqueue(ReindexKind::Person, not_yet).await.unwrap();

    let key = ReindexTask::task_key_for(ReindexKind::Person, not_yet);
    let task = queue.get(&key).await.unwrap().unwrap();
    queue.mark_failed(task.id, 1, "simulated transport failure").await.unwrap();

    let claimed = queue.claim_ready(10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].uuid, ready);

    let ready_key = ReindexTask::task_key_for(ReindexKind::Person, ready);
    let reclaimed = queue.get(&ready_key).await.unwrap().unwrap();
    assert_eq!(reclaimed.status, TaskStatus::Processing);
}

#[tokio::test]
async fn fifth_failure_abandons_the_task() {
    let queue = ReindexQueue::new(test_pool().await);
    let uuid = Uuid::new_v4();
    queue.enqueue(ReindexKind::Image, uuid).await.unwrap();

    let key = ReindexTask::task_key_for(ReindexKind::Image, uuid);
    let task = queue.get(&key).await.unwrap().unwrap();
    queue.mark_failed(task.id, MAX_ATTEMPTS, "persistent failure").await.unwrap();

    let final_state = queue.get(&key).await.unwrap().unwrap();
    assert_eq!(final_state.status, TaskStatus::Abandoned);
}

#[test]
fn backoff_delay_is_bounded_by_five_attempts_within_three_minutes() {
    let mut total = Duration::from_secs(0);
    for attempt in 0..MAX_ATTEMPTS {
        total += backoff_delay(attempt, 1.0); // worst-case jitter
    }
    assert!(total <= Duration::from_secs(MAX_TOTAL_RETRY_SECS));
}

#[test]
fn backoff_delay_grows_with_attempt_number() {
    let first = backoff_delay(0, 0.5);
    let third = backoff_delay(2, 0.5);
    assert!(third > first);
}

struct CountingHandler {
    calls: AtomicUsize,
    fail_until: usize,
}

#[async_trait::async_trait]
impl ReindexHandler for CountingHandler {
    async fn reindex(&self, _kind: ReindexKind, _uuid: Uuid) -> crate::error::Result<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_until {
            Err(crate::error::CuratorError::unavailable("simulated"))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn worker_pool_retries_until_the_handler_succeeds() {
    let pool = test_pool().await;
    let queue = ReindexQueue::new(pool);
    let uuid = Uuid::new_v4();
    queue.enqueue(ReindexKind::Image, uuid).await.unwrap();

    let handler = Arc::new(CountingHandler {
        calls: AtomicUsize::new(0),
        fail_until: 2,
    });

    let worker = WorkerPool::new(
        queue.clone(),
        handler.clone(),
        WorkerConfig {
            concurrency: 1,
            poll_interval: Duration::from_millis(10),
        },
    );

    let cancellation = tokio_util::sync::CancellationToken::new();
    let run_cancellation = cancellation.clone();
    let run = tokio::spawn(async move { worker.run(run_cancellation).await });

    let key = ReindexTask::task_key_for(ReindexKind::Image, uuid);
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if let Some(task) = queue.get(&key).await.unwrap() {
            if task.status == TaskStatus::Completed {
                break;
            }
        }
    }
    cancellation.cancel();
    let _ = run.await;

    let final_state = queue.get(&key).await.unwrap().unwrap();
    assert_eq!(final_state.status, TaskStatus::Completed);
    assert!(handler.calls.load(Ordering::SeqCst) >= 2);
}

fn queue_pool(queue: &ReindexQueue) -> &SqlitePool {
    &queue.pool
}
