//! `curator-server`: boots the Primary Store, Text Index, Vector Index,
//! Hierarchy Cache and Reindex Worker, wires them into the Services Layer,
//! and runs the worker pool until asked to shut down.
//!
//! Two-phase construction breaks the circular dependency between the
//! Services Layer and the Reindex Worker: `Services` is built first and
//! wrapped in an `Arc`, which coerces to `Arc<dyn ReindexHandler>` for the
//! worker pool, so neither side needs to own a reference to the other's
//! concrete type.

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use curator::config::AppConfig;
use curator::external::embedding::{EmbeddingClient, EmbeddingClientConfig};
use curator::external::object_store::{ObjectStoreClient, ObjectStoreConfig};
use curator::hc::{HierarchyCache, HierarchyCacheConfig};
use curator::logging::{LogLevel, LogOutput, LoggingConfig, LoggingSystem};
use curator::ps::{self, DatabaseConfig};
use curator::reindex::{ReindexQueue, WorkerConfig, WorkerPool};
use curator::services::Services;
use curator::ti::{TextIndex, TextIndexConfig};
use curator::vi::{VectorIndex, VectorIndexConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_config = AppConfig::load(std::env::var("CURATOR_CONFIG_FILE").ok().as_deref())?;

    let _logging = LoggingSystem::init(LoggingConfig {
        level: log_level(&app_config.log_level),
        output: LogOutput::Console,
        ..Default::default()
    })?;

    tracing::info!(port = app_config.port, "starting curator-server");

    let db_config = DatabaseConfig::with_path(app_config.primary_store.database_path.clone())
        .with_max_connections(app_config.primary_store.max_connections);
    let pool = ps::create_database_pool(&db_config).await?;
    sqlx::query("SELECT 1").execute(&pool).await?;
    ps::migrations::run(&pool).await?;
    ensure_reindex_table(&pool).await?;

    let ti = TextIndex::open(&TextIndexConfig {
        base_path: PathBuf::from(app_config.text_index.index_path.clone()),
    })?;

    let vi = VectorIndex::connect(&VectorIndexConfig {
        url: format!("{}:{}", app_config.vector_index.host, app_config.vector_index.port),
        collection: app_config.vector_index.collection.clone(),
    })?;

    let hc = HierarchyCache::connect(&HierarchyCacheConfig {
        host: app_config.cache.host.clone(),
        port: app_config.cache.port,
    })?;

    let reindex_queue = ReindexQueue::new(pool.clone());

    let embedding = EmbeddingClient::new(EmbeddingClientConfig::from_host_port(
        &app_config.embedding_service.host,
        app_config.embedding_service.port,
    ))?;

    let object_store = ObjectStoreClient::new(ObjectStoreConfig {
        endpoint: app_config.object_store.endpoint.clone(),
        bucket: app_config.object_store.bucket.clone(),
        access_key: app_config.object_store.access_key.clone(),
        secret_key: SecretString::new(app_config.object_store.secret_key.clone()),
        path_style: app_config.object_store.path_style,
    })?;

    let services = Arc::new(Services::new(
        pool,
        ti,
        vi,
        hc,
        reindex_queue.clone(),
        app_config.encryption_key_secret(),
        embedding,
        object_store,
    ));

    services.initialize().await?;

    let worker = WorkerPool::new(reindex_queue, services.clone(), WorkerConfig::default());
    let cancellation = CancellationToken::new();

    let worker_cancellation = cancellation.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_cancellation).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining reindex worker");
    cancellation.cancel();
    let _ = worker_handle.await;

    Ok(())
}

async fn ensure_reindex_table(pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS reindex_tasks (
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
    .execute(pool)
    .await?;
    Ok(())
}

fn log_level(s: &str) -> LogLevel {
    match s.to_ascii_lowercase().as_str() {
        "trace" => LogLevel::Trace,
        "debug" => LogLevel::Debug,
        "warn" => LogLevel::Warn,
        "error" => LogLevel::Error,
        _ => LogLevel::Info,
    }
}
