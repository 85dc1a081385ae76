//! Primary Store: the authoritative record store for images, people, tags
//! and their associations, backed by `sqlx` against SQLite.
//!
//! Every mutating operation here runs inside a single transaction. SQLite has
//! no deferrable UNIQUE constraint (only deferrable foreign keys), so the
//! `(parent_id, position)` sibling-ordering invariant is kept intact across a
//! renormalisation by staging the rewrite through a disjoint negative range
//! before writing final positions, rather than relying on constraint
//! deferral — see [`tags::renormalise_siblings`].

pub mod associations;
pub mod images;
pub mod migrations;
pub mod people;
pub mod tags;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Result;

/// Connection pool configuration, following the builder-style shape used
/// throughout this codebase for backend configs.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_path: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            database_path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_path: "curator.db".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 10,
            idle_timeout_secs: 600,
            busy_timeout_ms: 5000,
        }
    }
}

pub async fn create_database_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str(&format!(
        "sqlite://{}?mode=rwc",
        config.database_path
    ))
    .map_err(|e| crate::error::CuratorError::internal(format!("invalid database path: {e}")))?
    .synchronous(SqliteSynchronous::Normal)
    .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect_with(connect_options)
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    Ok(pool)
}

/// Aggregates the pool and the per-entity repositories. Cloning is cheap: the
/// pool is reference-counted and repositories are zero-sized handles over it.
#[derive(Clone)]
pub struct PrimaryStore {
    pub pool: SqlitePool,
}

impl PrimaryStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = create_database_pool(config).await?;
        migrations::run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (PrimaryStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let config = DatabaseConfig::with_path(path.to_string_lossy().to_string());
        let store = PrimaryStore::connect(&config).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn pool_connects_and_migrates() {
        let (store, _dir) = test_store().await;
        store.ping().await.unwrap();
        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(&store.pool)
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert!(names.contains(&"images"));
        assert!(names.contains(&"tags"));
        assert!(names.contains(&"tag_closure"));
    }
}
