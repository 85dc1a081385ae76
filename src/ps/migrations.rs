//! Embedded, idempotent schema migrations, applied at startup.
//!
//! Follows the teacher's checksum-recorded `schema_migrations` bookkeeping
//! pattern, reduced to the single ordered schema this service needs so far.

use sqlx::SqlitePool;

use crate::error::{CuratorError, Result};

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "001_initial_schema",
    sql: include_str!("../../migrations/001_initial_schema.sql"),
}];

async fn ensure_migrations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn current_version(pool: &SqlitePool) -> Result<i64> {
    ensure_migrations_table(pool).await?;
    let row: Option<(i64,)> = sqlx::query_as("SELECT MAX(version) FROM schema_migrations")
        .fetch_optional(pool)
        .await?;
    Ok(row.and_then(|r| Some(r.0)).unwrap_or(0))
}

/// Applies every migration with a version greater than the current schema
/// version, in order, each inside its own transaction.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    ensure_migrations_table(pool).await?;
    let current = current_version(pool).await?;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        apply(pool, migration).await?;
    }

    Ok(())
}

async fn apply(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    tracing::info!(version = migration.version, name = migration.name, "applying migration");

    let mut tx = pool.begin().await?;

    for statement in migration.sql.split(';') {
        let statement = statement.trim();
        if statement.is_empty() || statement.starts_with("--") {
            continue;
        }
        sqlx::query(statement).execute(&mut *tx).await.map_err(|e| {
            CuratorError::internal(format!(
                "migration {} failed at statement `{}`: {}",
                migration.version, statement, e
            ))
        })?;
    }

    sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, datetime('now'))")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
