//! Reindex Worker error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("unknown reindex kind {0:?}")]
    UnknownKind(String),

    #[error("unknown task status {0:?}")]
    UnknownStatus(String),
}
