//! Hierarchy Cache error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cached tag record was malformed: {0}")]
    Malformed(String),
}
