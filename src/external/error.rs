//! Error types for the thin external-collaborator clients.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{backend} returned HTTP {status}: {body}")]
    Http {
        backend: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("embedding service returned {actual} components, expected {expected}")]
    WrongDimension { expected: usize, actual: usize },
}
