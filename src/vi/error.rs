//! Vector Index error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("qdrant transport error: {0}")]
    Transport(#[from] qdrant_client::QdrantError),

    #[error("embedding has dimension {actual}, expected {expected}")]
    WrongDimension { expected: usize, actual: usize },

    #[error("point id {0} is not a valid uuid")]
    BadPointId(String),

    #[error("collection {0} does not exist")]
    CollectionMissing(String),
}
