//! Text Index error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("query parse error: {0}")]
    QueryParse(#[from] tantivy::query::QueryParserError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored document payload was not valid json: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("random sort requires a caller-supplied seed")]
    RandomSortNeedsSeed,

    #[error("cursor arity or type does not match the active sort axes")]
    CursorMismatch,
}
