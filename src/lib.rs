//! Curator — a media-cataloguing query/indexing/hierarchy service.
//!
//! Seven components carry the system: a Primary Store of record (`ps`), a
//! full-text Text Index (`ti`), a Vector Index for embedding similarity
//! (`vi`), a Hierarchy Cache over the tag forest (`hc`), an encrypted
//! pagination Cursor Codec (`cursor`), a durable Reindex Worker (`reindex`),
//! and the Services Layer (`services`) that orchestrates all of them behind
//! the invariants described there. `external` holds thin clients for the
//! two collaborators this crate depends on but does not own.

pub mod config;
pub mod cursor;
pub mod error;
pub mod external;
pub mod hc;
pub mod logging;
pub mod ps;
pub mod reindex;
pub mod services;
pub mod ti;
pub mod types;
pub mod vi;

pub use error::{CuratorError, Result};
pub use services::Services;
