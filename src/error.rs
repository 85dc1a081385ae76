//! Error types shared across the query, indexing and hierarchy subsystem.
//!
//! Every component exposes its own leaf error enum (`ps::Error`, `ti::Error`,
//! `vi::Error`, `hc::Error`, `cursor::Error`, `reindex::Error`) and converts
//! into [`CuratorError`] at the boundary where the Services Layer talks to
//! callers. Callers that only need to branch on category use [`ErrorKind`]
//! rather than matching the full enum.

use thiserror::Error;
use uuid::Uuid;

/// Coarse classification of a [`CuratorError`], used by the Services Layer to
/// decide whether a secondary-store failure should be logged and swallowed or
/// surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidInput,
    Unavailable,
    Internal,
}

#[derive(Debug, Error)]
pub enum CuratorError {
    #[error("not found")]
    NotFound,

    #[error("conflicting record {uuid}")]
    Conflict { uuid: Uuid },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl CuratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CuratorError::NotFound => ErrorKind::NotFound,
            CuratorError::Conflict { .. } => ErrorKind::Conflict,
            CuratorError::InvalidInput { .. } => ErrorKind::InvalidInput,
            CuratorError::Unavailable { .. } => ErrorKind::Unavailable,
            CuratorError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        CuratorError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn conflict(uuid: Uuid) -> Self {
        CuratorError::Conflict { uuid }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        CuratorError::Internal {
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        CuratorError::Unavailable {
            reason: reason.into(),
        }
    }

    /// Whether this error, raised after a Primary Store commit, should be
    /// logged and swallowed (secondary stores converge eventually) rather
    /// than surfaced to the caller as a write failure.
    pub fn is_post_commit_internal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Internal)
    }
}

pub type Result<T> = std::result::Result<T, CuratorError>;

impl From<sqlx::Error> for CuratorError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => CuratorError::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                CuratorError::Internal {
                    reason: format!("unique constraint violation: {}", db_err),
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => CuratorError::Unavailable {
                reason: err.to_string(),
            },
            other => CuratorError::Internal {
                reason: other.to_string(),
            },
        }
    }
}

impl From<crate::ti::Error> for CuratorError {
    fn from(err: crate::ti::Error) -> Self {
        CuratorError::Internal {
            reason: err.to_string(),
        }
    }
}

impl From<crate::vi::Error> for CuratorError {
    fn from(err: crate::vi::Error) -> Self {
        CuratorError::Internal {
            reason: err.to_string(),
        }
    }
}

impl From<crate::hc::Error> for CuratorError {
    fn from(err: crate::hc::Error) -> Self {
        CuratorError::Internal {
            reason: err.to_string(),
        }
    }
}

impl From<crate::cursor::Error> for CuratorError {
    fn from(err: crate::cursor::Error) -> Self {
        CuratorError::InvalidInput {
            reason: "invalid cursor".to_string(),
        }
        .tap_log(&err)
    }
}

impl CuratorError {
    fn tap_log(self, err: &dyn std::error::Error) -> Self {
        tracing::debug!(error = %err, "cursor decode failed");
        self
    }
}

impl From<crate::external::Error> for CuratorError {
    fn from(err: crate::external::Error) -> Self {
        match err {
            crate::external::Error::Network(e) => CuratorError::Unavailable { reason: e.to_string() },
            other => CuratorError::Internal {
                reason: other.to_string(),
            },
        }
    }
}

impl From<crate::reindex::Error> for CuratorError {
    fn from(err: crate::reindex::Error) -> Self {
        match err {
            crate::reindex::Error::Sqlx(e) => e.into(),
            other => CuratorError::Internal {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_carries_uuid() {
        let id = Uuid::now_v7();
        let err = CuratorError::conflict(id);
        assert_eq!(err.kind(), ErrorKind::Conflict);
        match err {
            CuratorError::Conflict { uuid } => assert_eq!(uuid, id),
            _ => panic!("expected conflict"),
        }
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: CuratorError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn internal_errors_are_post_commit_safe() {
        let err = CuratorError::internal("secondary write failed");
        assert!(err.is_post_commit_internal());
        let err = CuratorError::invalid("bad limit");
        assert!(!err.is_post_commit_internal());
    }
}
