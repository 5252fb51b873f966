//! Error types for the synchronization engine.

use tandem_core::classify::{classify, Classify, ErrorKind, RawError};
use tandem_core::error::CoreError;

use crate::transport::TransportError;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// A failure reported by a store adapter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A failure from a non-SQL backend, carried as reported.
    #[error("Store error: {0}")]
    Raw(RawError),

    /// A stored row could not be converted into its domain type.
    #[error("Corrupt stored row: {0}")]
    Decode(CoreError),
}

impl Classify for StoreError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            StoreError::Database(err) => classify_sqlx(err),
            StoreError::Raw(raw) => classify(raw),
            StoreError::Decode(_) => ErrorKind::Unknown,
        }
    }
}

/// Classify a sqlx error.
///
/// - Pool timeouts are `NetworkTimeout`.
/// - I/O, TLS, and closed pools are `NetworkUnavailable`.
/// - PostgreSQL error codes are mapped directly where they are unambiguous.
/// - Everything else falls back to the message heuristics.
pub fn classify_sqlx(err: &sqlx::Error) -> ErrorKind {
    match err {
        sqlx::Error::PoolTimedOut => ErrorKind::NetworkTimeout,
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => ErrorKind::NetworkUnavailable,
        sqlx::Error::RowNotFound => ErrorKind::NotFound,
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.into_owned());
            match code.as_deref() {
                Some("23505") => ErrorKind::Conflict,
                Some("42501") => ErrorKind::PermissionDenied,
                Some("23502") | Some("23514") => ErrorKind::InvalidInput,
                Some(c) if c.starts_with("22") => ErrorKind::InvalidInput,
                _ => classify(&RawError {
                    code,
                    status: None,
                    message: Some(db_err.message().to_string()),
                }),
            }
        }
        other => classify(&RawError::message(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Any failure surfaced by an engine component.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Classify for EngineError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            EngineError::Core(err) => err.error_kind(),
            EngineError::Store(err) => err.error_kind(),
            EngineError::Transport(err) => err.error_kind(),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Store(StoreError::Database(err))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
