//! Mirror Engine Error Hierarchy
//!
//! Errors are split by where they originate: caller input (paths, arguments),
//! mirror lookups, and the remote coordination service.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Path failed validation before any remote call was issued
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// Well-formed request that the engine refuses to execute
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Path is not present (in the mirror for reads, remotely for writes)
    #[error("Node not found: {0}")]
    NotFound(String),

    /// Conditional write rejected because the remote version moved on
    #[error("Version conflict on {path}: expected {expected}, actual {actual}")]
    VersionConflict {
        path: String,
        expected: i32,
        actual: i32,
    },

    /// `watch()` was engaged more than once on the same engine
    #[error("Mirror is already watching")]
    AlreadyWatching,

    /// Session is gone for good; the mirror has been invalidated
    #[error("Session expired")]
    SessionExpired,

    /// Remaining remote failures
    #[error(transparent)]
    Remote(RemoteError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Retry policy exhaustion
    #[error("Retry exhausted after {attempts} attempts: {last}")]
    RetryExhausted { attempts: usize, last: Box<Error> },

    /// Retry attempt exceeded its timeout
    #[error("Retry attempt timed out")]
    RetryTimeout,

    /// Unrecoverable failures of the dispatch worker
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Failures reported by the remote coordination service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("No node at {0}")]
    NoNode(String),

    #[error("Node already exists at {0}")]
    NodeExists(String),

    #[error("Node {0} has children")]
    NotEmpty(String),

    #[error("Bad version for {path}: expected {expected}, actual {actual}")]
    BadVersion {
        path: String,
        expected: i32,
        actual: i32,
    },

    #[error("Ephemeral node {0} cannot have children")]
    NoChildrenForEphemerals(String),

    #[error("Bad arguments: {0}")]
    BadArguments(String),

    /// Transient; the call may be retried
    #[error("Connection loss")]
    ConnectionLoss,

    #[error("Session expired")]
    SessionExpired,
}

impl RemoteError {
    /// Whether a retry of the same call can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::ConnectionLoss)
    }
}

impl From<RemoteError> for Error {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::NoNode(path) => Error::NotFound(path),
            RemoteError::BadVersion {
                path,
                expected,
                actual,
            } => Error::VersionConflict {
                path,
                expected,
                actual,
            },
            RemoteError::SessionExpired => Error::SessionExpired,
            other => Error::Remote(other),
        }
    }
}

impl Error {
    /// Transient failures worth another attempt under a backoff policy
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Remote(e) => e.is_retryable(),
            Error::RetryTimeout => true,
            _ => false,
        }
    }
}
