//! Error types for the sync layer.
//!
//! [`FetchError`] describes what went wrong on the wire; [`SyncError`] is
//! what callers of the sync engine see. Raw `reqwest` and `rusqlite` errors
//! never cross that boundary.

use ledgerlink_storage::StorageError;
use ledgerlink_types::ProfileId;
use thiserror::Error;

/// Result type for transport operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Transport-level failures talking to a ledger server.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Connection, TLS or protocol failure.
    #[error("http error: {0}")]
    Http(String),

    /// The endpoint does not exist on this server.
    #[error("not found")]
    NotFound,

    /// The server wants (other) credentials.
    #[error("authentication required")]
    Unauthorized,

    /// The server refused the request body (400/405 on a write).
    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Any other non-success status.
    #[error("unexpected status {status}")]
    Status { status: u16 },

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The response body could not be understood.
    #[error("decode error: {0}")]
    Decode(String),

    /// The caller cancelled the operation.
    #[error("cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Http(e.to_string())
        }
    }
}

/// Coarse classification of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncErrorKind {
    Network,
    Timeout,
    Authentication,
    Server,
    Parse,
    ApiVersion,
    Validation,
    Storage,
    Cancelled,
    AlreadyRunning,
    Unknown,
}

/// Errors that can occur in sync operations.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The server answered with an error status.
    #[error("server error: HTTP {status}")]
    Server { status: u16 },

    /// Server data could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// No supported API version could talk to the server.
    #[error("unsupported API version: {0}")]
    ApiVersion(String),

    /// Local data is not fit to be sent.
    #[error("validation error: {0}")]
    Validation(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// The sync was cancelled; the cache was left as it was.
    #[error("sync cancelled")]
    Cancelled,

    /// A sync for this profile is already in flight.
    #[error("a sync for profile {0} is already running")]
    AlreadyRunning(ProfileId),

    /// Anything else, e.g. a panicked worker.
    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl SyncError {
    #[must_use]
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            SyncError::Network(_) => SyncErrorKind::Network,
            SyncError::Timeout => SyncErrorKind::Timeout,
            SyncError::Auth(_) => SyncErrorKind::Authentication,
            SyncError::Server { .. } => SyncErrorKind::Server,
            SyncError::Parse(_) => SyncErrorKind::Parse,
            SyncError::ApiVersion(_) => SyncErrorKind::ApiVersion,
            SyncError::Validation(_) => SyncErrorKind::Validation,
            SyncError::Storage(_) => SyncErrorKind::Storage,
            SyncError::Cancelled => SyncErrorKind::Cancelled,
            SyncError::AlreadyRunning(_) => SyncErrorKind::AlreadyRunning,
            SyncError::Unknown(_) => SyncErrorKind::Unknown,
        }
    }

    /// True when trying again later may succeed without user action.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::Timeout => true,
            SyncError::Server { status } => *status >= 500,
            _ => false,
        }
    }
}

impl From<FetchError> for SyncError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Http(msg) => SyncError::Network(msg),
            FetchError::NotFound => SyncError::Server { status: 404 },
            FetchError::Unauthorized => SyncError::Auth("authentication required".into()),
            FetchError::Rejected { status, body } => {
                SyncError::ApiVersion(format!("HTTP {status}: {body}"))
            }
            FetchError::Status { status } => SyncError::Server { status },
            FetchError::Timeout => SyncError::Timeout,
            FetchError::Decode(msg) => SyncError::Parse(msg),
            FetchError::Cancelled => SyncError::Cancelled,
        }
    }
}

impl From<StorageError> for SyncError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Cancelled => SyncError::Cancelled,
            other => SyncError::Storage(other.to_string()),
        }
    }
}
