//! Error types and the error classifier.
//!
//! Transport and operation failures are reported as [`OptimizerError`]
//! variants carrying a structured status code or kind. The classifier maps
//! them onto the closed [`ErrorKind`] taxonomy, decides whether they are
//! worth retrying, and picks the user-facing message.
//!
//! Failures that leave the optimizer are wrapped in an [`EnhancedError`]
//! with retry and classification metadata.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Errors produced by operations, transports and the optimizer itself.
///
/// All variants are `Clone` so a single failure can be handed to every
/// caller attached to a deduplicated request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptimizerError {
    // Transport errors
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error ({status}): {message}")]
    Http { status: u16, message: String },

    /// Business-level failure reported inside a successful HTTP envelope.
    #[error("API error ({code}): {message}")]
    Api { code: i64, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    // Local errors
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Superseded by a newer identical request, or cancelled explicitly.
    #[error("request cancelled")]
    Cancelled,

    #[error("optimizer destroyed")]
    Destroyed,

    /// The dispatch task panicked or was aborted by the runtime.
    #[error("dispatch task failed: {0}")]
    Task(String),

    #[error("{0}")]
    Other(String),
}

impl OptimizerError {
    /// Status code carried by the error, if any.
    ///
    /// HTTP statuses and business codes share one code space, as the
    /// backend reuses HTTP numbers (401, 403, ...) for business codes.
    pub fn code(&self) -> Option<i64> {
        match self {
            OptimizerError::Http { status, .. } => Some(i64::from(*status)),
            OptimizerError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Map this error onto the closed taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OptimizerError::Network(_) => ErrorKind::Network,
            OptimizerError::Timeout(_) => ErrorKind::Timeout,
            other => match other.code() {
                Some(401) => ErrorKind::Auth,
                Some(403) => ErrorKind::Permission,
                Some(404) => ErrorKind::NotFound,
                Some(code) if code >= 500 => ErrorKind::Server,
                _ => ErrorKind::Unknown,
            },
        }
    }

    /// Whether retrying the failed operation may succeed.
    ///
    /// Network, timeout and 5xx failures are retryable; 4xx are not.
    /// Anything unrecognised falls back to retryable, except errors raised
    /// locally by this crate, which a retry cannot change.
    pub fn is_retryable(&self) -> bool {
        match self {
            OptimizerError::Network(_) | OptimizerError::Timeout(_) => true,
            OptimizerError::InvalidInput(_)
            | OptimizerError::Configuration(_)
            | OptimizerError::Cancelled
            | OptimizerError::Destroyed => false,
            other => match other.code() {
                Some(code) if code >= 500 => true,
                Some(code) if (400..500).contains(&code) => false,
                _ => true,
            },
        }
    }

    /// User-facing message for this error's category.
    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }
}

/// Closed error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "NETWORK_ERROR")]
    Network,
    #[serde(rename = "TIMEOUT_ERROR")]
    Timeout,
    #[serde(rename = "AUTH_ERROR")]
    Auth,
    #[serde(rename = "PERMISSION_ERROR")]
    Permission,
    #[serde(rename = "NOT_FOUND_ERROR")]
    NotFound,
    #[serde(rename = "SERVER_ERROR")]
    Server,
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

impl ErrorKind {
    /// Wire name of the category, e.g. `"AUTH_ERROR"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Timeout => "TIMEOUT_ERROR",
            ErrorKind::Auth => "AUTH_ERROR",
            ErrorKind::Permission => "PERMISSION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND_ERROR",
            ErrorKind::Server => "SERVER_ERROR",
            ErrorKind::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Fixed message shown to end users for this category.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => {
                "network connection error, please check your network settings and try again"
            }
            ErrorKind::Timeout => "request timed out, please try again later",
            ErrorKind::Auth => "login expired, please log in again",
            ErrorKind::Permission => "insufficient permissions to access this feature",
            ErrorKind::NotFound => "the requested resource does not exist",
            ErrorKind::Server => "server is busy, please try again later",
            ErrorKind::Unknown => "operation failed, please try again later",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of an optimized call.
///
/// Wraps the last [`OptimizerError`] seen with the number of retries that
/// were spent, when the failure was surfaced, and its classification.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct EnhancedError {
    pub message: String,
    #[source]
    pub original: OptimizerError,
    /// Retries performed before giving up (0 = failed on the first attempt).
    pub retry_count: u32,
    pub timestamp: SystemTime,
    pub kind: ErrorKind,
    pub can_retry: bool,
}

impl EnhancedError {
    pub fn new(original: OptimizerError, retry_count: u32) -> Self {
        Self {
            message: original.to_string(),
            retry_count,
            timestamp: SystemTime::now(),
            kind: original.kind(),
            can_retry: original.is_retryable(),
            original,
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }

    /// Serializable summary for UI or logging layers.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind,
            message: self.message.clone(),
            can_retry: self.can_retry,
            timestamp_ms: unix_millis(self.timestamp),
            user_message: self.user_message().to_string(),
        }
    }
}

impl From<OptimizerError> for EnhancedError {
    fn from(err: OptimizerError) -> Self {
        EnhancedError::new(err, 0)
    }
}

/// Flat, serializable description of a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    pub can_retry: bool,
    pub timestamp_ms: u64,
    pub user_message: String,
}

impl ErrorReport {
    /// Classify a raw error without going through the optimizer.
    pub fn from_error(err: &OptimizerError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            can_retry: err.is_retryable(),
            timestamp_ms: unix_millis(SystemTime::now()),
            user_message: err.user_message().to_string(),
        }
    }
}

pub(crate) fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(crate::config::millis)
        .unwrap_or(0)
}

/// Result type alias for operations and transports.
pub type Result<T> = std::result::Result<T, OptimizerError>;

/// Result of an optimized call.
pub type CallResult<T> = std::result::Result<T, EnhancedError>;
