use serde::Serialize;
use std::fmt;

/// Classification of a failed fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection failure or timeout
    Transport,
    /// Any status other than 200
    HttpStatus,
    /// Status 200 with a media type that does not match the expected prefix
    InvalidContentType,
    /// The run was cancelled or its deadline passed before the attempt started
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::HttpStatus => "http_status",
            ErrorKind::InvalidContentType => "invalid_content_type",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Error produced by a single fetch attempt.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("request to {url} timed out: {message}")]
    Timeout { url: String, message: String },

    #[error("HTTP {status}: failed to download from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("invalid content type '{content_type}' for URL {url}, expected {expected}*")]
    InvalidContentType {
        url: String,
        content_type: String,
        expected: String,
    },

    #[error("fetch of {url} cancelled before attempt {attempt}")]
    Cancelled { url: String, attempt: u32 },
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Transport { .. } | FetchError::Timeout { .. } => ErrorKind::Transport,
            FetchError::HttpStatus { .. } => ErrorKind::HttpStatus,
            FetchError::InvalidContentType { .. } => ErrorKind::InvalidContentType,
            FetchError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Cancellation ends the attempt loop; everything else is retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Cancelled { .. })
    }
}

/// Problems with the requested target set or run settings. Fatal before any target runs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no valid targets selected")]
    NoTargets,

    #[error("duplicate target name: {0}")]
    DuplicateTarget(String),

    #[error("invalid target name '{0}': must be a single non-empty path component")]
    InvalidTargetName(String),

    #[error("target '{name}' has an unusable canonical path '{path}'")]
    InvalidCanonicalPath { name: String, path: String },

    #[error("target '{0}' has an empty source URL")]
    EmptyUrl(String),

    #[error("max attempts must be at least 1")]
    ZeroAttempts,

    #[error("backoff base must be at least 2, got {0}")]
    BackoffBase(u32),

    #[error("timeout must be greater than zero")]
    ZeroTimeout,

    #[error("failed to read target table {path}: {source}")]
    ReadTable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse target table {path}: {source}")]
    ParseTable {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
