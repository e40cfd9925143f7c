//! Error type shared by the identity, store and facade layers.
//!
//! None of these errors ever reach a caller of the [`FireLog`](crate::FireLog)
//! facade: they are logged at the operation boundary, optionally handed to
//! an error observer, and dropped.

use reqwest::StatusCode;

/// Errors that can occur while resolving identity or writing to the store.
#[derive(Debug)]
pub enum FireLogError {
    /// The installation identity provider failed, denied, or timed out
    IdentityUnavailable(String),

    /// Application version metadata could not be read
    PackageMetadataUnavailable(String),

    /// The store could not mint a new log key
    KeyGenerationFailed(String),

    /// HTTP request to the remote store failed
    Request(reqwest::Error),

    /// Remote store rejected the request
    Status {
        code: StatusCode,
        message: String,
    },

    /// Request to the remote store timed out
    Timeout,

    /// A record could not be encoded or decoded
    Codec(String),

    /// A path segment is not a legal database key
    InvalidKey(String),

    /// Machine kind outside the known closed set
    UnknownMachineKind(String),

    /// Configuration field name outside the known set
    UnknownField(String),

    /// Client configuration error
    Config(String),
}

impl FireLogError {
    /// Whether this error came from the transport to the remote store.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FireLogError::Request(_) | FireLogError::Status { .. } | FireLogError::Timeout
        )
    }
}

impl std::fmt::Display for FireLogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FireLogError::IdentityUnavailable(e) => write!(f, "Identity unavailable: {}", e),
            FireLogError::PackageMetadataUnavailable(e) => {
                write!(f, "Package metadata unavailable: {}", e)
            }
            FireLogError::KeyGenerationFailed(e) => write!(f, "Failed to generate log key: {}", e),
            FireLogError::Request(e) => write!(f, "HTTP request failed: {}", e),
            FireLogError::Status { code, message } => {
                write!(f, "Store error ({}): {}", code, message)
            }
            FireLogError::Timeout => write!(f, "Request timed out"),
            FireLogError::Codec(e) => write!(f, "Failed to encode or decode record: {}", e),
            FireLogError::InvalidKey(key) => write!(f, "Invalid database key: {:?}", key),
            FireLogError::UnknownMachineKind(kind) => {
                write!(f, "Unknown vending machine type: {}", kind)
            }
            FireLogError::UnknownField(field) => {
                write!(f, "Unknown configuration field: {}", field)
            }
            FireLogError::Config(e) => write!(f, "Client configuration error: {}", e),
        }
    }
}

impl std::error::Error for FireLogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FireLogError::Request(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FireLogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FireLogError::Timeout
        } else {
            FireLogError::Request(err)
        }
    }
}

impl From<serde_json::Error> for FireLogError {
    fn from(err: serde_json::Error) -> Self {
        FireLogError::Codec(err.to_string())
    }
}
