//! Error types for remote API operations.
//!
//! Errors are categorized so callers can give appropriate feedback.
//! Nothing in this crate retries; a failed call is reported as-is.

use std::fmt;

/// Result type alias for remote API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of remote errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transport-level failure (connection, TLS, DNS).
    Network,
    /// The path does not exist on the server.
    NotFound,
    /// The token is missing or lacks the required capability.
    Permission,
    /// The server answered with something we could not parse.
    Format,
    /// The server rejected the request (validation, conflict, sealed, ...).
    Rejected,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::NotFound => "Path not found",
            Self::Permission => "Permission denied",
            Self::Format => "Invalid response format",
            Self::Rejected => "Request rejected by server",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check the server address, TLS settings and connectivity",
            Self::NotFound => "Verify the mount or path exists",
            Self::Permission => "Check that the token has the required policy capabilities",
            Self::Format => "Verify the server version is supported",
            Self::Rejected => "Check the configuration payload against the server's API docs",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to the server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request never produced an HTTP response.
    #[error("request to {path} failed: {message}")]
    Transport {
        /// Logical path that was requested.
        path: String,
        /// Error message.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("{path}: HTTP {status}: {message}")]
    Status {
        /// Logical path that was requested.
        path: String,
        /// HTTP status code.
        status: u16,
        /// Error messages reported by the server.
        message: String,
    },

    /// Invalid response body.
    #[error("invalid response from {path}: {message}")]
    InvalidResponse {
        /// Logical path that was requested.
        path: String,
        /// Parse error.
        message: String,
    },

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a transport error for a path.
    pub fn transport(path: &str, message: impl fmt::Display) -> Self {
        Self::Transport {
            path: path.to_string(),
            message: message.to_string(),
        }
    }

    /// Create an error from a non-success response.
    ///
    /// The server reports failures as `{"errors": ["..."]}`; those messages
    /// are joined, otherwise the raw body is kept.
    pub fn from_response(path: &str, status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v["errors"].as_array().map(|errors| {
                    errors
                        .iter()
                        .filter_map(|e| e.as_str())
                        .collect::<Vec<_>>()
                        .join("; ")
                })
            })
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| body.trim().to_string());

        Self::Status {
            path: path.to_string(),
            status,
            message,
        }
    }

    /// Create an invalid-response error.
    pub fn invalid(path: &str, message: impl fmt::Display) -> Self {
        Self::InvalidResponse {
            path: path.to_string(),
            message: message.to_string(),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Transport { .. } => ErrorCategory::Network,
            Error::Status { status, .. } => match status {
                401 | 403 => ErrorCategory::Permission,
                404 => ErrorCategory::NotFound,
                _ => ErrorCategory::Rejected,
            },
            Error::InvalidResponse { .. } => ErrorCategory::Format,
            Error::Other(_) => ErrorCategory::Other,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse {
            path: String::new(),
            message: err.to_string(),
        }
    }
}
