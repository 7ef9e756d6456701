//! Error types for mailsift.
//!
//! Library crates use [`MailsiftError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all mailsift operations.
#[derive(Debug, thiserror::Error)]
pub enum MailsiftError {
    /// A required run input or configuration value is missing or invalid.
    #[error("config error: {message}")]
    Config { message: String },

    /// A step kept failing after every permitted attempt.
    #[error("step '{step}' failed after {attempts} attempt(s): {reason}")]
    RetryExhausted {
        step: String,
        attempts: u32,
        reason: String,
    },

    /// Input the resolver cannot work with (e.g. an unusable clustering policy).
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Recipient source (mailbox) error.
    #[error("source error: {0}")]
    Source(String),

    /// Domain verification error.
    #[error("verification error: {0}")]
    Verification(String),

    /// Export collaborator error.
    #[error("export error: {0}")]
    Export(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MailsiftError>;

impl MailsiftError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an invalid-input error from any displayable message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error reports a missing or invalid run input.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}
