//! Application error model
//!
//! Defines a typed error hierarchy using `thiserror`. Two variants carry the
//! outcomes the caller's processing loop must tell apart: `Mailbox` (the
//! protocol or transport failed, message state unknown) and `Validation`
//! (the message was read fine but its attachment is not acceptable).

use thiserror::Error;

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid user input or configuration
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Authentication failure (bad credentials, account disabled)
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    /// Operation timeout (TCP connect, TLS handshake, IMAP response)
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// Mailbox protocol failure (command rejected, missing response data)
    #[error("mailbox error: {0}")]
    Mailbox(String),
    /// Attachment does not satisfy the acceptance policy
    #[error("validation failed: {0}")]
    Validation(String),
    /// Internal error (unexpected failure, external crate error)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Convenience constructor for `Validation`
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the error is an expected policy rejection
    ///
    /// Rejected messages should be skipped or flagged, not retried.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Type alias for fallible return values
pub type AppResult<T> = Result<T, AppError>;
