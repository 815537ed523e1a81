//! Configuration for the report mailbox
//!
//! All configuration is loaded from environment variables named
//! `MAIL_IMAP_<KEY>`. A `.env` file in the working directory is honored.

use std::env;
use std::env::VarError;
use std::time::Duration;

use secrecy::SecretString;

use crate::errors::{AppError, AppResult};

/// Mailbox configuration
///
/// Holds connection details, credentials and command timeouts for the one
/// mailbox that receives aggregate reports. The password is stored using
/// `SecretString` to prevent accidental logging.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// IMAP server hostname
    pub host: String,
    /// IMAP server port (typically 993 for TLS)
    pub port: u16,
    /// Whether to use TLS (currently enforced to `true`)
    pub secure: bool,
    /// Username for authentication
    pub user: String,
    /// Password stored in a type that prevents accidental logging
    pub pass: SecretString,
    /// Mailbox to select (e.g. `INBOX`, `DMARC`)
    pub mailbox: String,
    /// TCP connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// IMAP greeting/TLS handshake/login timeout in milliseconds
    pub greeting_timeout_ms: u64,
    /// Per-command socket timeout in milliseconds
    pub socket_timeout_ms: u64,
}

impl MailboxConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a required variable is missing or a value
    /// is malformed.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// MAIL_IMAP_HOST=imap.example.com
    /// MAIL_IMAP_USER=dmarc@example.com
    /// MAIL_IMAP_PASS=app-password
    /// MAIL_IMAP_MAILBOX=INBOX
    /// ```
    pub fn load_from_env() -> AppResult<Self> {
        Ok(Self {
            host: required_env("MAIL_IMAP_HOST")?,
            port: parse_u16_env("MAIL_IMAP_PORT", 993)?,
            secure: parse_bool_env("MAIL_IMAP_SECURE", true)?,
            user: required_env("MAIL_IMAP_USER")?,
            pass: SecretString::new(required_env("MAIL_IMAP_PASS")?.into()),
            mailbox: optional_env("MAIL_IMAP_MAILBOX")?.unwrap_or_else(|| "INBOX".to_owned()),
            connect_timeout_ms: parse_u64_env("MAIL_IMAP_CONNECT_TIMEOUT_MS", 30_000)?,
            greeting_timeout_ms: parse_u64_env("MAIL_IMAP_GREETING_TIMEOUT_MS", 15_000)?,
            socket_timeout_ms: parse_u64_env("MAIL_IMAP_SOCKET_TIMEOUT_MS", 300_000)?,
        })
    }

    /// Per-command socket timeout
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }
}

/// Read a required environment variable, returning error if missing or empty
fn required_env(key: &str) -> AppResult<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::InvalidInput(format!(
            "missing required environment variable {key}"
        ))),
    }
}

/// Read an optional environment variable; empty values count as unset
fn optional_env(key: &str) -> AppResult<Option<String>> {
    match env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Parse a boolean environment variable with flexible values
///
/// Accepts: `1`, `true`, `yes`, `y`, `on` (truthy) or `0`, `false`, `no`,
/// `n`, `off` (falsy). Case-insensitive. Returns `default` if unset.
fn parse_bool_env(key: &str, default: bool) -> AppResult<bool> {
    match optional_env(key)? {
        Some(v) => parse_bool_value(&v).ok_or_else(|| {
            AppError::InvalidInput(format!("invalid boolean environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn parse_u16_env(key: &str, default: u16) -> AppResult<u16> {
    match optional_env(key)? {
        Some(v) => v.trim().parse::<u16>().map_err(|_| {
            AppError::InvalidInput(format!("invalid u16 environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

fn parse_u64_env(key: &str, default: u64) -> AppResult<u64> {
    match optional_env(key)? {
        Some(v) => v.trim().parse::<u64>().map_err(|_| {
            AppError::InvalidInput(format!("invalid u64 environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}
