//! Output records
//!
//! Serializable types describing a message overview and the outcome of
//! processing one message. The driver prints them as JSON lines.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// Single-message overview
///
/// Best-effort summary built from `ENVELOPE`, `FLAGS`, `RFC822.SIZE` and
/// `INTERNALDATE`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageOverview {
    /// Message UID within the selected mailbox
    pub uid: u32,
    /// Decoded Subject
    pub subject: Option<String>,
    /// First sender as `Name <mailbox@host>` or `mailbox@host`
    pub from: Option<String>,
    /// Date header as sent
    pub date: Option<String>,
    /// Message-ID header as sent
    pub message_id: Option<String>,
    /// Full message size in octets
    pub size: Option<u32>,
    /// Whether `\Seen` is set
    pub seen: bool,
    /// Server arrival time, RFC 3339
    pub internal_date: Option<String>,
}

/// Metadata of the accepted report attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentInfo {
    /// Decoded filename
    pub filename: String,
    /// Declared MIME content type
    pub content_type: String,
    /// Encoded size in octets as reported by the server
    pub size_bytes: Option<u64>,
    /// Section path within the message (e.g. `2`, `1.2`)
    pub part_id: String,
    /// Content-Transfer-Encoding
    pub encoding: String,
}

/// Whether a message's attachment passed the acceptance policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Accepted,
    Rejected,
}

/// Outcome of processing one message
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedMessage {
    /// Message UID
    pub uid: u32,
    /// Overview, when the server provided one
    pub overview: Option<MessageOverview>,
    pub status: Status,
    /// Number of named attachments found in the message
    pub attachment_count: usize,
    /// Rejection reason for `rejected` messages
    pub reason: Option<String>,
    /// Attachment metadata for `accepted` messages
    pub attachment: Option<AttachmentInfo>,
    /// Path the decoded attachment was written to
    pub saved_to: Option<String>,
    /// Whether `\Seen` was set by this run
    pub marked_seen: bool,
    /// UTC completion time, RFC 3339 with milliseconds
    pub processed_at: String,
    /// Processing duration in milliseconds
    pub duration_ms: u64,
}

/// Current UTC time in the format used by [`ProcessedMessage::processed_at`]
pub fn now_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
