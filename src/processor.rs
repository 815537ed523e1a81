//! Per-message processing
//!
//! Drives one [`MailMessage`] through overview, validation, optional save
//! and optional `\Seen`. Policy rejections become `rejected` records; any
//! other failure aborts the run so the message is left for a later retry.

use std::path::PathBuf;
use std::time::Instant;

use crate::connection::{MailboxConnection, SharedConnection};
use crate::errors::{AppError, AppResult};
use crate::message::MailMessage;
use crate::models::{ProcessedMessage, Status, now_utc};

/// What to do with a message once its attachment is accepted
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Directory to write decoded attachments into
    pub save_dir: Option<PathBuf>,
    /// Set `\Seen` after the attachment has been handled
    pub mark_seen: bool,
}

/// Process a single message
///
/// # Errors
///
/// - `Mailbox` if the structure fetch, download or flag update failed
/// - `Internal` if the attachment could not be written
pub async fn process_message<C: MailboxConnection>(
    conn: &SharedConnection<C>,
    uid: u32,
    opts: &ProcessOptions,
) -> AppResult<ProcessedMessage> {
    let started = Instant::now();
    let mut message = MailMessage::new(conn.clone(), uid);
    let overview = message.summary().await;

    let mut record = ProcessedMessage {
        uid,
        overview,
        status: Status::Accepted,
        attachment_count: 0,
        reason: None,
        attachment: None,
        saved_to: None,
        marked_seen: false,
        processed_at: String::new(),
        duration_ms: 0,
    };

    match message.validate().await {
        Ok(()) => {}
        Err(e) if e.is_validation() => {
            tracing::warn!(uid, reason = %e, "message rejected");
            record.attachment_count = message.attachment_count().await?;
            record.status = Status::Rejected;
            record.reason = Some(e.to_string());
            return Ok(finish(record, started));
        }
        Err(e) => return Err(e),
    }
    record.attachment_count = message.attachment_count().await?;

    let attachment = message
        .attachment()
        .await?
        .ok_or_else(|| AppError::Internal("validated message lost its attachment".to_owned()))?;
    tracing::info!(
        uid,
        filename = attachment.filename(),
        content_type = attachment.mime_type(),
        "attachment accepted"
    );
    record.attachment = Some(attachment.info());

    if let Some(dir) = &opts.save_dir {
        let path = attachment.save_to(dir).await?;
        tracing::info!(uid, path = %path.display(), "attachment saved");
        record.saved_to = Some(path.display().to_string());
    }

    if opts.mark_seen {
        message.mark_seen().await?;
        record.marked_seen = true;
    }

    Ok(finish(record, started))
}

fn finish(mut record: ProcessedMessage, started: Instant) -> ProcessedMessage {
    record.processed_at = now_utc();
    record.duration_ms = duration_ms(started);
    record
}

/// Calculate elapsed milliseconds
fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Validate mailbox name format
pub fn validate_mailbox(mailbox: &str) -> AppResult<()> {
    if mailbox.is_empty() || mailbox.len() > 256 {
        return Err(AppError::InvalidInput(
            "mailbox must be 1..256 characters".to_owned(),
        ));
    }
    if mailbox.chars().any(|ch| ch.is_ascii_control()) {
        return Err(AppError::InvalidInput(
            "mailbox must not contain control characters".to_owned(),
        ));
    }
    Ok(())
}

/// Validate requested UIDs (non-empty, no zero)
pub fn validate_uids(uids: &[u32]) -> AppResult<()> {
    if uids.is_empty() {
        return Err(AppError::invalid("at least one UID is required"));
    }
    if uids.contains(&0) {
        return Err(AppError::invalid("UID 0 is not a valid message UID"));
    }
    Ok(())
}
