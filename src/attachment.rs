//! Candidate report attachment
//!
//! Holds the metadata of the part chosen by the structure scan and opens
//! its bytes on demand. Nothing is downloaded until [`MailAttachment::open`]
//! is called, which should only happen after the owning message validated.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::connection::{MailboxConnection, SharedConnection};
use crate::errors::{AppError, AppResult};
use crate::mime;
use crate::models::AttachmentInfo;
use crate::structure::{PartDescriptor, TransferEncoding};

/// Attachment selected from a message structure
pub struct MailAttachment<C> {
    conn: SharedConnection<C>,
    filename: String,
    bytes: Option<u64>,
    uid: u32,
    part: String,
    encoding: TransferEncoding,
    mime_type: String,
}

impl<C: MailboxConnection> MailAttachment<C> {
    /// Build from a scanned part; `None` if the part carries no filename
    pub(crate) fn from_part(
        conn: SharedConnection<C>,
        uid: u32,
        part: PartDescriptor,
    ) -> Option<Self> {
        Some(Self {
            conn,
            filename: part.filename?,
            bytes: part.bytes,
            uid,
            part: part.path,
            encoding: part.encoding,
            mime_type: part.mime_type,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Encoded size reported by the server, `None` if unknown
    pub fn size(&self) -> Option<u64> {
        self.bytes
    }

    /// Declared `type/subtype`
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn info(&self) -> AttachmentInfo {
        AttachmentInfo {
            filename: self.filename.clone(),
            content_type: self.mime_type.clone(),
            size_bytes: self.bytes,
            part_id: self.part.clone(),
            encoding: self.encoding.to_string(),
        }
    }

    /// Fetch the section and return a reader over the decoded bytes
    ///
    /// Uses `BODY.PEEK`, so opening does not mark the message seen.
    pub async fn open(&self) -> AppResult<Cursor<Vec<u8>>> {
        let raw = {
            let mut conn = self.conn.lock().await;
            conn.fetch_part(self.uid, &self.part).await?
        };
        let decoded = mime::decode_transfer(&self.encoding, &raw)?;
        tracing::debug!(
            uid = self.uid,
            part = %self.part,
            encoded = raw.len(),
            decoded = decoded.len(),
            "attachment fetched"
        );
        Ok(Cursor::new(decoded))
    }

    /// Write the decoded bytes into `dir` under a sanitized filename
    ///
    /// The file is prefixed with the message UID so reports with equal names
    /// from different messages do not overwrite each other.
    pub async fn save_to(&self, dir: &Path) -> AppResult<PathBuf> {
        let data = self.open().await?.into_inner();
        let path = dir.join(format!(
            "{}-{}",
            self.uid,
            mime::sanitize_filename(&self.filename)
        ));
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| AppError::Internal(format!("cannot write '{}': {e}", path.display())))?;
        Ok(path)
    }
}
