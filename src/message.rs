//! Message handle
//!
//! A [`MailMessage`] wraps one UID on a shared connection. The attachment
//! scan runs at most once per handle and its result is cached; validation
//! only ever looks at that cached metadata, never at attachment bytes.

use crate::attachment::MailAttachment;
use crate::connection::{MailboxConnection, SharedConnection};
use crate::errors::{AppError, AppResult};
use crate::models::MessageOverview;
use crate::structure;

/// Smallest accepted attachment, in encoded octets
pub const MIN_ATTACHMENT_BYTES: u64 = 50;
/// Upper bound (exclusive) for an accepted attachment, in encoded octets
pub const MAX_ATTACHMENT_BYTES: u64 = 1024 * 1024;
/// Declared content types a report attachment may carry
pub const ALLOWED_MIME_TYPES: [&str; 4] = [
    "application/zip",
    "application/gzip",
    "application/x-gzip",
    "text/xml",
];

/// Cached outcome of the attachment scan
enum Resolution<C> {
    Unresolved,
    Resolved {
        count: usize,
        candidate: Option<MailAttachment<C>>,
    },
}

/// One mailbox message addressed by UID
pub struct MailMessage<C> {
    conn: SharedConnection<C>,
    uid: u32,
    resolution: Resolution<C>,
}

impl<C: MailboxConnection> MailMessage<C> {
    pub fn new(conn: SharedConnection<C>, uid: u32) -> Self {
        Self {
            conn,
            uid,
            resolution: Resolution::Unresolved,
        }
    }

    /// Best-effort overview of the message
    ///
    /// Protocol failures are logged and reported as `None`; the caller
    /// should skip the message or try again later.
    pub async fn summary(&self) -> Option<MessageOverview> {
        let result = self.conn.lock().await.fetch_overview(self.uid).await;
        match result {
            Ok(overview) => overview,
            Err(e) => {
                tracing::error!(uid = self.uid, error = %e, "overview fetch failed");
                None
            }
        }
    }

    /// Set `\Seen` on the message
    ///
    /// # Errors
    ///
    /// - `Mailbox` with the protocol error text if the server refused
    pub async fn mark_seen(&self) -> AppResult<()> {
        let result = self.conn.lock().await.set_seen(self.uid).await;
        result.map_err(|e| {
            tracing::error!(uid = self.uid, error = %e, "setting \\Seen failed");
            let detail = match e {
                AppError::Mailbox(detail) => detail,
                other => other.to_string(),
            };
            AppError::Mailbox(format!("failed to mark message {} seen: {detail}", self.uid))
        })
    }

    /// The first named attachment, resolving the structure if needed
    pub async fn attachment(&mut self) -> AppResult<Option<&MailAttachment<C>>> {
        self.ensure_resolved().await?;
        Ok(match &self.resolution {
            Resolution::Resolved { candidate, .. } => candidate.as_ref(),
            Resolution::Unresolved => None,
        })
    }

    /// Number of named attachments, resolving the structure if needed
    pub async fn attachment_count(&mut self) -> AppResult<usize> {
        self.ensure_resolved().await?;
        Ok(match &self.resolution {
            Resolution::Resolved { count, .. } => *count,
            Resolution::Unresolved => 0,
        })
    }

    /// Check the attachment against the acceptance policy
    ///
    /// Rules, in order: exactly one named attachment; a known size within
    /// `[MIN_ATTACHMENT_BYTES, MAX_ATTACHMENT_BYTES)`; a declared type from
    /// [`ALLOWED_MIME_TYPES`].
    ///
    /// # Errors
    ///
    /// - `Mailbox` if the structure could not be fetched
    /// - `Validation` naming the offending count, size or type
    pub async fn validate(&mut self) -> AppResult<()> {
        self.ensure_resolved().await?;
        let Resolution::Resolved { count, candidate } = &self.resolution else {
            return Err(AppError::Internal("attachment scan did not run".to_owned()));
        };

        let attachment = match (*count, candidate) {
            (1, Some(attachment)) => attachment,
            _ => {
                return Err(AppError::validation(format!(
                    "attachment count is not valid ({count})"
                )));
            }
        };

        let Some(bytes) = attachment.size() else {
            return Err(AppError::validation(
                "failed to get attached file size; wrong message format?",
            ));
        };
        if !(MIN_ATTACHMENT_BYTES..MAX_ATTACHMENT_BYTES).contains(&bytes) {
            return Err(AppError::validation(format!(
                "attachment file size is not valid ({bytes} bytes)"
            )));
        }

        let mime_type = attachment.mime_type();
        if !ALLOWED_MIME_TYPES.contains(&mime_type) {
            return Err(AppError::validation(format!(
                "attachment file type is not valid ({mime_type})"
            )));
        }

        Ok(())
    }

    async fn ensure_resolved(&mut self) -> AppResult<()> {
        if matches!(self.resolution, Resolution::Resolved { .. }) {
            return Ok(());
        }

        let root = self.conn.lock().await.fetch_structure(self.uid).await?;
        let scan = structure::scan(&root);
        tracing::debug!(
            uid = self.uid,
            count = scan.count,
            part = scan.candidate.as_ref().map(|p| p.path.as_str()),
            "attachment scan finished"
        );
        let candidate = scan
            .candidate
            .and_then(|part| MailAttachment::from_part(self.conn.clone(), self.uid, part));
        self.resolution = Resolution::Resolved {
            count: scan.count,
            candidate,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MailMessage;
    use crate::connection::mock::MockConnection;
    use crate::models::MessageOverview;
    use crate::structure::tests::{attached, leaf, multipart};
    use crate::structure::{StructureNode, TransferEncoding};

    fn single(mime_type: &str, bytes: u64) -> StructureNode {
        multipart(
            "mixed",
            vec![
                leaf("text/plain", 120),
                attached("report.xml", mime_type, bytes),
            ],
        )
    }

    async fn validate(structure: StructureNode) -> Result<(), String> {
        let conn = MockConnection::with_structure(structure).shared();
        let mut msg = MailMessage::new(conn, 42);
        msg.validate().await.map_err(|e| {
            assert!(e.is_validation(), "unexpected error kind: {e}");
            e.to_string()
        })
    }

    #[tokio::test]
    async fn rejects_messages_without_attachments() {
        let err = validate(multipart("alternative", vec![leaf("text/plain", 10)]))
            .await
            .expect_err("must fail");
        assert!(err.contains("attachment count is not valid (0)"));
    }

    #[tokio::test]
    async fn rejects_messages_with_two_attachments() {
        let root = multipart(
            "mixed",
            vec![
                attached("a.zip", "application/zip", 500),
                attached("b.zip", "application/zip", 500),
            ],
        );
        let err = validate(root).await.expect_err("must fail");
        assert!(err.contains("attachment count is not valid (2)"));
    }

    #[tokio::test]
    async fn enforces_size_bounds() {
        let err = validate(single("text/xml", 49)).await.expect_err("too small");
        assert!(err.contains("(49 bytes)"));

        validate(single("text/xml", 50)).await.expect("lower bound is inclusive");
        validate(single("text/xml", 1_048_575)).await.expect("just below the limit");

        let err = validate(single("text/xml", 1_048_576))
            .await
            .expect_err("upper bound is exclusive");
        assert!(err.contains("(1048576 bytes)"));
    }

    #[tokio::test]
    async fn rejects_unknown_size() {
        let mut root = single("text/xml", 100);
        root.parts[1].bytes = None;
        let err = validate(root).await.expect_err("must fail");
        assert!(err.contains("failed to get attached file size"));
    }

    #[tokio::test]
    async fn rejects_types_outside_the_whitelist() {
        for bytes in [49, 500, 2_000_000] {
            let err = validate(single("application/pdf", bytes))
                .await
                .expect_err("must fail");
            if (50..1_048_576).contains(&bytes) {
                assert!(err.contains("attachment file type is not valid (application/pdf)"));
            }
        }
        for ok in ["application/zip", "application/gzip", "application/x-gzip"] {
            validate(single(ok, 800)).await.expect("whitelisted type");
        }
    }

    #[tokio::test]
    async fn structure_is_fetched_once() {
        let conn = MockConnection::with_structure(single("text/xml", 300)).shared();
        let mut msg = MailMessage::new(conn.clone(), 42);

        assert!(msg.attachment().await.expect("resolves").is_some());
        assert!(msg.attachment().await.expect("cached").is_some());
        msg.validate().await.expect("valid");
        assert_eq!(msg.attachment_count().await.expect("cached"), 1);

        assert_eq!(conn.lock().await.structure_fetches, 1);
    }

    #[tokio::test]
    async fn structure_failure_is_a_mailbox_error() {
        let conn = MockConnection::default().shared();
        let mut msg = MailMessage::new(conn.clone(), 42);
        let err = msg.validate().await.expect_err("must fail");
        assert!(!err.is_validation());
        assert!(err.to_string().contains("no BODYSTRUCTURE"));
    }

    #[tokio::test]
    async fn content_type_name_scenario() {
        let root = multipart(
            "mixed",
            vec![StructureNode {
                mime_type: "text/xml".to_owned(),
                encoding: TransferEncoding::Base64,
                bytes: Some(200),
                parameters: Some(vec![("name".to_owned(), "report.xml".to_owned())]),
                disposition_parameters: None,
                parts: Vec::new(),
            }],
        );
        let conn = MockConnection::with_structure(root).shared();
        let mut msg = MailMessage::new(conn, 7);

        let att = msg.attachment().await.expect("resolves").expect("candidate");
        assert_eq!(att.filename(), "report.xml");
        let info = att.info();
        assert_eq!(info.part_id, "1");
        assert_eq!(info.encoding, "base64");
        msg.validate().await.expect("valid");
    }

    #[tokio::test]
    async fn embedded_message_scenario() {
        let embedded = StructureNode {
            parts: vec![
                leaf("text/plain", 80),
                attached("report.xml.gz", "application/gzip", 640),
            ],
            ..leaf("message/rfc822", 2000)
        };
        let conn = MockConnection::with_structure(multipart("mixed", vec![embedded])).shared();
        let mut msg = MailMessage::new(conn, 9);

        assert_eq!(msg.attachment_count().await.expect("resolves"), 1);
        let att = msg.attachment().await.expect("cached").expect("candidate");
        assert_eq!(att.info().part_id, "1.2");
    }

    #[tokio::test]
    async fn bare_attachment_message_validates() {
        let root = attached("r.xml.gz", "application/gzip", 400);
        let conn = MockConnection::with_structure(root).shared();
        let mut msg = MailMessage::new(conn, 12);

        msg.validate().await.expect("valid");
        let att = msg.attachment().await.expect("cached").expect("candidate");
        assert_eq!(att.filename(), "r.xml.gz");
        assert_eq!(att.info().part_id, "1");
    }

    #[tokio::test]
    async fn summary_failures_degrade_to_none() {
        let mut mock = MockConnection::default();
        mock.overview_error = Some("BAD command".to_owned());
        let msg = MailMessage::new(mock.shared(), 3);
        assert!(msg.summary().await.is_none());
    }

    #[tokio::test]
    async fn summary_returns_overview() {
        let mut mock = MockConnection::default();
        mock.overview = Some(MessageOverview {
            uid: 3,
            subject: Some("Report domain: example.com".to_owned()),
            ..MessageOverview::default()
        });
        let msg = MailMessage::new(mock.shared(), 3);
        let overview = msg.summary().await.expect("overview");
        assert_eq!(overview.subject.as_deref(), Some("Report domain: example.com"));
    }

    #[tokio::test]
    async fn mark_seen_propagates_protocol_errors() {
        let mut mock = MockConnection::default();
        mock.seen_error = Some("NO [READ-ONLY] mailbox".to_owned());
        let msg = MailMessage::new(mock.shared(), 11);
        let err = msg.mark_seen().await.expect_err("must fail");
        assert!(!err.is_validation());
        assert_eq!(
            err.to_string(),
            "mailbox error: failed to mark message 11 seen: NO [READ-ONLY] mailbox"
        );
    }

    #[tokio::test]
    async fn mark_seen_sets_flag_by_uid() {
        let conn = MockConnection::default().shared();
        let msg = MailMessage::new(conn.clone(), 11);
        msg.mark_seen().await.expect("flag stored");
        assert_eq!(conn.lock().await.seen, vec![11]);
    }
}
