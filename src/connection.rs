//! Mailbox connection seam
//!
//! [`MailboxConnection`] is everything the message handle needs from the
//! server. Each call returns its own `Result`, so a failure is inspected by
//! the caller that triggered it and never carries over into the next call.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::MailboxConfig;
use crate::errors::AppResult;
use crate::imap::{self, ImapSession};
use crate::models::MessageOverview;
use crate::structure::StructureNode;

/// Connection shared by every handle and attachment of one worker
///
/// The mutex serializes protocol round trips; the connection is not meant
/// to be shared between workers.
pub type SharedConnection<C> = Arc<Mutex<C>>;

/// Operations a message handle performs against the mailbox
#[allow(async_fn_in_trait)]
pub trait MailboxConnection {
    /// Overview of one message; `Ok(None)` if the server has no data for it
    async fn fetch_overview(&mut self, uid: u32) -> AppResult<Option<MessageOverview>>;

    /// Normalized `BODYSTRUCTURE` of one message
    async fn fetch_structure(&mut self, uid: u32) -> AppResult<StructureNode>;

    /// Add `\Seen` to one message
    async fn set_seen(&mut self, uid: u32) -> AppResult<()>;

    /// Raw bytes of one body section, still transfer-encoded
    async fn fetch_part(&mut self, uid: u32, section: &str) -> AppResult<Vec<u8>>;
}

/// Live IMAP connection with a selected mailbox
pub struct ImapConnection {
    config: MailboxConfig,
    session: ImapSession,
}

impl ImapConnection {
    /// Connect, authenticate and select the configured mailbox
    ///
    /// The mailbox is opened read-write only when flags will be stored.
    pub async fn open(config: MailboxConfig, writable: bool) -> AppResult<Self> {
        let mut session = imap::connect_authenticated(&config).await?;
        let uidvalidity = if writable {
            imap::select_mailbox_readwrite(&config, &mut session, &config.mailbox).await?
        } else {
            imap::select_mailbox_readonly(&config, &mut session, &config.mailbox).await?
        };
        tracing::debug!(mailbox = %config.mailbox, uidvalidity, writable, "mailbox selected");
        Ok(Self { config, session })
    }

    /// Log out and drop the session
    pub async fn close(mut self) -> AppResult<()> {
        imap::logout(&self.config, &mut self.session).await
    }
}

impl MailboxConnection for ImapConnection {
    async fn fetch_overview(&mut self, uid: u32) -> AppResult<Option<MessageOverview>> {
        imap::fetch_overview(&self.config, &mut self.session, uid).await
    }

    async fn fetch_structure(&mut self, uid: u32) -> AppResult<StructureNode> {
        imap::fetch_structure(&self.config, &mut self.session, uid).await
    }

    async fn set_seen(&mut self, uid: u32) -> AppResult<()> {
        imap::add_seen_flag(&self.config, &mut self.session, uid).await
    }

    async fn fetch_part(&mut self, uid: u32, section: &str) -> AppResult<Vec<u8>> {
        imap::fetch_section(&self.config, &mut self.session, uid, section).await
    }
}
