//! IMAP transport and session operations
//!
//! Provides timeout-bounded wrappers around `async-imap` operations. All network
//! calls are enforced to use TLS, and timeouts are derived from the mailbox
//! config.

use std::sync::Arc;
use std::time::Duration;

use async_imap::types::{Fetch, Flag};
use async_imap::{Client, Session};
use futures::TryStreamExt;
use imap_proto::types::{Address, SectionPath};
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use crate::config::MailboxConfig;
use crate::errors::{AppError, AppResult};
use crate::mime;
use crate::models::MessageOverview;
use crate::structure::StructureNode;

/// Type alias for authenticated IMAP session over TLS
pub type ImapSession = Session<tokio_rustls::client::TlsStream<TcpStream>>;

/// Items requested for a message overview
const OVERVIEW_QUERY: &str = "UID FLAGS RFC822.SIZE INTERNALDATE ENVELOPE";

/// Connect to IMAP server and authenticate
///
/// Performs full connection sequence with timeouts:
/// 1. TCP connect
/// 2. TLS handshake with bundled root certificates
/// 3. Read IMAP greeting
/// 4. LOGIN authentication
///
/// # Errors
///
/// - `InvalidInput` if `secure` is false or hostname is invalid for TLS SNI
/// - `Timeout` if any connection phase times out
/// - `AuthFailed` if authentication fails
/// - `Mailbox` for TCP, TLS, or greeting failures
pub async fn connect_authenticated(config: &MailboxConfig) -> AppResult<ImapSession> {
    if !config.secure {
        return Err(AppError::InvalidInput(
            "insecure IMAP is not supported; set MAIL_IMAP_SECURE=true".to_owned(),
        ));
    }

    let connect_duration = Duration::from_millis(config.connect_timeout_ms);
    let greeting_duration = Duration::from_millis(config.greeting_timeout_ms);

    let tcp = timeout(
        connect_duration,
        TcpStream::connect((config.host.as_str(), config.port)),
    )
    .await
    .map_err(|_| AppError::Timeout("tcp connect timeout".to_owned()))
    .and_then(|r| r.map_err(|e| AppError::Mailbox(format!("tcp connect failed: {e}"))))?;

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));

    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|_| AppError::InvalidInput("invalid IMAP host for TLS SNI".to_owned()))?;
    let tls_stream = timeout(greeting_duration, connector.connect(server_name, tcp))
        .await
        .map_err(|_| AppError::Timeout("TLS handshake timeout".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Mailbox(format!("TLS handshake failed: {e}"))))?;

    let mut client = Client::new(tls_stream);
    let greeting = timeout(greeting_duration, client.read_response())
        .await
        .map_err(|_| AppError::Timeout("IMAP greeting timeout".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Mailbox(format!("IMAP greeting failed: {e}"))))?;

    if greeting.is_none() {
        return Err(AppError::Mailbox(
            "IMAP server closed connection before greeting".to_owned(),
        ));
    }

    let pass = config.pass.expose_secret();
    let session = timeout(greeting_duration, client.login(config.user.as_str(), pass))
        .await
        .map_err(|_| AppError::Timeout("IMAP login timeout".to_owned()))
        .and_then(|r| {
            r.map_err(|(e, _)| {
                let msg = e.to_string();
                if msg.to_ascii_lowercase().contains("auth") || msg.contains("LOGIN") {
                    AppError::AuthFailed(msg)
                } else {
                    AppError::Mailbox(msg)
                }
            })
        })?;

    Ok(session)
}

/// Select mailbox in read-only mode
///
/// Uses `EXAMINE` so that nothing in the mailbox changes. Returns the
/// `UIDVALIDITY`.
pub async fn select_mailbox_readonly(
    config: &MailboxConfig,
    session: &mut ImapSession,
    mailbox: &str,
) -> AppResult<u32> {
    let selected = timeout(config.socket_timeout(), session.examine(mailbox))
        .await
        .map_err(|_| AppError::Timeout(format!("EXAMINE timed out for mailbox '{mailbox}'")))
        .and_then(|r| {
            r.map_err(|e| AppError::Mailbox(format!("cannot examine mailbox '{mailbox}': {e}")))
        })?;
    selected
        .uid_validity
        .ok_or_else(|| AppError::Mailbox("mailbox missing UIDVALIDITY".to_owned()))
}

/// Select mailbox in read-write mode
///
/// Required before flags can be stored. Returns the `UIDVALIDITY`.
pub async fn select_mailbox_readwrite(
    config: &MailboxConfig,
    session: &mut ImapSession,
    mailbox: &str,
) -> AppResult<u32> {
    let selected = timeout(config.socket_timeout(), session.select(mailbox))
        .await
        .map_err(|_| AppError::Timeout(format!("SELECT timed out for mailbox '{mailbox}'")))
        .and_then(|r| {
            r.map_err(|e| AppError::Mailbox(format!("cannot select mailbox '{mailbox}': {e}")))
        })?;
    selected
        .uid_validity
        .ok_or_else(|| AppError::Mailbox("mailbox missing UIDVALIDITY".to_owned()))
}

/// Run a `UID FETCH` for one UID
///
/// Returns the responses that belong to `uid`; unsolicited updates for
/// other messages are dropped. An empty result means the server had no
/// such message.
pub async fn uid_fetch(
    config: &MailboxConfig,
    session: &mut ImapSession,
    uid: u32,
    query: &str,
) -> AppResult<Vec<Fetch>> {
    let stream = timeout(config.socket_timeout(), session.uid_fetch(uid.to_string(), query))
        .await
        .map_err(|_| AppError::Timeout("UID FETCH timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Mailbox(format!("uid fetch failed: {e}"))))?;
    let fetches: Vec<Fetch> = timeout(config.socket_timeout(), stream.try_collect())
        .await
        .map_err(|_| AppError::Timeout("UID FETCH stream timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Mailbox(format!("uid fetch stream failed: {e}"))))?;

    Ok(fetches
        .into_iter()
        .filter(|f| f.uid == Some(uid))
        .collect())
}

/// Fetch the overview of one message
///
/// Returns `None` when the server sends no data for the UID.
pub async fn fetch_overview(
    config: &MailboxConfig,
    session: &mut ImapSession,
    uid: u32,
) -> AppResult<Option<MessageOverview>> {
    let fetches = uid_fetch(config, session, uid, OVERVIEW_QUERY).await?;
    Ok(fetches.first().map(|f| overview_from_fetch(uid, f)))
}

/// Fetch and normalize the `BODYSTRUCTURE` of one message
///
/// # Errors
///
/// - `Mailbox` if the message does not exist or the server omits the
///   structure
pub async fn fetch_structure(
    config: &MailboxConfig,
    session: &mut ImapSession,
    uid: u32,
) -> AppResult<StructureNode> {
    let fetches = uid_fetch(config, session, uid, "UID BODYSTRUCTURE").await?;
    fetches
        .iter()
        .find_map(|f| f.bodystructure().map(StructureNode::from_body_structure))
        .ok_or_else(|| AppError::Mailbox(format!("no BODYSTRUCTURE returned for uid {uid}")))
}

/// Fetch one body section without setting `\Seen`
///
/// Returns the section bytes still in their transfer encoding.
pub async fn fetch_section(
    config: &MailboxConfig,
    session: &mut ImapSession,
    uid: u32,
    section: &str,
) -> AppResult<Vec<u8>> {
    let path = section_path(section)?;
    let query = format!("UID BODY.PEEK[{section}]");
    let fetches = uid_fetch(config, session, uid, &query).await?;
    fetches
        .iter()
        .find_map(|f| f.section(&path).map(<[u8]>::to_vec))
        .ok_or_else(|| {
            AppError::Mailbox(format!("no BODY[{section}] returned for uid {uid}"))
        })
}

/// Add `\Seen` to one message
pub async fn add_seen_flag(
    config: &MailboxConfig,
    session: &mut ImapSession,
    uid: u32,
) -> AppResult<()> {
    let stream = timeout(
        config.socket_timeout(),
        session.uid_store(uid.to_string(), "+FLAGS.SILENT (\\Seen)"),
    )
    .await
    .map_err(|_| AppError::Timeout("UID STORE timed out".to_owned()))
    .and_then(|r| r.map_err(|e| AppError::Mailbox(format!("uid store failed: {e}"))))?;
    let _: Vec<Fetch> = timeout(config.socket_timeout(), stream.try_collect())
        .await
        .map_err(|_| AppError::Timeout("UID STORE stream timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Mailbox(format!("uid store stream failed: {e}"))))?;
    Ok(())
}

/// Log out, ignoring a server that already hung up
pub async fn logout(config: &MailboxConfig, session: &mut ImapSession) -> AppResult<()> {
    timeout(config.socket_timeout(), session.logout())
        .await
        .map_err(|_| AppError::Timeout("LOGOUT timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Mailbox(format!("LOGOUT failed: {e}"))))
}

/// Parse a dotted section label (`2`, `1.2`) into an IMAP section path
fn section_path(section: &str) -> AppResult<SectionPath> {
    let parts = section
        .split('.')
        .map(|n| match n.parse::<u32>() {
            Ok(v) if v > 0 => Ok(v),
            _ => Err(AppError::invalid(format!("invalid section path '{section}'"))),
        })
        .collect::<AppResult<Vec<u32>>>()?;
    Ok(SectionPath::Part(parts, None))
}

fn overview_from_fetch(uid: u32, fetch: &Fetch) -> MessageOverview {
    let envelope = fetch.envelope();
    MessageOverview {
        uid,
        subject: envelope
            .and_then(|e| e.subject.as_deref())
            .map(mime::decode_header_bytes),
        from: envelope
            .and_then(|e| e.from.as_ref())
            .and_then(|addrs| addrs.first())
            .and_then(format_address),
        date: envelope
            .and_then(|e| e.date.as_deref())
            .map(|d| String::from_utf8_lossy(d).into_owned()),
        message_id: envelope
            .and_then(|e| e.message_id.as_deref())
            .map(|m| String::from_utf8_lossy(m).into_owned()),
        size: fetch.size,
        seen: fetch.flags().any(|flag| matches!(flag, Flag::Seen)),
        internal_date: fetch.internal_date().map(|d| d.to_rfc3339()),
    }
}

fn format_address(addr: &Address<'_>) -> Option<String> {
    let mailbox = addr.mailbox.as_deref().map(String::from_utf8_lossy)?;
    let email = match addr.host.as_deref().map(String::from_utf8_lossy) {
        Some(host) => format!("{mailbox}@{host}"),
        None => mailbox.into_owned(),
    };
    Some(match addr.name.as_deref().map(mime::decode_header_bytes) {
        Some(name) if !name.is_empty() => format!("{name} <{email}>"),
        _ => email,
    })
}
