//! dmarc-mail-fetch: pull DMARC aggregate report attachments from IMAP
//!
//! Inspects the messages named on the command line, validates that each
//! carries exactly one acceptable report attachment, and optionally saves
//! the decoded attachment and marks the message seen.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading and argument parsing
//! - [`config`]: Environment-driven mailbox configuration
//! - [`errors`]: Application error model
//! - [`imap`]: IMAP transport/session operations with timeout wrappers
//! - [`connection`]: Mailbox connection trait and its IMAP implementation
//! - [`structure`]: MIME structure flattening and attachment discovery
//! - [`message`]: Message handle with cached attachment resolution and policy
//! - [`attachment`]: Selected attachment and its byte stream
//! - [`mime`]: Encoded-word and transfer-encoding decoding
//! - [`models`]: Serializable output records
//! - [`processor`]: Per-message orchestration

mod attachment;
mod config;
mod connection;
mod errors;
mod imap;
mod message;
mod mime;
mod models;
mod processor;
mod structure;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use config::MailboxConfig;
use connection::ImapConnection;
use errors::AppError;
use processor::ProcessOptions;

/// Fetch and validate DMARC report attachments from an IMAP mailbox
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Mailbox to read from (overrides MAIL_IMAP_MAILBOX)
    #[arg(long)]
    mailbox: Option<String>,
    /// Write accepted attachments into this directory
    #[arg(long, value_name = "DIR")]
    save_dir: Option<PathBuf>,
    /// Mark accepted messages as seen
    #[arg(long)]
    mark_seen: bool,
    /// Message UIDs to process
    #[arg(required = true, value_name = "UID")]
    uids: Vec<u32>,
}

/// Application entry point
///
/// Initializes tracing from environment, loads config, and processes each
/// UID in order. One JSON record per message is written to stdout; logs go
/// to stderr.
///
/// # Example
///
/// ```no_run
/// MAIL_IMAP_HOST=imap.example.com \
/// MAIL_IMAP_USER=dmarc@example.com \
/// MAIL_IMAP_PASS=secret \
/// cargo run -- --save-dir reports --mark-seen 101 102
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    processor::validate_uids(&cli.uids)?;

    let mut config = MailboxConfig::load_from_env()?;
    if let Some(mailbox) = cli.mailbox {
        config.mailbox = mailbox;
    }
    processor::validate_mailbox(&config.mailbox)?;

    if let Some(dir) = &cli.save_dir {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            AppError::InvalidInput(format!("cannot create '{}': {e}", dir.display()))
        })?;
    }

    let opts = ProcessOptions {
        save_dir: cli.save_dir,
        mark_seen: cli.mark_seen,
    };
    let conn = Arc::new(Mutex::new(
        ImapConnection::open(config, opts.mark_seen).await?,
    ));

    let mut accepted = 0usize;
    for uid in &cli.uids {
        let record = processor::process_message(&conn, *uid, &opts).await?;
        if record.status == models::Status::Accepted {
            accepted += 1;
        }
        println!("{}", serde_json::to_string(&record)?);
    }
    tracing::info!(total = cli.uids.len(), accepted, "done");

    let conn = Arc::try_unwrap(conn)
        .map_err(|_| AppError::Internal("connection still in use".to_owned()))?
        .into_inner();
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "logout failed");
    }
    Ok(())
}
