//! replydesk - retrieval-grounded reply drafting for MFT/EDI support mailboxes
//!
//! Main entry point for the replydesk CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod logging;

use commands::{auth, draft, followup, inbox, ingest, reply, search};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// replydesk - support reply drafting with retrieved knowledge and follow-up SLAs
#[derive(Parser)]
#[command(name = "replydesk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Directory for databases, tokens and logs
    #[arg(long, global = true, env = "REPLYDESK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index the built-in email corpus and the documents folder
    Ingest(ingest::IngestArgs),

    /// Search the knowledge base
    Search(search::SearchArgs),

    /// Draft a reply to an email
    Draft(draft::DraftArgs),

    /// Mailbox sign-in management
    Auth(auth::AuthArgs),

    /// List unread inbox messages
    Inbox(inbox::InboxArgs),

    /// Draft, send and track a reply to an inbox message
    Reply(reply::ReplyArgs),

    /// Follow-up tracker
    Followup(followup::FollowupArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let loaded = replydesk_config::load_config(None)?;
    let mut config = loaded.config;
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }

    let _guard = logging::init(cli.verbose, &config.log_dir());

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }
    tracing::debug!(
        sources = ?loaded.sources.iter().filter(|s| s.loaded).map(|s| s.path.display().to_string()).collect::<Vec<_>>(),
        data_dir = %config.data_dir().display(),
        "Configuration loaded"
    );

    let ctx = commands::Context {
        config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Ingest(args) => ingest::run(args, &ctx).await,
        Commands::Search(args) => search::run(args, &ctx).await,
        Commands::Draft(args) => draft::run(args, &ctx).await,
        Commands::Auth(args) => auth::run(args, &ctx).await,
        Commands::Inbox(args) => inbox::run(args, &ctx).await,
        Commands::Reply(args) => reply::run(args, &ctx).await,
        Commands::Followup(args) => followup::run(args, &ctx).await,
    }
}
