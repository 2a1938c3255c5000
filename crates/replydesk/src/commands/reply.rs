//! Reply command - draft, confirm, send, mark read, open a follow-up.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::Args;
use console::Style;
use replydesk_mail::{MailError, MailTransport, UNKNOWN_DRAFT_ID};
use replydesk_tracker::Priority;

use super::Context;

/// Arguments for the reply command.
#[derive(Args, Debug)]
pub struct ReplyArgs {
    /// Id of an unread inbox message (see `replydesk inbox`)
    pub message_id: String,

    /// Follow-up priority: P1-P4 or the full label
    #[arg(short, long, default_value = "P3")]
    pub priority: Priority,

    /// Send this edited body instead of a fresh draft
    #[arg(long)]
    pub body_file: Option<PathBuf>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Run the reply command.
pub async fn run(args: ReplyArgs, ctx: &Context) -> Result<()> {
    let graph = Arc::new(ctx.graph()?);
    let services = ctx.services().await?.with_transport(graph.clone());

    let unread = graph.fetch_unread(ctx.config.mail().max_fetch.max(50)).await?;
    let message = unread
        .into_iter()
        .find(|m| m.id == args.message_id)
        .ok_or_else(|| anyhow!("Message {} is not among unread inbox messages", args.message_id))?;

    let body = match &args.body_file {
        Some(path) => std::fs::read_to_string(path)?.trim().to_string(),
        None => {
            let pb = super::spinner("Drafting reply...");
            let draft = services.draft().draft(&message.drafting_input()).await;
            pb.finish_and_clear();
            let draft = draft?;
            if !ctx.json_output {
                super::draft::print_draft(&draft, ctx.verbose);
            }
            draft.body
        }
    };

    if !args.yes && !confirm(&format!("Send this reply to {}?", message.sender))? {
        println!("Discarded.");
        return Ok(());
    }

    let sender = services
        .send()
        .ok_or_else(|| anyhow!("Mail transport not configured"))?;
    let outcome = match sender.send(&message, &body, args.priority).await {
        Ok(outcome) => outcome,
        Err(replydesk_domain::DomainError::Mail(e)) => return Err(send_error(e)),
        Err(e) => return Err(e.into()),
    };

    if ctx.json_output {
        let output = serde_json::json!({
            "message_id": message.id,
            "route": outcome.receipt.route,
            "draft_id": outcome.receipt.draft_id,
            "cc": outcome.cc,
            "marked_read": outcome.marked_read,
            "follow_up": outcome.follow_up,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let green = Style::new().green();
    println!("{}", green.apply_to("Reply sent."));
    if !outcome.cc.is_empty() {
        let cc: Vec<&str> = outcome.cc.iter().map(String::as_str).collect();
        println!("CC: {}", cc.join(", "));
    }
    if !outcome.marked_read {
        println!(
            "{} message could not be marked read",
            Style::new().yellow().apply_to("Warning:")
        );
    }
    println!(
        "Follow-up #{} ({}) due {}",
        outcome.follow_up.id,
        outcome.follow_up.priority,
        replydesk_tracker::format_timestamp(outcome.follow_up.deadline)
    );
    Ok(())
}

fn send_error(e: MailError) -> anyhow::Error {
    match e.orphan_draft_id() {
        Some(UNKNOWN_DRAFT_ID) => anyhow!(
            "{e}\nA reply draft was created but could not be identified; check the mailbox Drafts folder."
        ),
        Some(draft_id) => anyhow!(
            "{e}\nA reply draft ({draft_id}) is still in the mailbox Drafts folder; send or delete it by hand."
        ),
        None => anyhow!("Failed to send: {e}. Check the mailbox permissions."),
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}
