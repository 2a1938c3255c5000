//! Inbox command - list unread messages.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use replydesk_mail::MailTransport;

use super::Context;

/// Arguments for the inbox command.
#[derive(Args, Debug)]
pub struct InboxArgs {
    /// Messages to fetch (default: [mail] max_fetch)
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

/// Run the inbox command.
pub async fn run(args: InboxArgs, ctx: &Context) -> Result<()> {
    let graph = ctx.graph()?;
    let limit = args.limit.unwrap_or(ctx.config.mail().max_fetch);

    let pb = super::spinner("Fetching unread mail...");
    let messages = graph.fetch_unread(limit).await;
    pb.finish_and_clear();
    let messages = messages?;

    if ctx.json_output {
        let output: Vec<_> = messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "id": m.id,
                    "subject": m.subject,
                    "sender": m.sender,
                    "received_at": m.received_at,
                    "preview": m.preview(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    if messages.is_empty() {
        println!("{}", dim.apply_to("No unread messages"));
        return Ok(());
    }

    println!("{}", style(format!("{} unread message(s)", messages.len())).bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    for m in &messages {
        println!("{} {}", style(&m.subject).bold(), dim.apply_to(format!("({})", m.received_date())));
        println!("  From: {}", m.sender);
        println!("  Id:   {}", dim.apply_to(&m.id));
        let preview = m.preview();
        if preview.is_empty() {
            println!("  {}", dim.apply_to("(no preview available)"));
        } else {
            println!("  {}", super::truncate(&preview, 200));
        }
        println!();
    }
    Ok(())
}
