//! Draft command - generate a reply from retrieved knowledge.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use replydesk_domain::DraftReply;

use super::Context;

/// Arguments for the draft command.
#[derive(Args, Debug)]
pub struct DraftArgs {
    /// Email text (reads stdin when neither this nor --file is given)
    pub text: Option<String>,

    /// Read the email from a file
    #[arg(short, long, conflicts_with = "text")]
    pub file: Option<PathBuf>,
}

/// Run the draft command.
pub async fn run(args: DraftArgs, ctx: &Context) -> Result<()> {
    let email = match (args.text, args.file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)?,
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    if email.trim().is_empty() {
        bail!("No email text given");
    }

    let services = ctx.services().await?;
    let pb = super::spinner("Drafting reply...");
    let draft = services.draft().draft(&email).await;
    pb.finish_and_clear();
    let draft = draft?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&draft_json(&draft))?);
        return Ok(());
    }
    print_draft(&draft, ctx.verbose);
    Ok(())
}

pub(crate) fn draft_json(draft: &DraftReply) -> serde_json::Value {
    serde_json::json!({
        "body": draft.body,
        "cc": draft.cc,
        "top_confidence": draft.top_confidence,
        "low_confidence": draft.low_confidence(),
        "context": draft.context.hits,
    })
}

pub(crate) fn print_draft(draft: &DraftReply, show_context: bool) {
    let dim = Style::new().dim();
    if draft.low_confidence() {
        let yellow = Style::new().yellow().bold();
        println!(
            "{} top match confidence is {:.1}%; review this draft carefully",
            yellow.apply_to("Low confidence:"),
            draft.top_confidence
        );
        println!();
    }

    println!("{}", style("Draft Reply").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!("{}", draft.body);
    println!("{}", dim.apply_to("─".repeat(50)));

    if !draft.cc.is_empty() {
        let cc: Vec<&str> = draft.cc.iter().map(String::as_str).collect();
        println!("CC: {}", cc.join(", "));
    }

    if show_context && !draft.context.is_empty() {
        println!();
        println!("{}", style("Retrieved context").bold());
        super::print_hits(&draft.context);
    } else if !draft.context.is_empty() {
        println!(
            "{}",
            dim.apply_to(format!(
                "{} context item(s), top {:.1}% (use --verbose to list)",
                draft.context.len(),
                draft.top_confidence
            ))
        );
    }
}
