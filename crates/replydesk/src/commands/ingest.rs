//! Ingest command - index the email corpus and reference documents.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use replydesk_domain::seed_knowledge;
use replydesk_knowledge::IngestOutcome;

use super::Context;

/// Arguments for the ingest command.
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Documents folder (default: [knowledge] docs_dir, then ./docs)
    #[arg(long)]
    pub docs: Option<PathBuf>,

    /// Drop the whole index and rebuild it
    #[arg(long)]
    pub reset: bool,
}

/// Run the ingest command.
pub async fn run(args: IngestArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_knowledge()?;
    if args.reset {
        store.reset()?;
        if !ctx.json_output {
            println!("{}", Style::new().dim().apply_to("Index cleared"));
        }
    }

    if store.is_stale() {
        bail!("Knowledge index was built with a different embedder; run `replydesk ingest --reset`");
    }

    let docs = args.docs.unwrap_or_else(|| ctx.docs_dir());
    let include_emails = ctx.config.knowledge().seed_emails;

    let pb = super::spinner("Indexing knowledge...");
    let report = seed_knowledge(&store, include_emails, Some(&docs)).await;
    pb.finish_and_clear();
    let report = report?;

    let stats = store.stats()?;
    let sources = store.doc_sources()?;
    if ctx.json_output {
        let warnings: Vec<String> = report
            .documents
            .warnings
            .iter()
            .map(ToString::to_string)
            .collect();
        let output = serde_json::json!({
            "emails": report.emails,
            "documents": {
                "files": report.documents.files,
                "chunks": report.documents.total_chunks(),
                "skipped": report.documents.already_present.is_some(),
                "warnings": warnings,
                "sources": sources
                    .iter()
                    .map(|(source, chunks)| serde_json::json!({ "source": source, "chunks": chunks }))
                    .collect::<Vec<_>>(),
            },
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{}", style("Knowledge Index").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    match report.emails {
        Some(IngestOutcome::Inserted(n)) => println!("Emails:      {n} indexed"),
        Some(IngestOutcome::AlreadyPresent(n)) => {
            println!("Emails:      {n} already indexed")
        }
        None => println!("Emails:      {}", dim.apply_to("corpus disabled")),
    }
    match report.documents.already_present {
        Some(n) => println!("Doc chunks:  {n} already indexed"),
        None => println!(
            "Doc chunks:  {} from {} file(s) in {}",
            report.documents.chunks,
            report.documents.files,
            docs.display()
        ),
    }
    println!(
        "Embeddings:  {} ({}, {} dims)",
        stats.embeddings, stats.provider, stats.dimensions
    );
    for (source, chunks) in &sources {
        println!("  {} {}", source, dim.apply_to(format!("({chunks} chunks)")));
    }

    if !report.documents.warnings.is_empty() {
        let yellow = Style::new().yellow();
        println!();
        for warning in &report.documents.warnings {
            println!("{} {}", yellow.apply_to("Skipped:"), warning);
        }
    }
    Ok(())
}
