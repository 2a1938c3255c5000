//! Search command - query the knowledge base.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use replydesk_knowledge::{DEFAULT_TOP_K, Retriever};

use super::Context;

/// Arguments for the search command.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search query
    pub query: String,

    /// Maximum results to return
    #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,
}

/// Run the search command.
pub async fn run(args: SearchArgs, ctx: &Context) -> Result<()> {
    let store = ctx.ready_knowledge().await?;
    let retriever = Retriever::new(store);
    let result = retriever.retrieve_top(&args.query, args.top_k).await?;

    if ctx.json_output {
        let output = serde_json::json!({
            "query": args.query,
            "top_confidence": result.top_confidence(),
            "hits": result.hits,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    if result.is_empty() {
        println!("{}", dim.apply_to("No results found"));
        return Ok(());
    }

    println!("{}", style("Knowledge Search Results").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    super::print_hits(&result);
    Ok(())
}
