//! Followup command - SLA tracking for sent replies.

use anyhow::Result;
use chrono::{TimeDelta, Utc};
use clap::{Args, Subcommand};
use console::{Style, StyledObject, style};
use replydesk_tracker::{
    Filter, FollowUp, FollowUpTracker, Indicator, NewFollowUp, Priority, QueryOutput, Status,
    format_timestamp,
};

use super::Context;

/// Arguments for the followup command.
#[derive(Args, Debug)]
pub struct FollowupArgs {
    #[command(subcommand)]
    pub command: FollowupCommand,
}

#[derive(Subcommand, Debug)]
pub enum FollowupCommand {
    /// Record a follow-up by hand
    Add {
        /// Email subject
        #[arg(long)]
        subject: String,

        /// Sender address
        #[arg(long)]
        sender: String,

        /// Short summary of the reply
        #[arg(long, default_value = "")]
        summary: String,

        /// P1-P4 or the full label
        #[arg(short, long, default_value = "P3")]
        priority: Priority,
    },

    /// List follow-ups by deadline
    List {
        /// all, pending, resolved, escalated or overdue
        #[arg(short, long, default_value = "all")]
        filter: Filter,
    },

    /// Mark a follow-up resolved
    Resolve {
        id: i64,

        /// Replaces any existing notes
        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Mark a follow-up escalated
    Escalate {
        id: i64,

        /// Replaces any existing notes
        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Set any status, including back to Pending
    Status {
        id: i64,

        /// pending, resolved or escalated
        status: Status,

        /// Replace the notes (kept when omitted)
        #[arg(long)]
        notes: Option<String>,
    },

    /// Replace the notes on a follow-up
    Note { id: i64, notes: String },

    /// Delete a follow-up
    Delete { id: i64 },

    /// Dashboard counters
    Stats,

    /// Run a read-only SQL query against the follow-up table
    Sql {
        /// Query (default: all rows, newest first)
        query: Option<String>,
    },
}

/// Run the followup command.
pub async fn run(args: FollowupArgs, ctx: &Context) -> Result<()> {
    let tracker = ctx.open_tracker()?;
    match args.command {
        FollowupCommand::Add {
            subject,
            sender,
            summary,
            priority,
        } => cmd_add(&tracker, NewFollowUp::new(subject, sender, summary, priority), ctx),
        FollowupCommand::List { filter } => cmd_list(&tracker, filter, ctx),
        FollowupCommand::Resolve { id, notes } => {
            cmd_status(&tracker, id, Status::Resolved, &notes, ctx)
        }
        FollowupCommand::Escalate { id, notes } => {
            cmd_status(&tracker, id, Status::Escalated, &notes, ctx)
        }
        FollowupCommand::Status { id, status, notes } => {
            let notes = match notes {
                Some(notes) => notes,
                None => tracker.get(id)?.notes,
            };
            cmd_status(&tracker, id, status, &notes, ctx)
        }
        FollowupCommand::Note { id, notes } => {
            tracker.set_notes(id, &notes)?;
            report(ctx, id, "notes updated")
        }
        FollowupCommand::Delete { id } => {
            tracker.delete(id)?;
            report(ctx, id, "deleted")
        }
        FollowupCommand::Stats => cmd_stats(&tracker, ctx),
        FollowupCommand::Sql { query } => cmd_sql(&tracker, query.as_deref().unwrap_or(""), ctx),
    }
}

fn cmd_add(tracker: &FollowUpTracker, new: NewFollowUp, ctx: &Context) -> Result<()> {
    let row = tracker.create(new)?;
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&row)?);
    } else {
        println!(
            "Follow-up #{} added ({}), due {}",
            row.id,
            row.priority,
            format_timestamp(row.deadline)
        );
    }
    Ok(())
}

fn cmd_status(
    tracker: &FollowUpTracker,
    id: i64,
    status: Status,
    notes: &str,
    ctx: &Context,
) -> Result<()> {
    tracker.set_status(id, status, notes)?;
    report(ctx, id, &format!("marked {status}"))
}

fn report(ctx: &Context, id: i64, what: &str) -> Result<()> {
    if ctx.json_output {
        println!("{}", serde_json::json!({ "id": id, "result": what }));
    } else {
        println!("Follow-up #{id} {what}");
    }
    Ok(())
}

fn cmd_list(tracker: &FollowUpTracker, filter: Filter, ctx: &Context) -> Result<()> {
    let now = Utc::now();
    let rows = tracker.list(filter, now)?;

    if ctx.json_output {
        let output: Vec<_> = rows
            .iter()
            .map(|r| {
                serde_json::json!({
                    "follow_up": r,
                    "overdue": r.is_overdue(now),
                    "indicator": r.indicator(now),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    if rows.is_empty() {
        println!("{}", dim.apply_to("No follow-ups"));
        return Ok(());
    }

    println!("{}", style("Follow-ups").bold());
    println!("{}", dim.apply_to("─".repeat(60)));
    for row in &rows {
        print_row(row, now);
    }
    Ok(())
}

fn print_row(row: &FollowUp, now: chrono::DateTime<Utc>) {
    let dim = Style::new().dim();
    println!(
        "{} #{} {} {}",
        indicator(row.indicator(now)),
        row.id,
        style(&row.subject).bold(),
        dim.apply_to(format!("[{}]", row.status))
    );
    println!("     From: {}  Priority: {}", row.sender, row.priority);
    let due = match row.status {
        Status::Pending => format!(
            "{} ({})",
            format_timestamp(row.deadline),
            remaining(row.time_remaining(now))
        ),
        _ => format_timestamp(row.deadline),
    };
    println!("     Due:  {due}");
    if !row.reply_summary.is_empty() {
        println!("     {}", dim.apply_to(super::truncate(&row.reply_summary, 100)));
    }
    if !row.notes.is_empty() {
        println!("     Notes: {}", row.notes);
    }
}

fn indicator(i: Indicator) -> StyledObject<&'static str> {
    match i {
        Indicator::Ok => Style::new().green().apply_to("[ok]"),
        Indicator::Alert => Style::new().red().bold().apply_to("[!!]"),
        Indicator::Waiting => Style::new().yellow().apply_to("[..]"),
    }
}

fn remaining(delta: TimeDelta) -> String {
    let minutes = delta.num_minutes();
    let (sign, minutes) = if minutes < 0 {
        ("overdue by ", -minutes)
    } else {
        ("", minutes)
    };
    let text = if minutes >= 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m")
    };
    if sign.is_empty() {
        format!("{text} left")
    } else {
        format!("{sign}{text}")
    }
}

fn cmd_stats(tracker: &FollowUpTracker, ctx: &Context) -> Result<()> {
    let stats = tracker.stats(Utc::now())?;
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("Total:     {}", stats.total);
    println!("Pending:   {}", stats.pending);
    println!("Resolved:  {}", stats.resolved);
    println!("Escalated: {}", stats.escalated);
    let overdue = if stats.overdue > 0 {
        Style::new().red().bold().apply_to(stats.overdue.to_string())
    } else {
        Style::new().apply_to(stats.overdue.to_string())
    };
    println!("Overdue:   {}", overdue);
    Ok(())
}

fn cmd_sql(tracker: &FollowUpTracker, query: &str, ctx: &Context) -> Result<()> {
    let output = tracker.query_readonly(query)?;
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_table(&output);
    }
    Ok(())
}

fn print_table(output: &QueryOutput) {
    println!("{}", output.columns.join(" | "));
    println!("{}", Style::new().dim().apply_to("─".repeat(60)));
    for row in &output.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => "NULL".to_string(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", cells.join(" | "));
    }
    println!("{}", Style::new().dim().apply_to(format!("({} rows)", output.rows.len())));
}
