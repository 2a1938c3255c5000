//! Auth command - mailbox sign-in management.

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Subcommand};
use console::{Style, style};
use replydesk_mail::{poll_for_token, start_device_flow};

use super::Context;

/// Arguments for the auth command.
#[derive(Args, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommand,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Sign in to the mailbox with a device code
    Login,

    /// Show sign-in status
    Status,

    /// Remove stored mailbox tokens
    Logout,
}

/// Run the auth command.
pub async fn run(args: AuthArgs, ctx: &Context) -> Result<()> {
    match args.command {
        AuthCommand::Login => cmd_login(ctx).await,
        AuthCommand::Status => cmd_status(ctx),
        AuthCommand::Logout => cmd_logout(ctx).await,
    }
}

async fn cmd_login(ctx: &Context) -> Result<()> {
    let device = ctx.device_config()?;
    let store = ctx.token_store()?;

    if let Some(tokens) = store.load()?
        && !tokens.needs_refresh(Utc::now())
    {
        println!("Already signed in (expires {})", tokens.expires_at.format("%Y-%m-%d %H:%M UTC"));
        println!("Run 'replydesk auth logout' first to sign in again.");
        return Ok(());
    }

    let http = reqwest::Client::new();
    let code = start_device_flow(&http, &device).await?;

    println!("Mailbox Sign-in");
    println!("===============");
    println!();
    if code.message.is_empty() {
        println!("Open {} and enter the code:", code.verification_uri);
    } else {
        println!("{}", code.message);
    }
    println!();
    println!("  {}", style(&code.user_code).bold().cyan());
    println!();

    let pb = super::spinner("Waiting for sign-in...");
    let tokens = poll_for_token(&http, &device, &code).await;
    pb.finish_and_clear();
    let tokens = tokens?;

    store.save(&tokens).await?;
    println!("{}", Style::new().green().apply_to("Signed in."));
    println!("Scope: {}", tokens.scope);
    Ok(())
}

fn cmd_status(ctx: &Context) -> Result<()> {
    let store = replydesk_mail::FileTokenStore::new(ctx.config.mail_token_path());
    let tokens = store.load()?;

    if ctx.json_output {
        let output = match &tokens {
            Some(t) => serde_json::json!({
                "signed_in": true,
                "expires_at": t.expires_at,
                "expired": t.is_expired(Utc::now()),
                "refreshable": t.refresh_token.is_some(),
                "scope": t.scope,
            }),
            None => serde_json::json!({ "signed_in": false }),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Mailbox Status");
    println!("--------------");
    match tokens {
        Some(t) => {
            let state = if t.is_expired(Utc::now()) {
                Style::new().yellow().apply_to("expired")
            } else {
                Style::new().green().apply_to("signed in")
            };
            println!("Mailbox: {}", state);
            println!("  Expires: {}", t.expires_at.format("%Y-%m-%d %H:%M UTC"));
            println!("  Refresh token: {}", if t.refresh_token.is_some() { "yes" } else { "no" });
            println!("  Scope: {}", t.scope);
        }
        None => {
            println!("Mailbox: {}", Style::new().dim().apply_to("not signed in"));
            println!("  Run 'replydesk auth login' to sign in.");
        }
    }
    println!("  Token file: {}", store.path().display());
    Ok(())
}

async fn cmd_logout(ctx: &Context) -> Result<()> {
    let store = replydesk_mail::FileTokenStore::new(ctx.config.mail_token_path());
    if store.delete().await? {
        println!("Signed out; stored tokens removed.");
    } else {
        println!("No stored tokens.");
    }
    Ok(())
}
