//! parley-cli: operator CLI for the Parley relay
//!
//! Talks to the operator HTTP API exposed by `parley-server`.
//!
//! # Subcommands
//! - `status`                 : show server health
//! - `user <id> [--json]`     : show one user's quota and conversation size
//! - `reset-counters`         : zero every daily message counter now

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8767";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "parley-cli", version, about = "Parley relay operator CLI")]
struct Cli {
    /// Parley HTTP server URL (overrides PARLEY_HTTP_URL env var)
    #[arg(long, env = "PARLEY_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show Parley server status
    Status,

    /// Show quota usage and conversation size for a user
    User {
        /// Chat user id
        user_id: i64,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Reset every user's daily message counter immediately
    ResetCounters,
}

// ============================================================================
// API Response Types
// ============================================================================

/// Response from GET /users/:user_id
#[derive(Debug, Deserialize, serde::Serialize)]
pub struct UserSummary {
    pub user_id: i64,
    pub message_count: i32,
    pub limit: i32,
    pub exceeded: bool,
    pub transcript_chars: usize,
    pub archived_conversations: usize,
    pub last_activity: String,
}

/// Human-readable rendering of a user summary.
pub fn format_user_summary(summary: &UserSummary) -> String {
    let state = if summary.exceeded { " (limit reached)" } else { "" };
    format!(
        "User:          {}\nMessages:      {}/{}{}\nTranscript:    {} chars\nArchived:      {}\nLast active:   {}",
        summary.user_id,
        summary.message_count,
        summary.limit,
        state,
        summary.transcript_chars,
        summary.archived_conversations,
        summary.last_activity
    )
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);

    match client(10)?.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Parley server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:       {}", body["version"].as_str().unwrap_or("?"));
            println!("Store:         {}", body["store"].as_str().unwrap_or("?"));
            println!("PostgreSQL:    {}", body["postgresql"].as_str().unwrap_or("-"));
        }
        Ok(r) => {
            eprintln!("parley-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("parley-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Show one user via GET /users/:user_id.
fn do_user(server: &str, user_id: i64, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/users/{}", server, user_id);
    let resp = match client(10)?.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("parley-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        eprintln!("No conversation for user {}", user_id);
        std::process::exit(1);
    }
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("parley-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    let summary: UserSummary = resp.json()?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", format_user_summary(&summary));
    }
    Ok(())
}

/// Trigger POST /counters/reset.
fn do_reset_counters(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/counters/reset", server);
    let resp = client(30)?.post(&url).send()?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("parley-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    let body: serde_json::Value = resp.json()?;
    println!(
        "Counters reset for {} sessions",
        body["sessions"].as_u64().unwrap_or(0)
    );
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Status => do_status(&server),
        Commands::User { user_id, json } => do_user(&server, user_id, json),
        Commands::ResetCounters => do_reset_counters(&server),
    };

    if let Err(e) = result {
        eprintln!("parley-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
