//! Focus session commands

use anyhow::{bail, Result};
use clap::Subcommand;
use guardian_core::{GuardianCommand, GuardianResponse};
use guardian_storage::{AllowedMetadata, SessionConfig};
use tabled::{Table, Tabled};

use super::helpers::{format_time, ok_response, open_oneshot, truncate_str};

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Start a focus session (ends any running one)
    Start {
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Allowed domains, comma separated
        #[arg(short, long, value_delimiter = ',')]
        domains: Vec<String>,
        /// Duration in minutes (default 25)
        #[arg(short, long)]
        minutes: Option<i64>,
        /// Extra domains that may be visited beyond the list
        #[arg(long, default_value = "0")]
        max_extra: u32,
        /// Keywords a page title may contain, comma separated
        #[arg(long, value_delimiter = ',')]
        title_kw: Vec<String>,
        /// Keywords a page description may contain, comma separated
        #[arg(long, value_delimiter = ',')]
        description_kw: Vec<String>,
        /// Keywords the page keywords may contain, comma separated
        #[arg(long, value_delimiter = ',')]
        keywords_kw: Vec<String>,
    },
    /// Stop the running session early
    Stop {
        /// Why the session should end
        #[arg(short, long)]
        reason: String,
    },
    /// Show the running session
    Status,
    /// Show past session starts and ends
    History {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "Session")]
    name: String,
    #[tabled(rename = "At")]
    at: String,
    #[tabled(rename = "Ends")]
    ends: String,
    #[tabled(rename = "Domains")]
    domains: String,
}

/// Handle session commands
pub async fn handle_session_command(action: SessionAction) -> Result<()> {
    match action {
        SessionAction::Start {
            name,
            domains,
            minutes,
            max_extra,
            title_kw,
            description_kw,
            keywords_kw,
        } => {
            let metadata = AllowedMetadata {
                title_includes: title_kw,
                description_includes: description_kw,
                keywords_includes: keywords_kw,
            };
            let config = SessionConfig {
                id: None,
                name,
                allowed_domains: domains,
                allowed_metadata: (!metadata.is_empty()).then_some(metadata),
                max_extra_domains: Some(max_extra),
                duration_minutes: minutes,
            };
            start_session(config).await
        }
        SessionAction::Stop { reason } => stop_session(&reason).await,
        SessionAction::Status => show_status().await,
        SessionAction::History { limit } => show_history(limit).await,
    }
}

async fn start_session(config: SessionConfig) -> Result<()> {
    if config.allowed_domains.iter().all(|d| d.trim().is_empty()) {
        bail!("A session needs at least one allowed domain (--domains)");
    }
    let mut guardian = open_oneshot().await?;
    match ok_response(guardian.handle(GuardianCommand::StartSession { session: config }).await)? {
        GuardianResponse::SessionStarted { session } => {
            println!("Started '{}' until {}", session.name, format_time(session.end_time));
            println!("  Allowed: {}", session.allowed_domains.join(", "));
            if session.max_extra_domains > 0 {
                println!("  Extra domains: {}", session.max_extra_domains);
            }
            Ok(())
        }
        other => bail!("unexpected response: {other:?}"),
    }
}

async fn stop_session(reason: &str) -> Result<()> {
    let mut guardian = open_oneshot().await?;
    let command = GuardianCommand::StopSession {
        justification: reason.to_string(),
    };
    match ok_response(guardian.handle(command).await)? {
        GuardianResponse::SessionStopped { success: true } => println!("Session stopped"),
        GuardianResponse::SessionStopped { success: false } => {
            println!("Stop rejected: give a study or work reason (20+ characters)");
        }
        other => bail!("unexpected response: {other:?}"),
    }
    Ok(())
}

async fn show_status() -> Result<()> {
    let mut guardian = open_oneshot().await?;
    let GuardianResponse::Status(status) =
        ok_response(guardian.handle(GuardianCommand::GetStatus).await)?
    else {
        bail!("unexpected response to status request");
    };

    println!("Guardian: {}", if status.enabled { "enabled" } else { "disabled" });
    println!("Focus mode: {}, lock: {}", status.focus_mode, status.focus_lock);
    println!("AI classifier: {}", if status.ai_available { "online" } else { "offline" });
    match status.session {
        Some(session) => {
            println!("\nSession '{}' ({})", session.name, session.id);
            println!("  Ends: {}", format_time(session.end_time));
            println!("  Remaining: {} min", session.remaining_ms / 60_000);
            println!("  Allowed: {}", session.allowed_domains.join(", "));
            println!(
                "  Extra domains: {}/{} {}",
                session.extra_domains_used.len(),
                session.max_extra_domains,
                session.extra_domains_used.join(", ")
            );
        }
        None => println!("\nNo active session"),
    }
    Ok(())
}

async fn show_history(limit: usize) -> Result<()> {
    let mut guardian = open_oneshot().await?;
    let GuardianResponse::SessionHistory { entries } =
        ok_response(guardian.handle(GuardianCommand::GetSessionHistory).await)?
    else {
        bail!("unexpected response to history request");
    };

    if entries.is_empty() {
        println!("No sessions yet");
        return Ok(());
    }

    let rows: Vec<HistoryRow> = entries
        .iter()
        .rev()
        .take(limit)
        .map(|e| HistoryRow {
            event: e.event.to_string(),
            name: e.name.clone(),
            at: format_time(e.timestamp),
            ends: e.end_time.map(format_time).unwrap_or_default(),
            domains: truncate_str(&e.allowed_domains.join(", "), 40),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}
