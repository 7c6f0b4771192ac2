mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::ai::AiAction;
use commands::session::SessionAction;
use commands::settings::SettingsAction;

#[derive(Parser)]
#[command(name = "guardian")]
#[command(about = "Focus sessions and content blocking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a URL as if it was just opened
    Check {
        url: String,
        /// Page title (switches to content analysis)
        #[arg(long)]
        title: Option<String>,
        /// Meta description
        #[arg(long)]
        description: Option<String>,
        /// Meta keywords
        #[arg(long)]
        keywords: Option<String>,
        /// Text typed into a chat assistant
        #[arg(long)]
        query: Option<String>,
        /// Visible page text
        #[arg(long)]
        text: Option<String>,
    },
    /// Focus session management
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Request a temporary bypass for a site
    Bypass {
        hostname: String,
        /// Why you need the site
        #[arg(short, long)]
        reason: String,
    },
    /// Blocking settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// LLM classifier configuration
    Ai {
        #[command(subcommand)]
        action: AiAction,
    },
    /// Current time in the configured zone
    Time,
    /// Recent blocks
    Blocked {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Read navigations from stdin (`<url>` or `<tab> <url>` per line) until EOF or Ctrl-C
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    match cli.command {
        Commands::Check {
            url,
            title,
            description,
            keywords,
            query,
            text,
        } => {
            let page = commands::check::page_from_flags(title, description, keywords, query, text);
            commands::check::check_command(&url, page).await
        }
        Commands::Session { action } => commands::session::handle_session_command(action).await,
        Commands::Bypass { hostname, reason } => {
            commands::check::bypass_command(&hostname, &reason).await
        }
        Commands::Settings { action } => {
            commands::settings::handle_settings_command(action).await
        }
        Commands::Ai { action } => commands::ai::handle_ai_command(action).await,
        Commands::Time => commands::check::time_command().await,
        Commands::Blocked { limit } => commands::check::blocked_command(limit).await,
        Commands::Run => commands::run::run_command().await,
    }
}
