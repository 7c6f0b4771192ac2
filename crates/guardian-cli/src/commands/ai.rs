use anyhow::{bail, Context, Result};
use clap::Subcommand;
use guardian_core::{GuardianCommand, GuardianResponse};
use guardian_storage::{keys, AiConfig, AiProvider, Database, StoreExt};

use super::helpers::{format_time, ok_response, open_oneshot};

#[derive(Subcommand, Debug)]
pub enum AiAction {
    /// Configure the chat-completion provider
    Set {
        /// groq or openai
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
        /// Stored in the local database; the provider's env var is used when absent
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        /// Turn the classifier off
        #[arg(long)]
        disable: bool,
    },
    /// Probe the provider and show whether it answers
    Status,
}

fn apply_changes(
    mut config: AiConfig,
    provider: Option<&str>,
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    disable: bool,
) -> Result<AiConfig> {
    if let Some(name) = provider {
        config.provider = AiProvider::parse_provider(name)
            .with_context(|| format!("Unknown provider '{name}' (use groq or openai)"))?;
    }
    if model.is_some() {
        config.model = model;
    }
    if api_key.is_some() {
        config.api_key = api_key;
    }
    if base_url.is_some() {
        config.base_url = base_url;
    }
    config.enabled = !disable;
    Ok(config)
}

pub async fn handle_ai_command(action: AiAction) -> Result<()> {
    match action {
        AiAction::Set {
            provider,
            model,
            api_key,
            base_url,
            disable,
        } => {
            let db = Database::new(None).context("Failed to open database")?;
            let current: AiConfig = db.load_or_default(keys::AI_CONFIG).await?;
            let updated =
                apply_changes(current, provider.as_deref(), model, api_key, base_url, disable)?;
            db.save(keys::AI_CONFIG, &updated).await?;
            println!(
                "AI classifier: {} ({}), {}",
                updated.provider,
                updated.effective_model(),
                if updated.enabled { "enabled" } else { "disabled" }
            );
            Ok(())
        }
        AiAction::Status => {
            let mut guardian = open_oneshot().await?;
            match ok_response(guardian.handle(GuardianCommand::CheckApiStatus).await)? {
                GuardianResponse::ApiStatus {
                    working,
                    last_check,
                } => {
                    let checked = last_check.map_or_else(|| String::from("never"), format_time);
                    println!(
                        "AI classifier {} (checked {checked})",
                        if working { "working" } else { "unavailable" }
                    );
                    Ok(())
                }
                other => bail!("unexpected response: {other:?}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_changes_keeps_unset_fields() {
        let base = AiConfig {
            model: Some(String::from("llama3-70b-8192")),
            ..AiConfig::default()
        };
        let updated = apply_changes(base, Some("openai"), None, Some(String::from("sk-1")), None, false)
            .unwrap();
        assert_eq!(updated.provider, AiProvider::OpenAi);
        assert_eq!(updated.model.as_deref(), Some("llama3-70b-8192"));
        assert_eq!(updated.api_key.as_deref(), Some("sk-1"));
        assert!(updated.enabled);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(apply_changes(AiConfig::default(), Some("skynet"), None, None, None, false).is_err());
    }

    #[test]
    fn test_disable() {
        let updated = apply_changes(AiConfig::default(), None, None, None, None, true).unwrap();
        assert!(!updated.enabled);
    }
}
