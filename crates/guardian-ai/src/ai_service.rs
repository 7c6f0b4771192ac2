use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use guardian_storage::{AiConfig, PageMetadata};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::ai_provider::{create_provider, AiProviderTrait, CompletionRequest};
use crate::error::AiError;

/// How long a failed probe is trusted before the API is probed again
const PROBE_INTERVAL_MINS: i64 = 5;

/// Characters of page text sent with a content prompt
const CONTENT_PREVIEW_CHARS: usize = 500;

/// Distraction verdict returned by the LLM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AiVerdict {
    Distracting,
    Productive,
}

/// Last known reachability of the LLM endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApiStatus {
    pub working: bool,
    pub last_check: Option<DateTime<Utc>>,
}

/// Parse a `BLOCK` / `ALLOW` verdict. Anything else is unparseable.
///
/// # Errors
///
/// Returns [`AiError::Unparseable`] when the text is not exactly one of the tokens
pub fn parse_verdict(text: &str) -> Result<AiVerdict, AiError> {
    match text.trim().to_uppercase().as_str() {
        "BLOCK" => Ok(AiVerdict::Distracting),
        "ALLOW" => Ok(AiVerdict::Productive),
        _ => Err(AiError::Unparseable(text.to_string())),
    }
}

fn parse_score(text: &str) -> Result<f32, AiError> {
    text.trim()
        .parse::<f32>()
        .ok()
        .filter(|s| (0.0..=1.0).contains(s))
        .ok_or_else(|| AiError::Unparseable(text.to_string()))
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    s.char_indices().nth(max_chars).map_or(s, |(i, _)| &s[..i])
}

/// Unified AI Service
///
/// Wraps the configured chat-completion provider and exposes the guardian's
/// classification questions. Tracks reachability so callers can skip the
/// LLM entirely while it is known to be down.
pub struct AiService {
    provider: Box<dyn AiProviderTrait>,
    enabled: bool,
    status: RwLock<ApiStatus>,
}

impl AiService {
    /// Create a new AI service from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured
    pub fn new(config: &AiConfig) -> Result<Self> {
        let provider = create_provider(config)?;
        Ok(Self::with_provider(provider, config.enabled))
    }

    /// Build the service around an existing provider
    #[must_use]
    pub fn with_provider(provider: Box<dyn AiProviderTrait>, enabled: bool) -> Self {
        Self {
            provider,
            enabled,
            status: RwLock::new(ApiStatus::default()),
        }
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub async fn status(&self) -> ApiStatus {
        *self.status.read().await
    }

    /// Enabled and the last probe or call succeeded
    pub async fn is_available(&self) -> bool {
        self.enabled && self.status.read().await.working
    }

    /// Not known to work and the last probe is stale (or never happened)
    pub async fn needs_probe(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        let status = self.status.read().await;
        !status.working
            && status
                .last_check
                .map_or(true, |t| now - t > Duration::minutes(PROBE_INTERVAL_MINS))
    }

    /// Send a one-token request and record whether it succeeded
    pub async fn check_connection(&self, now: DateTime<Utc>) -> bool {
        let working = if self.enabled {
            match self
                .provider
                .complete(&CompletionRequest::new("test", 1, 0.0))
                .await
            {
                Ok(_) => true,
                Err(e) => {
                    log::warn!("AI connection check failed: {e:#}");
                    false
                }
            }
        } else {
            false
        };

        let mut status = self.status.write().await;
        status.working = working;
        status.last_check = Some(now);
        working
    }

    /// Classify a URL as distracting or productive
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unavailable, the request fails, or the reply is unparseable
    pub async fn classify_url(&self, url: &str, hostname: &str) -> Result<AiVerdict, AiError> {
        let prompt = format!(
            "Analyze this URL and determine if it's likely to be distracting or unproductive for studying/work.\n\
             \n\
             URL: {url}\n\
             Hostname: {hostname}\n\
             \n\
             Consider these factors:\n\
             - Is it related to movies, TV shows, social media, gaming, or streaming?\n\
             - Is it educational, professional, or work-related?\n\
             - Does the URL suggest productive content like documentation, tutorials, or academic resources?\n\
             \n\
             Respond with only \"BLOCK\" if it should be blocked (distracting) or \"ALLOW\" if it should be allowed (productive)."
        );
        let reply = self.ask(CompletionRequest::new(prompt, 10, 0.1)).await?;
        parse_verdict(&reply)
    }

    /// Classify extracted page content as distracting or productive
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unavailable, the request fails, or the reply is unparseable
    pub async fn classify_content(
        &self,
        url: &str,
        page: &PageMetadata,
    ) -> Result<AiVerdict, AiError> {
        let prompt = format!(
            "Analyze this webpage content and determine if it's distracting for productivity/studying:\n\
             \n\
             Title: {}\n\
             URL: {url}\n\
             Meta Description: {}\n\
             Keywords: {}\n\
             Content Preview: {}\n\
             \n\
             Respond with:\n\
             - \"BLOCK\" if it's primarily distracting (movies, TV, social media, gaming, gossip)\n\
             - \"ALLOW\" if it's educational, professional, or useful information",
            page.title,
            page.description,
            page.keywords,
            truncate_chars(&page.text, CONTENT_PREVIEW_CHARS),
        );
        let reply = self.ask(CompletionRequest::new(prompt, 10, 0.1)).await?;
        parse_verdict(&reply)
    }

    /// Strict check of a bypass/stop justification
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unavailable, the request fails, or the reply is not ALLOW/DENY
    pub async fn review_justification(&self, justification: &str) -> Result<bool, AiError> {
        let prompt = format!(
            "User justification to bypass focus for 5 minutes:\n\n\"{justification}\"\n\n\
             Decide STRICTLY if this is productive (ALLOW) or a distraction (DENY). \
             Respond with ONLY ALLOW or DENY."
        );
        let reply = self.ask(CompletionRequest::new(prompt, 3, 0.0)).await?;
        match reply.trim().to_uppercase().as_str() {
            "ALLOW" => Ok(true),
            "DENY" => Ok(false),
            _ => Err(AiError::Unparseable(reply)),
        }
    }

    /// Relevance of `text` to the topic list as a score in `[0, 1]`
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unavailable, the request fails, or the reply is not a score
    pub async fn score_relevance(&self, text: &str, topics: &[String]) -> Result<f32, AiError> {
        let prompt = format!(
            "Rate how relevant the following text is to these study topics: {}.\n\n\
             Text: {}\n\n\
             Respond with ONLY a number between 0 and 1.",
            topics.join(", "),
            truncate_chars(text, CONTENT_PREVIEW_CHARS),
        );
        let reply = self.ask(CompletionRequest::new(prompt, 5, 0.0)).await?;
        parse_score(&reply)
    }

    async fn ask(&self, request: CompletionRequest) -> Result<String, AiError> {
        if !self.is_available().await {
            return Err(AiError::Unavailable);
        }
        match self.provider.complete(&request).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                self.status.write().await.working = false;
                Err(AiError::Request(e))
            }
        }
    }
}
