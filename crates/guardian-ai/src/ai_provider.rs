use anyhow::{Context, Result};
use async_trait::async_trait;
use guardian_storage::AiConfig;

use crate::providers::openai::OpenAiProvider;

/// A single chat-completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    #[must_use]
    pub fn new(prompt: impl Into<String>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
            temperature,
        }
    }
}

/// Trait for AI providers
#[async_trait]
pub trait AiProviderTrait: Send + Sync {
    /// Send the request and return the first choice's message content
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Get the model name being used
    fn model_name(&self) -> &str;
}

/// Create a provider instance based on configuration
///
/// # Errors
///
/// Returns an error if no API key is configured or the HTTP client cannot be built
pub fn create_provider(config: &AiConfig) -> Result<Box<dyn AiProviderTrait>> {
    let api_key = config
        .effective_api_key()
        .with_context(|| format!("API key required for {}", config.provider))?;

    Ok(Box::new(OpenAiProvider::new(
        &api_key,
        config.effective_model(),
        Some(config.effective_base_url()),
    )?))
}
