use thiserror::Error;

/// Failures of the external LLM classifier.
///
/// Callers recover from every variant locally by failing open; none of these
/// ever turns into a Block verdict.
#[derive(Debug, Error)]
pub enum AiError {
    /// No key configured, disabled, or the last probe failed
    #[error("AI classifier unavailable")]
    Unavailable,

    /// Transport failure or non-2xx status
    #[error("AI request failed: {0:#}")]
    Request(#[from] anyhow::Error),

    /// Response text was not one of the expected tokens
    #[error("unparseable AI response: {0:?}")]
    Unparseable(String),
}
