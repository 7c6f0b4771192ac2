pub mod ai_provider;
pub mod ai_service;
pub mod error;
pub mod justification;
pub mod providers;
pub mod relevance;

pub use ai_provider::{create_provider, AiProviderTrait, CompletionRequest};
pub use ai_service::{ApiStatus, AiService, AiVerdict};
pub use error::AiError;
pub use justification::JustificationGate;
pub use relevance::{RelevanceClassifier, RelevanceVerdict};
