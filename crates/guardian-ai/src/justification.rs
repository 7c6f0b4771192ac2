use std::sync::Arc;

use crate::ai_service::AiService;

const MIN_LENGTH: usize = 20;

const STUDY_KEYWORDS: &[&str] = &[
    "assignment",
    "research",
    "tutorial",
    "docs",
    "documentation",
    "course",
    "class",
    "study",
    "work",
    "bug",
    "issue",
    "learning",
];

/// Acceptance gate for bypass requests and early session stops.
///
/// A justification must be long enough and mention study or work. When the
/// LLM is reachable it gets a strict ALLOW/DENY say; if that call fails the
/// heuristic result stands.
#[derive(Clone, Default)]
pub struct JustificationGate {
    ai: Option<Arc<AiService>>,
}

impl JustificationGate {
    #[must_use]
    pub fn new(ai: Option<Arc<AiService>>) -> Self {
        Self { ai }
    }

    /// Length and keyword check only
    #[must_use]
    pub fn passes_heuristic(text: &str) -> bool {
        let text = text.trim().to_lowercase();
        text.chars().count() >= MIN_LENGTH && STUDY_KEYWORDS.iter().any(|k| text.contains(k))
    }

    pub async fn evaluate(&self, text: &str) -> bool {
        if !Self::passes_heuristic(text) {
            log::info!("Justification rejected by heuristic");
            return false;
        }

        let Some(ai) = &self.ai else {
            return true;
        };
        if !ai.is_available().await {
            return true;
        }

        match ai.review_justification(text).await {
            Ok(approved) => {
                log::info!("Justification reviewed by AI: {}", if approved { "ALLOW" } else { "DENY" });
                approved
            }
            Err(e) => {
                log::warn!("Justification review failed, accepting: {e}");
                true
            }
        }
    }
}
