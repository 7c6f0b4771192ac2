
use guardian_storage::{AllowedMetadata, PageMetadata};
use serde::Serialize;
use std::sync::Arc;

use crate::ai_service::AiService;

/// Outcome of a relevance check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelevanceVerdict {
    pub relevant: bool,
    /// 0.0 to 1.0
    pub score: f32,
    pub reason: String,
}

impl RelevanceVerdict {
    fn matched(reason: String) -> Self {
        Self {
            relevant: true,
            score: 1.0,
            reason,
        }
    }

    fn unmatched(reason: String) -> Self {
        Self {
            relevant: false,
            score: 0.0,
            reason,
        }
    }

    /// No rules configured: the gate is inert
    fn unconstrained() -> Self {
        Self::matched(String::from("no topics configured"))
    }

    /// Analysis failed: never block on infrastructure errors
    fn fail_open(reason: String) -> Self {
        Self::matched(reason)
    }
}

fn find_topic<'a>(haystack: &str, topics: &'a [String]) -> Option<&'a str> {
    let haystack = haystack.to_lowercase();
    topics
        .iter()
        .map(String::as_str)
        .filter(|t| !t.is_empty())
        .find(|t| haystack.contains(&t.to_lowercase()))
}

/// Case-insensitive substring match. An empty topic list matches everything.
#[must_use]
pub fn keyword_relevance(text: &str, topics: &[String]) -> RelevanceVerdict {
    if topics.iter().all(String::is_empty) {
        return RelevanceVerdict::unconstrained();
    }
    match find_topic(text, topics) {
        Some(topic) => RelevanceVerdict::matched(format!("matched topic '{topic}'")),
        None => RelevanceVerdict::unmatched(String::from("no topic matched")),
    }
}

/// Match page metadata field by field.
///
/// A hit in any field against any of that field's keywords is enough. Fields
/// with no keywords are skipped; when every list is empty the page matches.
#[must_use]
pub fn metadata_relevance(allowed: &AllowedMetadata, page: &PageMetadata) -> RelevanceVerdict {
    if allowed.is_empty() {
        return RelevanceVerdict::unconstrained();
    }

    let fields = [
        ("title", &page.title, &allowed.title_includes),
        ("description", &page.description, &allowed.description_includes),
        ("keywords", &page.keywords, &allowed.keywords_includes),
    ];

    for (field, value, keywords) in fields {
        if keywords.is_empty() {
            continue;
        }
        if let Some(keyword) = find_topic(value, keywords) {
            return RelevanceVerdict::matched(format!("{field} contains '{keyword}'"));
        }
    }

    RelevanceVerdict::unmatched(String::from("content does not match allowed metadata"))
}

/// Chat assistants: the typed query OR the page text may carry the topic.
///
/// Either side matching is sufficient so a half-typed question is not blocked.
#[must_use]
pub fn chat_relevance(topics: &[String], query: &str, page_text: &str) -> RelevanceVerdict {
    if topics.iter().all(String::is_empty) {
        return RelevanceVerdict::unconstrained();
    }
    if let Some(topic) = find_topic(query, topics) {
        return RelevanceVerdict::matched(format!("chat query mentions '{topic}'"));
    }
    if let Some(topic) = find_topic(page_text, topics) {
        return RelevanceVerdict::matched(format!("chat page mentions '{topic}'"));
    }
    RelevanceVerdict::unmatched(String::from("chat query and page do not match allowed topics"))
}

/// Relevance classifier: pure keyword matching, optionally backed by the LLM.
///
/// The LLM is consulted only when keywords found nothing; any LLM failure
/// yields `relevant = true`.
#[derive(Clone)]
pub enum RelevanceClassifier {
    Keyword,
    Ai(Arc<AiService>),
}

impl RelevanceClassifier {
    /// Relevance of free text to `topics`; the LLM score must reach `threshold`
    pub async fn is_relevant(&self, text: &str, topics: &[String], threshold: f32) -> RelevanceVerdict {
        let baseline = keyword_relevance(text, topics);
        if baseline.relevant {
            return baseline;
        }
        self.delegate(text, topics, threshold, baseline).await
    }

    /// Metadata gate: per-field keywords first, then the LLM over the whole page
    pub async fn matches_metadata(
        &self,
        allowed: &AllowedMetadata,
        page: &PageMetadata,
        threshold: f32,
    ) -> RelevanceVerdict {
        let baseline = metadata_relevance(allowed, page);
        if baseline.relevant {
            return baseline;
        }
        let text = format!("{} {} {}", page.title, page.description, page.keywords);
        self.delegate(&text, &allowed.all_keywords(), threshold, baseline)
            .await
    }

    async fn delegate(
        &self,
        text: &str,
        topics: &[String],
        threshold: f32,
        baseline: RelevanceVerdict,
    ) -> RelevanceVerdict {
        let Self::Ai(service) = self else {
            return baseline;
        };
        match service.score_relevance(text, topics).await {
            Ok(score) if score >= threshold => RelevanceVerdict {
                relevant: true,
                score,
                reason: format!("AI relevance score {score:.2}"),
            },
            Ok(score) => RelevanceVerdict {
                relevant: false,
                score,
                reason: format!("AI relevance score {score:.2} below {threshold:.2}"),
            },
            Err(e) => {
                log::warn!("Relevance analysis failed, allowing: {e}");
                RelevanceVerdict::fail_open(format!("analysis unavailable: {e}"))
            }
        }
    }
}
