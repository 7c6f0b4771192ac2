use async_trait::async_trait;
use guardian_ai::{AiError, AiService, AiVerdict};
use guardian_storage::PageMetadata;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Distracting-vs-productive judgment used by the last policy rule
#[async_trait]
pub trait DistractionClassifier: Send + Sync {
    async fn classify(
        &self,
        url: &str,
        hostname: &str,
        page: Option<&PageMetadata>,
    ) -> Result<AiVerdict, AiError>;
}

/// Cache key: the same URL with a different title is a different page
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ContextSnapshot {
    pub url: String,
    pub title: Option<String>,
}

impl ContextSnapshot {
    #[must_use]
    pub fn new(url: &str, page: Option<&PageMetadata>) -> Self {
        Self {
            url: url.to_string(),
            title: page.map(|p| p.title.clone()).filter(|t| !t.is_empty()),
        }
    }
}

const DEFAULT_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(v) => v,
    None => unreachable!(),
};

/// LLM classifier with an LRU cache of successful verdicts
pub struct CachedAiClassifier {
    ai_service: Arc<AiService>,
    cache: RwLock<LruCache<ContextSnapshot, AiVerdict>>,
}

impl CachedAiClassifier {
    #[must_use]
    pub fn new(ai_service: Arc<AiService>, cache_size: usize) -> Self {
        let cache_size = NonZeroUsize::new(cache_size).unwrap_or(DEFAULT_CACHE_SIZE);
        Self {
            ai_service,
            cache: RwLock::new(LruCache::new(cache_size)),
        }
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[async_trait]
impl DistractionClassifier for CachedAiClassifier {
    async fn classify(
        &self,
        url: &str,
        hostname: &str,
        page: Option<&PageMetadata>,
    ) -> Result<AiVerdict, AiError> {
        let context = ContextSnapshot::new(url, page);
        if let Some(cached) = self.cache.write().await.get(&context) {
            return Ok(*cached);
        }

        let verdict = match page {
            Some(page) => self.ai_service.classify_content(url, page).await?,
            None => self.ai_service.classify_url(url, hostname).await?,
        };

        // Failures are never cached so the next navigation retries
        self.cache.write().await.put(context, verdict);
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{online_ai, ScriptedAi};

    #[tokio::test]
    async fn test_verdicts_are_cached() {
        let ai = ScriptedAi::new(vec![Ok("BLOCK")]);
        let prompts = ai.prompts.clone();
        let classifier = CachedAiClassifier::new(online_ai(ai).await, 10);

        for _ in 0..2 {
            let verdict = classifier
                .classify("https://funny.example/cats", "funny.example", None)
                .await
                .unwrap();
            assert_eq!(verdict, AiVerdict::Distracting);
        }
        // probe + one classification
        assert_eq!(prompts.lock().unwrap().len(), 2);
        assert_eq!(classifier.cached_len().await, 1);
    }

    #[tokio::test]
    async fn test_title_is_part_of_the_key() {
        let classifier =
            CachedAiClassifier::new(online_ai(ScriptedAi::new(vec![Ok("ALLOW"), Ok("BLOCK")])).await, 10);
        let page = PageMetadata {
            title: String::from("Lecture notes"),
            ..PageMetadata::default()
        };
        let url = "https://video.example/watch";
        assert_eq!(
            classifier.classify(url, "video.example", Some(&page)).await.unwrap(),
            AiVerdict::Productive
        );
        assert_eq!(
            classifier.classify(url, "video.example", None).await.unwrap(),
            AiVerdict::Distracting
        );
    }

    #[tokio::test]
    async fn test_failures_not_cached() {
        let classifier =
            CachedAiClassifier::new(online_ai(ScriptedAi::new(vec![Ok("maybe?")])).await, 10);
        let result = classifier.classify("https://a.example/", "a.example", None).await;
        assert!(matches!(result, Err(AiError::Unparseable(_))));
        assert_eq!(classifier.cached_len().await, 0);
    }

    #[test]
    fn test_zero_cache_size_uses_default() {
        let service = Arc::new(AiService::with_provider(Box::new(ScriptedAi::new(Vec::new())), true));
        let classifier = CachedAiClassifier::new(service, 0);
        assert_eq!(classifier.cache.try_read().unwrap().cap(), DEFAULT_CACHE_SIZE);
    }
}
