//! Fakes shared by the unit tests of this crate.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use guardian_ai::{AiProviderTrait, AiService, CompletionRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::clock::Clock;
use crate::scheduler::{ExpiryScheduler, ScheduledExpiry};

/// Hand-driven clock; clones share the same instant
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Records deadlines instead of sleeping; tests fire ticks by hand
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    armed: Arc<Mutex<Vec<(DateTime<Utc>, Arc<AtomicBool>)>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deadlines that were scheduled and not cancelled
    pub fn pending(&self) -> Vec<DateTime<Utc>> {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, cancelled)| !cancelled.load(Ordering::SeqCst))
            .map(|(deadline, _)| *deadline)
            .collect()
    }

    /// Every deadline ever scheduled
    pub fn scheduled_count(&self) -> usize {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl ExpiryScheduler for ManualScheduler {
    fn schedule(&self, deadline: DateTime<Utc>) -> ScheduledExpiry {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((deadline, cancelled.clone()));
        ScheduledExpiry::untimed(cancelled)
    }
}

/// Chat provider that replays scripted replies in order
pub struct ScriptedAi {
    replies: Mutex<Vec<Result<String, String>>>,
    pub prompts: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedAi {
    pub fn new(replies: Vec<Result<&str, &str>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .rev()
                    .map(|r| r.map(ToString::to_string).map_err(ToString::to_string))
                    .collect(),
            ),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl AiProviderTrait for ScriptedAi {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.prompts.lock().unwrap().push(request.clone());
        match self.replies.lock().unwrap().pop() {
            Some(Ok(text)) => Ok(text),
            Some(Err(e)) => Err(anyhow::anyhow!(e)),
            None => Err(anyhow::anyhow!("no scripted reply")),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Service whose connectivity probe already succeeded; `ai` replies follow the probe
pub async fn online_ai(ai: ScriptedAi) -> Arc<AiService> {
    ai.replies.lock().unwrap().push(Ok(String::from("ok")));
    let service = AiService::with_provider(Box::new(ai), true);
    assert!(service.check_connection(Utc::now()).await);
    Arc::new(service)
}
