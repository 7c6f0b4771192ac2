//! Shared plumbing for CLI commands

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use guardian_ai::AiService;
use guardian_core::{
    default_sources, BlockSink, ExpiryScheduler, Guardian, GuardianConfig, GuardianDeps,
    GuardianResponse, SystemClock,
};
use guardian_storage::{keys, AiConfig, Database, KeyValueStore, StoreExt};
use std::sync::Arc;

/// Prints block requests instead of rendering a blocking page
pub struct ConsoleSink;

impl BlockSink for ConsoleSink {
    fn render_block(&self, tab_id: u64, hostname: &str, reason: &str) {
        println!("BLOCKED [tab {tab_id}] {hostname}: {reason}");
    }
}

/// Build the LLM service from stored configuration; `None` when disabled or without a key
pub async fn load_ai(store: &dyn KeyValueStore) -> Result<Option<Arc<AiService>>> {
    let config: AiConfig = store.load_or_default(keys::AI_CONFIG).await?;
    if !config.enabled {
        log::debug!("AI classifier disabled");
        return Ok(None);
    }
    match AiService::new(&config) {
        Ok(service) => Ok(Some(Arc::new(service))),
        Err(e) => {
            log::debug!("AI classifier not configured: {e:#}");
            Ok(None)
        }
    }
}

/// Open the on-disk store and restore the guardian over it
pub async fn open_guardian(scheduler: Arc<dyn ExpiryScheduler>) -> Result<Guardian> {
    let config = GuardianConfig::load_default()?;
    let store: Arc<dyn KeyValueStore> =
        Arc::new(Database::new(None).context("Failed to open database")?);
    let ai = load_ai(store.as_ref()).await?;
    let deps = GuardianDeps {
        store,
        clock: Arc::new(SystemClock),
        scheduler,
        time_sources: default_sources(config.time_request_timeout_ms)?,
        ai,
        sink: Arc::new(ConsoleSink),
    };
    Guardian::load(deps, config).await
}

/// Guardian for a single command; expiry ticks are not consumed
pub async fn open_oneshot() -> Result<Guardian> {
    let (ticks, _) = tokio::sync::mpsc::unbounded_channel();
    let scheduler = guardian_core::TokioScheduler::new(Arc::new(SystemClock), ticks);
    open_guardian(Arc::new(scheduler)).await
}

/// Turn an error response into an error
pub fn ok_response(response: GuardianResponse) -> Result<GuardianResponse> {
    if let GuardianResponse::Error { message } = response {
        bail!(message);
    }
    Ok(response)
}

#[must_use]
pub fn format_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Safely truncate a string to a maximum number of characters (not bytes).
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count > max_chars {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        s.to_string()
    }
}
