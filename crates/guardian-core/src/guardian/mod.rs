//! The guardian facade: navigation events in, block requests and command responses out.


use anyhow::Result;
use chrono::Duration;
use guardian_ai::{AiService, JustificationGate, RelevanceClassifier};
use guardian_storage::{
    keys, BlockEvent, GuardianSettings, KeyValueStore, PageMetadata, SessionConfig, StoreExt,
};
use std::sync::Arc;
use url::Url;

use crate::ai_classifier::{CachedAiClassifier, DistractionClassifier};
use crate::bypass::BypassLedger;
use crate::clock::Clock;
use crate::commands::{GuardianCommand, GuardianResponse, GuardianStatus, SessionStatus};
use crate::config::GuardianConfig;
use crate::error::GuardianError;
use crate::policy::{PolicyContext, PolicyEngine, PolicyVerdict};
use crate::scheduler::ExpiryScheduler;
use crate::session_manager::{SessionManager, SessionState};
use crate::time_provider::{TimeProvider, TimeSource};

/// Most recent block events kept in the log
const BLOCK_LOG_CAP: usize = 100;

/// A cached zone time older than a day is useless
const MAX_TIME_CACHE_SECS: u64 = 24 * 60 * 60;

/// Renders the blocking UI in a tab
pub trait BlockSink: Send + Sync {
    fn render_block(&self, tab_id: u64, hostname: &str, reason: &str);
}

/// Collaborators injected into the guardian
pub struct GuardianDeps {
    pub store: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
    pub scheduler: Arc<dyn ExpiryScheduler>,
    pub time_sources: Vec<Box<dyn TimeSource>>,
    /// `None` when no LLM is configured
    pub ai: Option<Arc<AiService>>,
    pub sink: Arc<dyn BlockSink>,
}

/// Host and URL of a navigation the guardian evaluates; other schemes are ignored
fn web_target(url: &str) -> Option<(Url, String)> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_lowercase();
    Some((parsed, host))
}

pub struct Guardian {
    config: GuardianConfig,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn BlockSink>,
    settings: GuardianSettings,
    sessions: SessionManager,
    bypass: BypassLedger,
    gate: JustificationGate,
    policy: PolicyEngine,
    time: TimeProvider,
    ai: Option<Arc<AiService>>,
    classifier: Option<CachedAiClassifier>,
}

impl Guardian {
    /// Build the guardian and restore persisted state
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the store cannot be read
    pub async fn load(deps: GuardianDeps, config: GuardianConfig) -> Result<Self> {
        config.validate()?;
        let GuardianDeps {
            store,
            clock,
            scheduler,
            time_sources,
            ai,
            sink,
        } = deps;

        let settings: GuardianSettings = store.load_or_default(keys::SETTINGS).await?;
        let gate = JustificationGate::new(ai.clone());
        let relevance = ai
            .clone()
            .map_or(RelevanceClassifier::Keyword, RelevanceClassifier::Ai);
        let policy = PolicyEngine::new(
            config.hard_exemptions.clone(),
            relevance,
            config.relevance_threshold,
        )?;
        let cache_ttl = Duration::seconds(
            i64::try_from(config.time_cache_secs.min(MAX_TIME_CACHE_SECS)).unwrap_or(0),
        );
        let time =
            TimeProvider::new(time_sources, clock.clone()).with_cache(store.clone(), cache_ttl);
        let classifier = ai
            .clone()
            .map(|service| CachedAiClassifier::new(service, config.ai_verdict_cache_size));

        let mut guardian = Self {
            sessions: SessionManager::new(store.clone(), clock.clone(), scheduler, gate.clone()),
            bypass: BypassLedger::new(store.clone(), clock.clone(), config.bypass_minutes),
            config,
            store,
            clock,
            sink,
            settings,
            gate,
            policy,
            time,
            ai,
            classifier,
        };
        guardian.sessions.load().await?;
        guardian.restore_focus_flags().await?;
        guardian.refresh_ai_status().await;
        log::info!(
            "Guardian loaded (enabled: {}, session active: {})",
            guardian.settings.enabled,
            guardian.sessions.is_active()
        );
        Ok(guardian)
    }

    #[must_use]
    pub fn settings(&self) -> &GuardianSettings {
        &self.settings
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// A navigation happened in `tab_id`. Returns the verdict when the URL was evaluated.
    ///
    /// Blocks are rendered through the sink and logged; faults never propagate.
    pub async fn on_navigate(&mut self, tab_id: u64, url: &str) -> Option<PolicyVerdict> {
        if !self.settings.enabled {
            return None;
        }
        let (parsed, hostname) = web_target(url)?;
        let verdict = self.evaluate(parsed.as_str(), &hostname, None).await;
        if !verdict.allow {
            self.apply_block(tab_id, &hostname, &verdict).await;
        }
        Some(verdict)
    }

    /// Content-script path: evaluate a page with its extracted metadata
    pub async fn analyze_content(
        &mut self,
        url: &str,
        page: &PageMetadata,
    ) -> Option<PolicyVerdict> {
        if !self.settings.enabled {
            return None;
        }
        let (parsed, hostname) = web_target(url)?;
        Some(self.evaluate(parsed.as_str(), &hostname, Some(page)).await)
    }

    /// The armed expiry timer fired
    pub async fn on_expiry_tick(&mut self) {
        match self.sessions.refresh().await {
            Ok(true) => {}
            Ok(false) => {
                if let Err(e) = self.release_lock_if_idle().await {
                    log::error!("Failed to release focus lock: {e:#}");
                }
            }
            Err(e) => log::error!("Session refresh failed: {e:#}"),
        }
    }

    /// Dispatch one UI command. Failures become [`GuardianResponse::Error`].
    pub async fn handle(&mut self, command: GuardianCommand) -> GuardianResponse {
        match self.dispatch(command).await {
            Ok(response) => response,
            Err(e) => {
                log::error!("Command failed: {e:#}");
                GuardianResponse::Error {
                    message: format!("{e:#}"),
                }
            }
        }
    }

    async fn dispatch(&mut self, command: GuardianCommand) -> Result<GuardianResponse> {
        match command {
            GuardianCommand::StartSession { session } => self.start_session(session).await,
            GuardianCommand::StopSession { justification } => {
                self.refresh_ai_status().await;
                let success = self.sessions.stop(&justification).await?;
                if success {
                    self.release_lock_if_idle().await?;
                }
                Ok(GuardianResponse::SessionStopped { success })
            }
            GuardianCommand::RequestBypass {
                hostname,
                justification,
            } => self.request_bypass(&hostname, &justification).await,
            GuardianCommand::UpdateSettings { settings } => {
                self.settings.apply(settings);
                self.save_settings().await?;
                log::info!("Settings updated");
                Ok(GuardianResponse::SettingsUpdated {
                    settings: self.settings.clone(),
                })
            }
            GuardianCommand::GetSettings => Ok(GuardianResponse::Settings {
                settings: self.settings.clone(),
            }),
            GuardianCommand::GetStatus => Ok(GuardianResponse::Status(self.status().await?)),
            GuardianCommand::AnalyzeContent { url, data } => {
                let response = match self.analyze_content(&url, &data).await {
                    Some(verdict) => GuardianResponse::Analysis {
                        should_block: !verdict.allow,
                        reason: verdict.reason.to_string(),
                    },
                    None => GuardianResponse::Analysis {
                        should_block: false,
                        reason: String::from("not evaluated"),
                    },
                };
                Ok(response)
            }
            GuardianCommand::CheckApiStatus => {
                let Some(ai) = &self.ai else {
                    return Ok(GuardianResponse::ApiStatus {
                        working: false,
                        last_check: None,
                    });
                };
                ai.check_connection(self.clock.now()).await;
                let status = ai.status().await;
                Ok(GuardianResponse::ApiStatus {
                    working: status.working,
                    last_check: status.last_check,
                })
            }
            GuardianCommand::GetZoneTime => {
                let time = self.time.current_time_in_zone(&self.config.time_zone).await;
                Ok(GuardianResponse::ZoneTime {
                    zone: self.config.time_zone.clone(),
                    hour: time.hour,
                    minute: time.minute,
                })
            }
            GuardianCommand::GetSessionHistory => Ok(GuardianResponse::SessionHistory {
                entries: self.sessions.history().await?,
            }),
            GuardianCommand::GetBlockedEvents => Ok(GuardianResponse::BlockedEvents {
                events: self.store.load_or_default(keys::BLOCKED_EVENTS).await?,
            }),
        }
    }

    async fn start_session(&mut self, config: SessionConfig) -> Result<GuardianResponse> {
        let session = self
            .sessions
            .start(config, &self.settings.allowed_metadata)
            .await?;
        self.settings.focus_mode = true;
        self.settings.focus_lock = true;
        self.save_settings().await?;
        Ok(GuardianResponse::SessionStarted { session })
    }

    async fn request_bypass(
        &mut self,
        hostname: &str,
        justification: &str,
    ) -> Result<GuardianResponse> {
        let hostname = hostname.trim().to_lowercase();
        if hostname.is_empty() {
            return Err(GuardianError::InvalidConfig(String::from("bypass hostname is empty")).into());
        }
        let minutes = self.bypass.grant_minutes();
        self.refresh_ai_status().await;
        if !self.gate.evaluate(justification).await {
            log::info!("Bypass for {hostname} rejected");
            return Ok(GuardianResponse::Bypass {
                approved: false,
                hostname,
                until: None,
                minutes,
            });
        }
        let until = self.bypass.grant(&hostname).await?;
        Ok(GuardianResponse::Bypass {
            approved: true,
            hostname,
            until: Some(until),
            minutes,
        })
    }

    async fn status(&mut self) -> Result<GuardianStatus> {
        if !self.sessions.is_active() {
            self.sessions.refresh().await?;
            self.release_lock_if_idle().await?;
        }
        let now = self.clock.now();
        let session = match self.sessions.state() {
            SessionState::Active(s) => Some(SessionStatus {
                end_time: s.end_time,
                remaining_ms: s.remaining(now).num_milliseconds(),
                max_extra_domains: s.max_extra_domains,
                extra_domains_used: self.sessions.extra_domains_used().await?,
                id: s.id,
                name: s.name,
                allowed_domains: s.allowed_domains,
            }),
            SessionState::NoSession => None,
        };
        let ai_available = match &self.ai {
            Some(ai) => ai.is_available().await,
            None => false,
        };
        Ok(GuardianStatus {
            enabled: self.settings.enabled,
            focus_mode: self.settings.focus_mode,
            focus_lock: self.settings.focus_lock,
            session,
            ai_available,
            blocked_sites: self.settings.blocked_sites.len(),
            allowed_sites: self.settings.allowed_sites.len(),
        })
    }

    async fn evaluate(
        &mut self,
        url: &str,
        hostname: &str,
        page: Option<&PageMetadata>,
    ) -> PolicyVerdict {
        if !self.sessions.is_active() {
            if let Err(e) = self.sessions.refresh().await {
                log::warn!("Session refresh failed: {e:#}");
            }
            if let Err(e) = self.release_lock_if_idle().await {
                log::warn!("Failed to release focus lock: {e:#}");
            }
        }

        let bypass = self.bypass.table().await.unwrap_or_else(|e| {
            log::warn!("Bypass table unreadable, ignoring grants: {e:#}");
            guardian_storage::BypassTable::default()
        });

        let local_time = if self.settings.category_rules.is_empty() {
            None
        } else {
            Some(self.time.current_time_in_zone(&self.config.time_zone).await)
        };

        let now = self.clock.now();
        let ai_available = self.refresh_ai_status().await;

        let ctx = PolicyContext {
            hostname,
            url,
            page,
            session: self.sessions.active_session(),
            bypass: &bypass,
            settings: &self.settings,
            local_time,
            now,
            ai_available,
        };
        let classifier = self
            .classifier
            .as_ref()
            .map(|c| c as &dyn DistractionClassifier);
        self.policy.evaluate(&ctx, &self.sessions, classifier).await
    }

    async fn apply_block(&self, tab_id: u64, hostname: &str, verdict: &PolicyVerdict) {
        let reason = verdict.reason.to_string();
        log::info!("Blocking {hostname} in tab {tab_id}: {reason}");
        self.sink.render_block(tab_id, hostname, &reason);

        let event = BlockEvent {
            hostname: hostname.to_string(),
            reason,
            timestamp: self.clock.now(),
        };
        if let Err(e) = self
            .store
            .append_capped(keys::BLOCKED_EVENTS, event, Some(BLOCK_LOG_CAP))
            .await
        {
            log::warn!("Failed to record block event: {e:#}");
        }
    }

    /// Probe the LLM when its reachability is unknown or stale. Returns availability.
    async fn refresh_ai_status(&self) -> bool {
        let Some(ai) = &self.ai else {
            return false;
        };
        let now = self.clock.now();
        if ai.needs_probe(now).await {
            ai.check_connection(now).await;
        }
        ai.is_available().await
    }

    /// A restored session re-asserts focus mode and lock; otherwise the lock is released
    async fn restore_focus_flags(&mut self) -> Result<()> {
        if !self.sessions.is_active() {
            return self.release_lock_if_idle().await;
        }
        if !(self.settings.focus_mode && self.settings.focus_lock) {
            self.settings.focus_mode = true;
            self.settings.focus_lock = true;
            self.save_settings().await?;
            log::info!("Focus lock restored for the running session");
        }
        Ok(())
    }

    /// Focus lock only holds while a session is active
    async fn release_lock_if_idle(&mut self) -> Result<()> {
        if self.settings.focus_lock && !self.sessions.is_active() {
            self.settings.focus_lock = false;
            self.save_settings().await?;
            log::info!("Focus lock released");
        }
        Ok(())
    }

    async fn save_settings(&self) -> Result<()> {
        self.store.save(keys::SETTINGS, &self.settings).await
    }
}
