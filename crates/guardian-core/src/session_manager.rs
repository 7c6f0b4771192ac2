use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use guardian_ai::JustificationGate;
use guardian_storage::{
    keys, AllowedMetadata, FocusSession, KeyValueStore, SessionConfig, SessionEvent,
    SessionExtras, SessionHistoryEntry, StoreExt,
};
use std::sync::Arc;

use crate::clock::Clock;
use crate::policy::ExtraDomainGrant;
use crate::scheduler::{ExpiryScheduler, ScheduledExpiry};

/// Grace period after `end_time` before the expiry check runs
const EXPIRY_GRACE_SECS: i64 = 1;

/// Lifecycle state as seen by callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    Active(FocusSession),
}

/// Owns the focus-session state machine.
///
/// `NoSession -> Active -> (expired | stopped) -> NoSession`. The current
/// session is persisted under `current_session`, extra-domain grants under
/// `session_extras`, and every transition is appended to `session_history`.
pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn ExpiryScheduler>,
    gate: JustificationGate,
    current: Option<FocusSession>,
    expiry: Option<ScheduledExpiry>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn ExpiryScheduler>,
        gate: JustificationGate,
    ) -> Self {
        Self {
            store,
            clock,
            scheduler,
            gate,
            current: None,
            expiry: None,
        }
    }

    /// Restore the persisted session, ending it if it expired while we were away
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written
    pub async fn load(&mut self) -> Result<()> {
        self.current = self.store.load(keys::CURRENT_SESSION).await?;
        if let Some(session) = &self.current {
            log::info!("Restored session '{}' ending at {}", session.name, session.end_time);
        }
        self.refresh().await?;
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.active_session()
            .map_or(SessionState::NoSession, |s| SessionState::Active(s.clone()))
    }

    /// The current session if `now < end_time`
    #[must_use]
    pub fn active_session(&self) -> Option<&FocusSession> {
        let now = self.clock.now();
        self.current.as_ref().filter(|s| s.is_active_at(now))
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active_session().is_some()
    }

    /// Start a new session, ending any previous one first.
    ///
    /// `fallback_metadata` is used when the config carries no metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the session or its bookkeeping cannot be persisted
    pub async fn start(
        &mut self,
        config: SessionConfig,
        fallback_metadata: &AllowedMetadata,
    ) -> Result<FocusSession> {
        if self.current.is_some() {
            log::info!("Ending previous session before starting a new one");
            self.end().await?;
        }

        let now = self.clock.now();
        let session = config.into_session(now, fallback_metadata);

        let mut extras: SessionExtras = self.store.load_or_default(keys::SESSION_EXTRAS).await?;
        extras.clear(&session.id);
        self.store.save(keys::SESSION_EXTRAS, &extras).await?;

        self.store.save(keys::CURRENT_SESSION, &session).await?;
        self.record(SessionEvent::Start, &session, now).await?;
        log::info!(
            "Started session '{}' ({} domains) until {}",
            session.name,
            session.allowed_domains.len(),
            session.end_time
        );

        self.current = Some(session.clone());
        self.arm();
        Ok(session)
    }

    /// Re-evaluate expiry: end the session if it is over, otherwise re-arm the timer.
    ///
    /// Returns whether a session is still active.
    ///
    /// # Errors
    ///
    /// Returns an error if ending the session fails to persist
    pub async fn refresh(&mut self) -> Result<bool> {
        if self.is_active() {
            self.arm();
            return Ok(true);
        }
        if self.current.is_some() {
            log::info!("Session expired");
            self.end().await?;
        }
        Ok(false)
    }

    /// Stop early. The justification must pass the same gate as bypass requests.
    ///
    /// Returns `false` (and keeps the session) when the justification is rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if ending the session fails to persist
    pub async fn stop(&mut self, justification: &str) -> Result<bool> {
        if !self.gate.evaluate(justification).await {
            log::info!("Stop request rejected");
            return Ok(false);
        }
        self.end().await?;
        Ok(true)
    }

    /// End the current session unconditionally (no-op without one)
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated
    pub async fn end(&mut self) -> Result<()> {
        if let Some(mut expiry) = self.expiry.take() {
            expiry.cancel();
        }
        let Some(session) = self.current.take() else {
            return Ok(());
        };

        let mut extras: SessionExtras = self.store.load_or_default(keys::SESSION_EXTRAS).await?;
        extras.clear(&session.id);
        self.store.save(keys::SESSION_EXTRAS, &extras).await?;

        self.store.remove(keys::CURRENT_SESSION).await?;
        self.record(SessionEvent::End, &session, self.clock.now()).await?;
        log::info!("Ended session '{}'", session.name);
        Ok(())
    }

    /// Record `hostname` as one of the session's extra domains if the quota allows.
    ///
    /// Idempotent per hostname: a granted hostname never uses a second slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the usage map cannot be read or written
    pub async fn grant_extra_domain(&self, session_id: &str, hostname: &str) -> Result<bool> {
        let quota = self
            .current
            .as_ref()
            .filter(|s| s.id == session_id)
            .map_or(0, |s| s.max_extra_domains);

        let mut extras: SessionExtras = self.store.load_or_default(keys::SESSION_EXTRAS).await?;
        let (allowed, recorded) = extras.try_grant(session_id, hostname, quota);
        if recorded {
            self.store.save(keys::SESSION_EXTRAS, &extras).await?;
            log::info!(
                "Extra domain {hostname} granted ({}/{quota})",
                extras.granted(session_id).len()
            );
        }
        Ok(allowed)
    }

    /// Extra domains granted to the current session
    ///
    /// # Errors
    ///
    /// Returns an error if the usage map cannot be read
    pub async fn extra_domains_used(&self) -> Result<Vec<String>> {
        let Some(session) = &self.current else {
            return Ok(Vec::new());
        };
        let extras: SessionExtras = self.store.load_or_default(keys::SESSION_EXTRAS).await?;
        Ok(extras.granted(&session.id).to_vec())
    }

    /// # Errors
    ///
    /// Returns an error if the history cannot be read
    pub async fn history(&self) -> Result<Vec<SessionHistoryEntry>> {
        self.store.load_or_default(keys::SESSION_HISTORY).await
    }

    async fn record(
        &self,
        event: SessionEvent,
        session: &FocusSession,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let entry = SessionHistoryEntry {
            event,
            name: session.name.clone(),
            timestamp,
            end_time: Some(session.end_time),
            allowed_domains: session.allowed_domains.clone(),
        };
        self.store
            .append_capped(keys::SESSION_HISTORY, entry, None)
            .await
    }

    fn arm(&mut self) {
        let Some(session) = &self.current else {
            return;
        };
        let deadline = session.end_time + Duration::seconds(EXPIRY_GRACE_SECS);
        // Replacing the handle cancels the previous timer
        self.expiry = Some(self.scheduler.schedule(deadline));
    }
}

#[async_trait]
impl ExtraDomainGrant for SessionManager {
    async fn grant(&self, session_id: &str, hostname: &str) -> Result<bool> {
        self.grant_extra_domain(session_id, hostname).await
    }
}
