use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use guardian_storage::{keys, BypassTable, KeyValueStore, StoreExt};
use std::sync::Arc;

use crate::clock::Clock;

/// Longest single bypass grant (one day)
pub const MAX_BYPASS_MINUTES: i64 = 24 * 60;

/// Persisted hostname -> expiry table for temporary exemptions
pub struct BypassLedger {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    grant_minutes: i64,
}

impl BypassLedger {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, grant_minutes: i64) -> Self {
        Self {
            store,
            clock,
            grant_minutes: grant_minutes.clamp(1, MAX_BYPASS_MINUTES),
        }
    }

    #[must_use]
    pub fn grant_minutes(&self) -> i64 {
        self.grant_minutes
    }

    /// Snapshot of the table. Expired entries are kept and read as inactive.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored table cannot be read
    pub async fn table(&self) -> Result<BypassTable> {
        self.store.load_or_default(keys::BYPASS_ALLOW_MAP).await
    }

    /// Grant `hostname` access for the configured number of minutes
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be persisted
    pub async fn grant(&self, hostname: &str) -> Result<DateTime<Utc>> {
        let until = self.clock.now() + Duration::minutes(self.grant_minutes);
        let mut table = self.table().await?;
        table.grant(hostname, until);
        self.store.save(keys::BYPASS_ALLOW_MAP, &table).await?;
        log::info!("Bypass granted for {hostname} until {until}");
        Ok(until)
    }

    /// # Errors
    ///
    /// Returns an error if the stored table cannot be read
    pub async fn is_active(&self, hostname: &str) -> Result<bool> {
        Ok(self.table().await?.is_active(hostname, self.clock.now()))
    }
}
