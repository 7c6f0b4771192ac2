//! Current wall-clock time in a named zone.
//!
//! Remote providers are tried in order, each failure falling through to the
//! next. When all fail the injected clock is converted to the zone locally, and
//! if the zone name is unknown the machine's local hour is used.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use guardian_storage::{keys, ClockTime, KeyValueStore, StoreExt, TimeCache};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::GuardianError;

/// A remote "current time in zone" service
#[async_trait]
pub trait TimeSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, zone: Tz) -> Result<ClockTime, GuardianError>;
}

fn clock_time_of<T: TimeZone>(dt: &DateTime<T>) -> ClockTime {
    ClockTime {
        hour: dt.hour(),
        minute: dt.minute(),
    }
}

fn parse_iso_in_zone(text: &str, zone: Tz) -> Result<ClockTime, GuardianError> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(text) {
        return Ok(clock_time_of(&with_offset.with_timezone(&zone)));
    }
    // No offset: the provider already reports wall time in the requested zone
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| ClockTime {
            hour: naive.hour(),
            minute: naive.minute(),
        })
        .map_err(|e| GuardianError::Parse(format!("bad datetime '{text}': {e}")))
}

/// Accept either explicit `hour`/`minute` fields, an ISO datetime, or a unix timestamp
///
/// # Errors
///
/// Returns [`GuardianError::Parse`] when none of the known shapes is present
pub fn parse_time_payload(payload: &Value, zone: Tz) -> Result<ClockTime, GuardianError> {
    if let Some(hour) = payload.get("hour").and_then(Value::as_u64) {
        let minute = payload.get("minute").and_then(Value::as_u64).unwrap_or(0);
        return u32::try_from(hour)
            .ok()
            .zip(u32::try_from(minute).ok())
            .and_then(|(h, m)| ClockTime::new(h, m))
            .ok_or_else(|| GuardianError::Parse(format!("hour/minute out of range: {hour}:{minute}")));
    }

    for key in ["dateTime", "datetime"] {
        if let Some(text) = payload.get(key).and_then(Value::as_str) {
            return parse_iso_in_zone(text, zone);
        }
    }

    if let Some(secs) = payload.get("unixtime").and_then(Value::as_i64) {
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .map(|utc| clock_time_of(&utc.with_timezone(&zone)))
            .ok_or_else(|| GuardianError::Parse(format!("bad unixtime {secs}")));
    }

    Err(GuardianError::Parse(String::from("unrecognized time payload")))
}

async fn fetch_json(client: &Client, url: &str) -> Result<Value, GuardianError> {
    let payload = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<Value>()
        .await?;
    Ok(payload)
}

/// timeapi.io (`hour`/`minute` fields, `dateTime` without offset)
pub struct TimeApiIo {
    client: Client,
    base_url: String,
}

impl TimeApiIo {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: String::from("https://timeapi.io"),
        }
    }
}

#[async_trait]
impl TimeSource for TimeApiIo {
    fn name(&self) -> &str {
        "timeapi.io"
    }

    async fn fetch(&self, zone: Tz) -> Result<ClockTime, GuardianError> {
        let url = format!(
            "{}/api/Time/current/zone?timeZone={}",
            self.base_url,
            zone.name()
        );
        parse_time_payload(&fetch_json(&self.client, &url).await?, zone)
    }
}

/// worldtimeapi.org (`datetime` with offset, `unixtime`)
pub struct WorldTimeApi {
    client: Client,
    base_url: String,
}

impl WorldTimeApi {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: String::from("https://worldtimeapi.org"),
        }
    }
}

#[async_trait]
impl TimeSource for WorldTimeApi {
    fn name(&self) -> &str {
        "worldtimeapi"
    }

    async fn fetch(&self, zone: Tz) -> Result<ClockTime, GuardianError> {
        let url = format!("{}/api/timezone/{}", self.base_url, zone.name());
        parse_time_payload(&fetch_json(&self.client, &url).await?, zone)
    }
}

/// The default remote chain, sharing one HTTP client with a request timeout
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built
pub fn default_sources(timeout_ms: u64) -> Result<Vec<Box<dyn TimeSource>>> {
    let client = Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()?;
    Ok(vec![
        Box::new(TimeApiIo::new(client.clone())),
        Box::new(WorldTimeApi::new(client)),
    ])
}

pub struct TimeProvider {
    sources: Vec<Box<dyn TimeSource>>,
    clock: Arc<dyn Clock>,
    cache: Option<(Arc<dyn KeyValueStore>, chrono::Duration)>,
}

impl TimeProvider {
    #[must_use]
    pub fn new(sources: Vec<Box<dyn TimeSource>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sources,
            clock,
            cache: None,
        }
    }

    /// Reuse remote results for `ttl`, persisted in `store`
    #[must_use]
    pub fn with_cache(mut self, store: Arc<dyn KeyValueStore>, ttl: chrono::Duration) -> Self {
        if ttl > chrono::Duration::zero() {
            self.cache = Some((store, ttl));
        }
        self
    }

    /// Hour `[0, 23]` in `zone_name`
    pub async fn current_hour_in_zone(&self, zone_name: &str) -> u32 {
        self.current_time_in_zone(zone_name).await.hour
    }

    /// Hour and minute in `zone_name`. Never fails.
    pub async fn current_time_in_zone(&self, zone_name: &str) -> ClockTime {
        let now = self.clock.now();
        let Ok(zone) = zone_name.parse::<Tz>() else {
            log::warn!("Unknown time zone '{zone_name}', using local hour");
            return clock_time_of(&now.with_timezone(&Local));
        };

        if let Some(cached) = self.cached(zone_name, now).await {
            return cached;
        }

        for source in &self.sources {
            match source.fetch(zone).await {
                Ok(time) => {
                    log::debug!("Time in {zone_name} from {}: {time}", source.name());
                    self.remember(zone_name, time, now).await;
                    return time;
                }
                Err(e) => {
                    log::warn!("Time provider {} failed, trying next: {e}", source.name());
                }
            }
        }

        let local = clock_time_of(&now.with_timezone(&zone));
        log::debug!("Time in {zone_name} from local clock: {local}");
        local
    }

    async fn cached(&self, zone_name: &str, now: DateTime<Utc>) -> Option<ClockTime> {
        let (store, ttl) = self.cache.as_ref()?;
        let entry: TimeCache = match store.load(keys::TIME_CACHE).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Ignoring unreadable time cache: {e:#}");
                return None;
            }
        };
        let age = now - entry.fetched_at;
        if entry.zone != zone_name || age < chrono::Duration::zero() || age >= *ttl {
            return None;
        }
        // Advance the cached wall time by the time elapsed since it was fetched
        let elapsed = u32::try_from(age.num_minutes()).unwrap_or(0);
        let minutes = (entry.time.minutes_since_midnight() + elapsed) % (24 * 60);
        ClockTime::new(minutes / 60, minutes % 60)
    }

    async fn remember(&self, zone_name: &str, time: ClockTime, now: DateTime<Utc>) {
        let Some((store, _)) = &self.cache else {
            return;
        };
        let entry = TimeCache {
            zone: zone_name.to_string(),
            time,
            fetched_at: now,
        };
        if let Err(e) = store.save(keys::TIME_CACHE, &entry).await {
            log::warn!("Failed to cache zone time: {e:#}");
        }
    }
}
