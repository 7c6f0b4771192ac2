use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::bypass::MAX_BYPASS_MINUTES;
use crate::error::GuardianError;

/// Get the local data directory for guardian.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_data_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
    path.push("guardian");
    Ok(path)
}

/// Static configuration read from `config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardianConfig {
    /// IANA zone used for time-gated rules
    pub time_zone: String,
    /// How long a remote zone time is reused; 0 disables the cache
    pub time_cache_secs: u64,
    pub time_request_timeout_ms: u64,
    /// URL/hostname fragments exempt from every rule
    pub hard_exemptions: Vec<String>,
    pub bypass_minutes: i64,
    pub ai_verdict_cache_size: usize,
    /// Minimum LLM relevance score for the metadata gate
    pub relevance_threshold: f32,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            time_zone: String::from("Europe/Amsterdam"),
            time_cache_secs: 300,
            time_request_timeout_ms: 3500,
            hard_exemptions: vec![String::from("tue.video.yuja.com")],
            bypass_minutes: 5,
            ai_verdict_cache_size: 100,
            relevance_threshold: 0.5,
        }
    }
}

impl GuardianConfig {
    /// Load from `path`; a missing file yields the defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or validated
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `<data_dir>/config.toml`
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory is unknown or the file is invalid
    pub fn load_default() -> Result<Self> {
        Self::load(&get_data_dir()?.join("config.toml"))
    }

    /// # Errors
    ///
    /// Returns [`GuardianError::InvalidConfig`] describing the first bad field
    pub fn validate(&self) -> Result<(), GuardianError> {
        if self.time_zone.parse::<Tz>().is_err() {
            return Err(GuardianError::InvalidConfig(format!(
                "unknown time zone '{}'",
                self.time_zone
            )));
        }
        if !(1..=MAX_BYPASS_MINUTES).contains(&self.bypass_minutes) {
            return Err(GuardianError::InvalidConfig(format!(
                "bypass_minutes must be within 1..={MAX_BYPASS_MINUTES}"
            )));
        }
        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            return Err(GuardianError::InvalidConfig(String::from(
                "relevance_threshold must be within 0.0..=1.0",
            )));
        }
        Ok(())
    }
}
