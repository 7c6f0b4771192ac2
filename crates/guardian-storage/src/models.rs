use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Default session length when none (or zero) is requested
pub const DEFAULT_SESSION_MINUTES: i64 = 25;

/// Longest session accepted (one week)
pub const MAX_SESSION_MINUTES: i64 = 7 * 24 * 60;

/// Keyword lists matched against page metadata.
///
/// OR semantics across lists and within a list. An empty list never
/// contributes a "no match"; it is simply skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedMetadata {
    #[serde(default)]
    pub title_includes: Vec<String>,
    #[serde(default)]
    pub description_includes: Vec<String>,
    #[serde(default)]
    pub keywords_includes: Vec<String>,
}

impl AllowedMetadata {
    /// True when no keyword is configured in any list
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title_includes.is_empty()
            && self.description_includes.is_empty()
            && self.keywords_includes.is_empty()
    }

    /// Lowercase and trim every keyword, dropping blanks
    #[must_use]
    pub fn normalized(self) -> Self {
        fn clean(list: Vec<String>) -> Vec<String> {
            list.into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect()
        }
        Self {
            title_includes: clean(self.title_includes),
            description_includes: clean(self.description_includes),
            keywords_includes: clean(self.keywords_includes),
        }
    }

    /// Every keyword from every list, deduplicated in first-seen order
    #[must_use]
    pub fn all_keywords(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for k in self
            .title_includes
            .iter()
            .chain(&self.description_includes)
            .chain(&self.keywords_includes)
        {
            if !out.contains(k) {
                out.push(k.clone());
            }
        }
        out
    }
}

/// Page metadata extracted by the content side
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: String,
    /// Visible text preview
    #[serde(default)]
    pub text: String,
    /// Text currently typed into a chat assistant's input box
    #[serde(default)]
    pub chat_query: Option<String>,
}

/// An active focus period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub id: String,
    pub name: String,
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub allowed_metadata: AllowedMetadata,
    #[serde(default)]
    pub max_extra_domains: u32,
    pub started_at: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl FocusSession {
    /// A session is active iff `now < end_time`
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.end_time
    }

    /// Time left before expiry, zero once expired
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.end_time - now).max(Duration::zero())
    }

    /// Whether the hostname is covered by the session whitelist (suffix or substring)
    #[must_use]
    pub fn allows_domain(&self, hostname: &str) -> bool {
        self.allowed_domains
            .iter()
            .filter(|d| !d.is_empty())
            .any(|d| hostname.ends_with(d.as_str()) || hostname.contains(d.as_str()))
    }
}

/// Request to start a focus session (from the UI or a preset)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub allowed_metadata: Option<AllowedMetadata>,
    #[serde(default)]
    pub max_extra_domains: Option<u32>,
    #[serde(default, alias = "durationMin")]
    pub duration_minutes: Option<i64>,
}

impl SessionConfig {
    /// Missing or zero duration means the default; anything else is clamped to `1..=MAX_SESSION_MINUTES`
    #[must_use]
    pub fn effective_duration_minutes(&self) -> i64 {
        match self.duration_minutes {
            None | Some(0) => DEFAULT_SESSION_MINUTES,
            Some(m) => m.clamp(1, MAX_SESSION_MINUTES),
        }
    }

    /// Build the session this config describes, starting at `now`.
    ///
    /// `fallback_metadata` is used when the config carries no metadata of its own.
    #[must_use]
    pub fn into_session(self, now: DateTime<Utc>, fallback_metadata: &AllowedMetadata) -> FocusSession {
        let minutes = self.effective_duration_minutes();
        FocusSession {
            id: self
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("sess_{}", Uuid::new_v4().simple())),
            name: self
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| String::from("Focus Session")),
            allowed_domains: self
                .allowed_domains
                .into_iter()
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            allowed_metadata: self
                .allowed_metadata
                .unwrap_or_else(|| fallback_metadata.clone())
                .normalized(),
            max_extra_domains: self.max_extra_domains.unwrap_or(0),
            started_at: now,
            end_time: now + Duration::minutes(minutes),
        }
    }
}

/// Extra-domain grants per session id. Sets only grow for a session's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionExtras(pub HashMap<String, Vec<String>>);

impl SessionExtras {
    /// Hostnames already granted for the session, in grant order
    #[must_use]
    pub fn granted(&self, session_id: &str) -> &[String] {
        self.0.get(session_id).map_or(&[], Vec::as_slice)
    }

    /// Grant `hostname` under `quota`. Idempotent per hostname.
    ///
    /// Returns `(allowed, newly_recorded)`.
    pub fn try_grant(&mut self, session_id: &str, hostname: &str, quota: u32) -> (bool, bool) {
        let used = self.0.entry(session_id.to_string()).or_default();
        if used.iter().any(|h| h == hostname) {
            return (true, false);
        }
        if used.len() < quota as usize {
            used.push(hostname.to_string());
            return (true, true);
        }
        (false, false)
    }

    /// Forget every grant recorded for the session
    pub fn clear(&mut self, session_id: &str) {
        self.0.remove(session_id);
    }
}

/// Temporary per-hostname exemptions. Stale entries are left in place and read as expired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BypassTable(pub HashMap<String, DateTime<Utc>>);

impl BypassTable {
    /// A bypass is live iff its expiry is strictly after `now`
    #[must_use]
    pub fn is_active(&self, hostname: &str, now: DateTime<Utc>) -> bool {
        self.0.get(hostname).is_some_and(|until| *until > now)
    }

    pub fn grant(&mut self, hostname: &str, until: DateTime<Utc>) {
        self.0.insert(hostname.to_string(), until);
    }

    #[must_use]
    pub fn expiry(&self, hostname: &str) -> Option<DateTime<Utc>> {
        self.0.get(hostname).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionEvent {
    Start,
    End,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::End => write!(f, "end"),
        }
    }
}

/// Audit record of a session transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistoryEntry {
    pub event: SessionEvent,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
}

/// Block applied to a tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEvent {
    pub hostname: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Wall-clock time of day (hour 0-23, minute 0-59)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClockTime {
    pub hour: u32,
    pub minute: u32,
}

impl ClockTime {
    /// Returns `None` when the fields are out of range
    #[must_use]
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    #[must_use]
    pub const fn minutes_since_midnight(&self) -> u32 {
        self.hour * 60 + self.minute
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Half-open daily window `[start, end)`. A window whose end precedes its start wraps midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl TimeWindow {
    #[must_use]
    pub const fn new(start: ClockTime, end: ClockTime) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn contains(&self, time: ClockTime) -> bool {
        let t = time.minutes_since_midnight();
        let start = self.start.minutes_since_midnight();
        let end = self.end.minutes_since_midnight();
        if start <= end {
            t >= start && t < end
        } else {
            t >= start || t < end
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Content categories recognised by URL/hostname keyword detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    Entertainment,
    Adult,
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entertainment => write!(f, "entertainment"),
            Self::Adult => write!(f, "adult"),
        }
    }
}

/// `window = None` means always blocked; otherwise blocked outside the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: ContentCategory,
    pub window: Option<TimeWindow>,
}

impl CategoryRule {
    /// Adult content is never exempted; entertainment is allowed 03:30-06:00
    #[must_use]
    pub fn default_table() -> Vec<Self> {
        vec![
            Self {
                category: ContentCategory::Adult,
                window: None,
            },
            Self {
                category: ContentCategory::Entertainment,
                window: Some(TimeWindow::new(
                    ClockTime { hour: 3, minute: 30 },
                    ClockTime { hour: 6, minute: 0 },
                )),
            },
        ]
    }
}

/// User-configured guardian settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianSettings {
    pub enabled: bool,
    pub blocked_sites: Vec<String>,
    pub allowed_sites: Vec<String>,
    pub focus_mode: bool,
    pub focus_lock: bool,
    #[serde(default)]
    pub allowed_metadata: AllowedMetadata,
    #[serde(default)]
    pub category_rules: Vec<CategoryRule>,
}

impl Default for GuardianSettings {
    fn default() -> Self {
        let blocked = [
            "sflix.to", "netflix.com", "youtube.com", "facebook.com", "instagram.com",
            "tiktok.com", "123movies", "putlocker", "soap2day", "gomovies", "fmovies",
            "hulu.com", "disneyplus.com", "hbomax.com", "peacock.com", "paramountplus.com",
            "crunchyroll.com", "pornhub.com", "xhamster.com", "xvideos.com", "redtube.com",
        ];
        let allowed = [
            "stackoverflow.com",
            "github.com",
            "developer.mozilla.org",
            "coursera.org",
            "khan-academy.org",
        ];
        Self {
            enabled: true,
            blocked_sites: blocked.iter().map(ToString::to_string).collect(),
            allowed_sites: allowed.iter().map(ToString::to_string).collect(),
            focus_mode: false,
            focus_lock: false,
            allowed_metadata: AllowedMetadata::default(),
            category_rules: Vec::new(),
        }
    }
}

impl GuardianSettings {
    /// Apply a partial update; absent fields keep their value
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(v) = patch.enabled {
            self.enabled = v;
        }
        if let Some(v) = patch.blocked_sites {
            self.blocked_sites = v;
        }
        if let Some(v) = patch.allowed_sites {
            self.allowed_sites = v;
        }
        if let Some(v) = patch.focus_mode {
            self.focus_mode = v;
        }
        if let Some(v) = patch.focus_lock {
            self.focus_lock = v;
        }
        if let Some(v) = patch.allowed_metadata {
            self.allowed_metadata = v.normalized();
        }
        if let Some(v) = patch.category_rules {
            self.category_rules = v;
        }
    }
}

/// Partial settings update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub enabled: Option<bool>,
    pub blocked_sites: Option<Vec<String>>,
    pub allowed_sites: Option<Vec<String>>,
    pub focus_mode: Option<bool>,
    pub focus_lock: Option<bool>,
    pub allowed_metadata: Option<AllowedMetadata>,
    pub category_rules: Option<Vec<CategoryRule>>,
}

/// Cached zone time from a remote provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeCache {
    pub zone: String,
    pub time: ClockTime,
    pub fetched_at: DateTime<Utc>,
}

/// Chat-completion provider family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    Groq,
    OpenAi,
}

impl AiProvider {
    #[must_use]
    pub fn parse_provider(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Some(Self::Groq),
            "openai" | "open_ai" => Some(Self::OpenAi),
            _ => None,
        }
    }

    #[must_use]
    pub const fn default_model(&self) -> &'static str {
        match self {
            Self::Groq => "llama3-8b-8192",
            Self::OpenAi => "gpt-4o-mini",
        }
    }

    #[must_use]
    pub const fn default_base_url(&self) -> &'static str {
        match self {
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::OpenAi => "https://api.openai.com/v1",
        }
    }

    #[must_use]
    pub const fn api_key_env(&self) -> &'static str {
        match self {
            Self::Groq => "GROQ_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Groq => write!(f, "groq"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

/// LLM classifier configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiConfig {
    pub provider: AiProvider,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub enabled: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: AiProvider::default(),
            model: None,
            api_key: None,
            base_url: None,
            enabled: true,
        }
    }
}

impl AiConfig {
    #[must_use]
    pub fn effective_model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Stored key first, then the provider's environment variable
    #[must_use]
    pub fn effective_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(self.provider.api_key_env()).ok())
            .filter(|k| !k.is_empty())
    }

    #[must_use]
    pub fn effective_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }
}
