//! Storage keys shared by every component that reads or writes the store.

pub const SETTINGS: &str = "settings";
pub const CURRENT_SESSION: &str = "current_session";
pub const SESSION_EXTRAS: &str = "session_extras";
pub const BYPASS_ALLOW_MAP: &str = "bypass_allow_map";
pub const SESSION_HISTORY: &str = "session_history";
pub const BLOCKED_EVENTS: &str = "blocked_events";
pub const AI_CONFIG: &str = "ai_config";
pub const TIME_CACHE: &str = "time_cache";
