pub mod db;
pub mod keys;
pub mod migrations;
pub mod models;
pub mod store;

pub use db::Database;
pub use models::{
    AiConfig, AiProvider, AllowedMetadata, BlockEvent, BypassTable, CategoryRule, ClockTime,
    ContentCategory, FocusSession, GuardianSettings, PageMetadata, SessionConfig, SessionEvent,
    SessionExtras, SessionHistoryEntry, SettingsPatch, TimeCache, TimeWindow,
};
pub use store::{KeyValueStore, MemoryStore, StoreExt};
