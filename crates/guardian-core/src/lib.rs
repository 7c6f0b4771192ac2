pub mod ai_classifier;
pub mod bypass;
pub mod clock;
pub mod commands;
pub mod config;
pub mod content_filter;
pub mod error;
pub mod guardian;
pub mod policy;
pub mod scheduler;
pub mod session_manager;
pub mod time_provider;

#[cfg(test)]
mod testing;

pub use ai_classifier::{CachedAiClassifier, DistractionClassifier};
pub use bypass::BypassLedger;
pub use clock::{Clock, SystemClock};
pub use commands::{GuardianCommand, GuardianResponse, GuardianStatus, SessionStatus};
pub use config::{get_data_dir, GuardianConfig};
pub use error::GuardianError;
pub use guardian::{BlockSink, Guardian, GuardianDeps};
pub use policy::{ExtraDomainGrant, PolicyContext, PolicyEngine, PolicyVerdict, VerdictReason};
pub use scheduler::{ExpiryScheduler, ScheduledExpiry, TokioScheduler};
pub use session_manager::{SessionManager, SessionState};
pub use time_provider::{default_sources, TimeProvider, TimeSource};
