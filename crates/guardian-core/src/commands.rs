//! Closed command surface exposed to the UI layer.

use chrono::{DateTime, Utc};
use guardian_storage::{
    BlockEvent, FocusSession, GuardianSettings, PageMetadata, SessionConfig,
    SessionHistoryEntry, SettingsPatch,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum GuardianCommand {
    StartSession {
        session: SessionConfig,
    },
    StopSession {
        justification: String,
    },
    RequestBypass {
        hostname: String,
        justification: String,
    },
    UpdateSettings {
        settings: SettingsPatch,
    },
    GetSettings,
    GetStatus,
    AnalyzeContent {
        url: String,
        data: PageMetadata,
    },
    CheckApiStatus,
    GetZoneTime,
    GetSessionHistory,
    GetBlockedEvents,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GuardianResponse {
    SessionStarted {
        session: FocusSession,
    },
    SessionStopped {
        success: bool,
    },
    Bypass {
        approved: bool,
        hostname: String,
        until: Option<DateTime<Utc>>,
        minutes: i64,
    },
    SettingsUpdated {
        settings: GuardianSettings,
    },
    Settings {
        settings: GuardianSettings,
    },
    Status(GuardianStatus),
    #[serde(rename_all = "camelCase")]
    Analysis {
        should_block: bool,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    ApiStatus {
        working: bool,
        last_check: Option<DateTime<Utc>>,
    },
    ZoneTime {
        zone: String,
        hour: u32,
        minute: u32,
    },
    SessionHistory {
        entries: Vec<SessionHistoryEntry>,
    },
    BlockedEvents {
        events: Vec<BlockEvent>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub id: String,
    pub name: String,
    pub allowed_domains: Vec<String>,
    pub end_time: DateTime<Utc>,
    pub remaining_ms: i64,
    pub max_extra_domains: u32,
    pub extra_domains_used: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianStatus {
    pub enabled: bool,
    pub focus_mode: bool,
    pub focus_lock: bool,
    pub session: Option<SessionStatus>,
    pub ai_available: bool,
    pub blocked_sites: usize,
    pub allowed_sites: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_wire_format() {
        let command: GuardianCommand = serde_json::from_value(json!({
            "action": "startSession",
            "session": {"name": "Canvas", "allowedDomains": ["canvas.tue.nl"], "durationMin": 50}
        }))
        .unwrap();
        match command {
            GuardianCommand::StartSession { session } => {
                assert_eq!(session.effective_duration_minutes(), 50);
                assert_eq!(session.allowed_domains, vec![String::from("canvas.tue.nl")]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_partial_settings_update() {
        let command: GuardianCommand = serde_json::from_value(json!({
            "action": "updateSettings",
            "settings": {"focusMode": true}
        }))
        .unwrap();
        let GuardianCommand::UpdateSettings { settings } = command else {
            panic!("expected updateSettings");
        };
        assert_eq!(settings.focus_mode, Some(true));
        assert!(settings.blocked_sites.is_none());
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result: Result<GuardianCommand, _> =
            serde_json::from_value(json!({"action": "selfDestruct"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_response_tagging() {
        let value = serde_json::to_value(GuardianResponse::Analysis {
            should_block: true,
            reason: String::from("explicitly blocked site (youtube.com)"),
        })
        .unwrap();
        assert_eq!(value["type"], "analysis");
        assert_eq!(value["shouldBlock"], true);
    }
}
