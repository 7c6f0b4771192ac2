use super::*;
use crate::ai_classifier::CachedAiClassifier;
use crate::testing::{online_ai, ScriptedAi};
use chrono::{Duration, TimeZone};
use guardian_storage::{CategoryRule, SessionExtras};
use std::sync::Mutex;

/// In-memory quota bookkeeping standing in for the session manager
struct QuotaGrants {
    quota: u32,
    extras: Mutex<SessionExtras>,
}

impl QuotaGrants {
    fn new(quota: u32) -> Self {
        Self {
            quota,
            extras: Mutex::new(SessionExtras::default()),
        }
    }

    fn used(&self, session_id: &str) -> usize {
        self.extras.lock().unwrap().granted(session_id).len()
    }
}

#[async_trait]
impl ExtraDomainGrant for QuotaGrants {
    async fn grant(&self, session_id: &str, hostname: &str) -> Result<bool> {
        Ok(self
            .extras
            .lock()
            .unwrap()
            .try_grant(session_id, hostname, self.quota)
            .0)
    }
}

struct BrokenGrants;

#[async_trait]
impl ExtraDomainGrant for BrokenGrants {
    async fn grant(&self, _session_id: &str, _hostname: &str) -> Result<bool> {
        Err(anyhow::anyhow!("store offline"))
    }
}

struct FixedClassifier(AiVerdict);

#[async_trait]
impl DistractionClassifier for FixedClassifier {
    async fn classify(
        &self,
        _url: &str,
        _hostname: &str,
        _page: Option<&PageMetadata>,
    ) -> Result<AiVerdict, guardian_ai::AiError> {
        Ok(self.0)
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 12, 14, 0, 0).unwrap()
}

fn engine() -> PolicyEngine {
    PolicyEngine::new(
        vec![String::from("tue.video.yuja.com")],
        RelevanceClassifier::Keyword,
        0.5,
    )
    .unwrap()
}

fn empty_settings() -> GuardianSettings {
    GuardianSettings {
        blocked_sites: Vec::new(),
        allowed_sites: Vec::new(),
        ..GuardianSettings::default()
    }
}

fn session(domains: &[&str], max_extra: u32) -> FocusSession {
    FocusSession {
        id: String::from("sess_test"),
        name: String::from("Study"),
        allowed_domains: domains.iter().map(ToString::to_string).collect(),
        allowed_metadata: AllowedMetadata::default(),
        max_extra_domains: max_extra,
        started_at: now(),
        end_time: now() + Duration::minutes(25),
    }
}

fn ctx<'a>(
    hostname: &'a str,
    settings: &'a GuardianSettings,
    bypass: &'a BypassTable,
) -> PolicyContext<'a> {
    PolicyContext {
        hostname,
        url: hostname,
        page: None,
        session: None,
        bypass,
        settings,
        local_time: None,
        now: now(),
        ai_available: false,
    }
}

fn page(title: &str) -> PageMetadata {
    PageMetadata {
        title: title.to_string(),
        ..PageMetadata::default()
    }
}

fn topics(title: &[&str]) -> AllowedMetadata {
    AllowedMetadata {
        title_includes: title.iter().map(ToString::to_string).collect(),
        ..AllowedMetadata::default()
    }
}

// ============================================================================
// Hard exemption and allow-list
// ============================================================================

#[tokio::test]
async fn test_hard_exemption_beats_session_whitelist() {
    let mut settings = empty_settings();
    settings.blocked_sites = vec![String::from("yuja.com")];
    let bypass = BypassTable::default();
    let s = session(&["canvas.tue.nl"], 0);
    let mut c = ctx("tue.video.yuja.com", &settings, &bypass);
    c.session = Some(&s);

    let verdict = engine().evaluate(&c, &QuotaGrants::new(0), None).await;
    assert!(verdict.allow);
    assert!(matches!(verdict.reason, VerdictReason::HardExemption(_)));
}

#[tokio::test]
async fn test_hard_exemption_matches_url() {
    let settings = empty_settings();
    let bypass = BypassTable::default();
    let s = session(&["canvas.tue.nl"], 0);
    let mut c = ctx("player.example", &settings, &bypass);
    c.url = "https://player.example/embed?src=https://tue.video.yuja.com/v/1";
    c.session = Some(&s);

    assert!(engine().evaluate(&c, &QuotaGrants::new(0), None).await.allow);
}

#[tokio::test]
async fn test_allow_list_beats_session_and_block_list() {
    let mut settings = empty_settings();
    settings.allowed_sites = vec![String::from("github.com")];
    settings.blocked_sites = vec![String::from("github.com")];
    let bypass = BypassTable::default();
    let s = session(&["canvas.tue.nl"], 0);
    let mut c = ctx("github.com", &settings, &bypass);
    c.session = Some(&s);

    let verdict = engine().evaluate(&c, &QuotaGrants::new(0), None).await;
    assert_eq!(
        verdict,
        PolicyVerdict::allow(VerdictReason::AllowListed(String::from("github.com")))
    );
}

// ============================================================================
// Session whitelist and extra-domain quota
// ============================================================================

#[tokio::test]
async fn test_whitelisted_domain_never_gets_whitelist_block() {
    let settings = empty_settings();
    let bypass = BypassTable::default();
    let s = session(&["canvas.tue.nl", "tue.nl"], 0);
    for host in ["canvas.tue.nl", "www.tue.nl", "oase.tue.nl.proxy.example"] {
        let mut c = ctx(host, &settings, &bypass);
        c.session = Some(&s);
        let verdict = engine().evaluate(&c, &QuotaGrants::new(0), None).await;
        assert_ne!(verdict.reason, VerdictReason::NotInSessionWhitelist, "{host}");
    }
}

#[tokio::test]
async fn test_extra_domain_quota_scenario() {
    let settings = empty_settings();
    let bypass = BypassTable::default();
    let s = session(&["canvas.tue.nl"], 1);
    let grants = QuotaGrants::new(1);
    let engine = engine();

    let mut first = ctx("stackoverflow.com", &settings, &bypass);
    first.session = Some(&s);
    assert!(engine.evaluate(&first, &grants, None).await.allow);
    assert_eq!(grants.used("sess_test"), 1);

    let mut second = ctx("github.com", &settings, &bypass);
    second.session = Some(&s);
    assert_eq!(
        engine.evaluate(&second, &grants, None).await,
        PolicyVerdict::block(VerdictReason::NotInSessionWhitelist)
    );

    // The granted host keeps working without consuming more quota
    assert!(engine.evaluate(&first, &grants, None).await.allow);
    assert_eq!(grants.used("sess_test"), 1);
}

#[tokio::test]
async fn test_session_match_does_not_skip_block_list() {
    let mut settings = empty_settings();
    settings.blocked_sites = vec![String::from("youtube.com")];
    let bypass = BypassTable::default();
    let s = session(&["youtube.com"], 0);
    let mut c = ctx("www.youtube.com", &settings, &bypass);
    c.session = Some(&s);

    let verdict = engine().evaluate(&c, &QuotaGrants::new(0), None).await;
    assert!(!verdict.allow);
    assert!(matches!(verdict.reason, VerdictReason::ExplicitlyBlocked(_)));
}

#[tokio::test]
async fn test_session_mismatch_beats_bypass() {
    let settings = empty_settings();
    let mut bypass = BypassTable::default();
    bypass.grant("reddit.com", now() + Duration::minutes(5));
    let s = session(&["canvas.tue.nl"], 0);
    let mut c = ctx("reddit.com", &settings, &bypass);
    c.session = Some(&s);

    assert!(!engine().evaluate(&c, &QuotaGrants::new(0), None).await.allow);
}

#[tokio::test]
async fn test_grant_failure_admits() {
    let settings = empty_settings();
    let bypass = BypassTable::default();
    let s = session(&["canvas.tue.nl"], 0);
    let mut c = ctx("docs.rs", &settings, &bypass);
    c.session = Some(&s);

    assert!(engine().evaluate(&c, &BrokenGrants, None).await.allow);
}

// ============================================================================
// Bypass and block-list
// ============================================================================

#[tokio::test]
async fn test_block_list_matches_subdomain() {
    let mut settings = empty_settings();
    settings.blocked_sites = vec![String::from("youtube.com")];
    let bypass = BypassTable::default();

    let verdict = engine()
        .evaluate(&ctx("www.youtube.com", &settings, &bypass), &QuotaGrants::new(0), None)
        .await;
    assert!(!verdict.allow);
    assert!(verdict.reason.to_string().contains("blocked"));
}

#[tokio::test]
async fn test_bypass_window_then_block_list() {
    let mut settings = empty_settings();
    settings.blocked_sites = vec![String::from("example.com")];
    let mut bypass = BypassTable::default();
    bypass.grant("example.com", now() + Duration::minutes(5));
    let engine = engine();

    let verdict = engine
        .evaluate(&ctx("example.com", &settings, &bypass), &QuotaGrants::new(0), None)
        .await;
    assert_eq!(verdict, PolicyVerdict::allow(VerdictReason::BypassActive));

    let mut later = ctx("example.com", &settings, &bypass);
    later.now = now() + Duration::minutes(6);
    let verdict = engine.evaluate(&later, &QuotaGrants::new(0), None).await;
    assert_eq!(
        verdict,
        PolicyVerdict::block(VerdictReason::ExplicitlyBlocked(String::from("example.com")))
    );
}

// ============================================================================
// Time-gated categories
// ============================================================================

#[tokio::test]
async fn test_category_window_overrides_block_list() {
    let mut settings = empty_settings();
    settings.blocked_sites = vec![String::from("netflix.com")];
    settings.category_rules = CategoryRule::default_table();
    let bypass = BypassTable::default();
    let engine = engine();

    let mut early = ctx("www.netflix.com", &settings, &bypass);
    early.local_time = ClockTime::new(4, 15);
    assert!(engine.evaluate(&early, &QuotaGrants::new(0), None).await.allow);

    let mut noon = ctx("www.netflix.com", &settings, &bypass);
    noon.local_time = ClockTime::new(12, 0);
    let verdict = engine.evaluate(&noon, &QuotaGrants::new(0), None).await;
    assert!(!verdict.allow);
    assert_eq!(
        verdict.reason.to_string(),
        "entertainment content blocked outside 03:30-06:00"
    );
}

#[tokio::test]
async fn test_adult_blocked_at_any_time() {
    let mut settings = empty_settings();
    settings.category_rules = CategoryRule::default_table();
    let bypass = BypassTable::default();
    let mut c = ctx("www.xvideos.com", &settings, &bypass);
    c.local_time = ClockTime::new(4, 0);

    let verdict = engine().evaluate(&c, &QuotaGrants::new(0), None).await;
    assert_eq!(
        verdict,
        PolicyVerdict::block(VerdictReason::CategoryBlocked(ContentCategory::Adult, None))
    );
}

// ============================================================================
// Metadata gate
// ============================================================================

#[tokio::test]
async fn test_metadata_gate_blocks_mismatch_in_session() {
    let settings = empty_settings();
    let bypass = BypassTable::default();
    let mut s = session(&["youtube.com"], 0);
    s.allowed_metadata = topics(&["calculus"]);
    let p = page("Top 10 cat fails");
    let mut c = ctx("youtube.com", &settings, &bypass);
    c.session = Some(&s);
    c.page = Some(&p);

    assert_eq!(
        engine().evaluate(&c, &QuotaGrants::new(0), None).await,
        PolicyVerdict::block(VerdictReason::MetadataMismatch)
    );
}

#[tokio::test]
async fn test_metadata_gate_allows_match() {
    let settings = empty_settings();
    let bypass = BypassTable::default();
    let mut s = session(&["youtube.com"], 0);
    s.allowed_metadata = topics(&["calculus"]);
    let p = page("Calculus 1: Limits explained");
    let mut c = ctx("youtube.com", &settings, &bypass);
    c.session = Some(&s);
    c.page = Some(&p);

    assert!(engine().evaluate(&c, &QuotaGrants::new(0), None).await.allow);
}

#[tokio::test]
async fn test_empty_topics_never_block() {
    let mut settings = empty_settings();
    settings.focus_mode = true;
    let bypass = BypassTable::default();
    let s = session(&["youtube.com"], 0);
    let p = page("Top 10 cat fails");
    let mut c = ctx("youtube.com", &settings, &bypass);
    c.session = Some(&s);
    c.page = Some(&p);

    assert!(engine().evaluate(&c, &QuotaGrants::new(0), None).await.allow);
}

#[tokio::test]
async fn test_global_metadata_applies_in_focus_mode() {
    let mut settings = empty_settings();
    settings.focus_mode = true;
    settings.allowed_metadata = topics(&["rust"]);
    let bypass = BypassTable::default();
    let p = page("Celebrity news");
    let mut c = ctx("news.example", &settings, &bypass);
    c.page = Some(&p);

    assert!(!engine().evaluate(&c, &QuotaGrants::new(0), None).await.allow);

    settings.focus_mode = false;
    let mut off = ctx("news.example", &settings, &bypass);
    off.page = Some(&p);
    assert!(engine().evaluate(&off, &QuotaGrants::new(0), None).await.allow);
}

#[tokio::test]
async fn test_session_metadata_overrides_global() {
    let mut settings = empty_settings();
    settings.allowed_metadata = topics(&["celebrity"]);
    let bypass = BypassTable::default();
    let mut s = session(&["news.example"], 0);
    s.allowed_metadata = topics(&["rust"]);
    let p = page("Celebrity news");
    let mut c = ctx("news.example", &settings, &bypass);
    c.session = Some(&s);
    c.page = Some(&p);

    assert!(!engine().evaluate(&c, &QuotaGrants::new(0), None).await.allow);
}

#[tokio::test]
async fn test_chat_query_or_page_text_is_enough() {
    let settings = empty_settings();
    let bypass = BypassTable::default();
    let mut s = session(&["chatgpt.com"], 0);
    s.allowed_metadata = topics(&["thermodynamics"]);
    let engine = engine();

    let mut typing = page("ChatGPT");
    typing.chat_query = Some(String::from("explain thermodynamics entropy"));
    let mut c = ctx("chatgpt.com", &settings, &bypass);
    c.session = Some(&s);
    c.page = Some(&typing);
    assert!(engine.evaluate(&c, &QuotaGrants::new(0), None).await.allow);

    let mut thread = page("ChatGPT");
    thread.text = String::from("Earlier: first law of thermodynamics");
    thread.chat_query = Some(String::from("write a poem"));
    c.page = Some(&thread);
    assert!(engine.evaluate(&c, &QuotaGrants::new(0), None).await.allow);

    let mut off_topic = page("ChatGPT");
    off_topic.chat_query = Some(String::from("best pizza near me"));
    c.page = Some(&off_topic);
    assert!(!engine.evaluate(&c, &QuotaGrants::new(0), None).await.allow);
}

#[test]
fn test_chat_host_pattern() {
    let engine = engine();
    assert!(engine.is_chat_host("chat.openai.com"));
    assert!(engine.is_chat_host("www.perplexity.ai"));
    assert!(!engine.is_chat_host("notclaude.ai"));
    assert!(!engine.is_chat_host("chatgpt.com.evil.example"));
}

// ============================================================================
// AI fallback
// ============================================================================

#[tokio::test]
async fn test_ai_unreachable_fails_open() {
    let settings = empty_settings();
    let bypass = BypassTable::default();
    let ai = online_ai(ScriptedAi::new(vec![Err("connection refused")])).await;
    let classifier = CachedAiClassifier::new(ai, 10);
    let mut c = ctx("random.example", &settings, &bypass);
    c.ai_available = true;

    let verdict = engine()
        .evaluate(&c, &QuotaGrants::new(0), Some(&classifier))
        .await;
    assert!(verdict.allow);
    assert!(matches!(verdict.reason, VerdictReason::AiFailed(_)));
}

#[tokio::test]
async fn test_ai_distracting_blocks() {
    let settings = empty_settings();
    let bypass = BypassTable::default();
    let mut c = ctx("random.example", &settings, &bypass);
    c.ai_available = true;

    let verdict = engine()
        .evaluate(
            &c,
            &QuotaGrants::new(0),
            Some(&FixedClassifier(AiVerdict::Distracting)),
        )
        .await;
    assert_eq!(verdict, PolicyVerdict::block(VerdictReason::AiDistracting));
}

#[tokio::test]
async fn test_ai_skipped_when_unavailable() {
    let settings = empty_settings();
    let bypass = BypassTable::default();
    let c = ctx("random.example", &settings, &bypass);

    let verdict = engine()
        .evaluate(
            &c,
            &QuotaGrants::new(0),
            Some(&FixedClassifier(AiVerdict::Distracting)),
        )
        .await;
    assert_eq!(verdict, PolicyVerdict::allow(VerdictReason::NoRuleMatched));
}

#[tokio::test]
async fn test_bypass_decides_before_ai() {
    let settings = empty_settings();
    let mut bypass = BypassTable::default();
    bypass.grant("random.example", now() + Duration::minutes(5));
    let mut c = ctx("random.example", &settings, &bypass);
    c.ai_available = true;

    let verdict = engine()
        .evaluate(
            &c,
            &QuotaGrants::new(0),
            Some(&FixedClassifier(AiVerdict::Distracting)),
        )
        .await;
    assert!(verdict.allow);
}
