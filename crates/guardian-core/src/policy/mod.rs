//! Allow/block decision for a navigation or page.
//!
//! Rules run in a fixed order and the first one that decides wins:
//!
//! 1. hard exemption (URL or hostname)
//! 2. allowed sites
//! 3. active session: whitelist, else extra-domain quota, else block
//! 4. live bypass grant
//! 5. time-gated content categories, then blocked sites
//! 6. metadata gate (session or focus mode, keyword lists configured)
//! 7. LLM distraction classifier, when reachable
//! 8. allow
//!
//! A session match in rule 3 does not allow by itself; evaluation continues.
//! Every analysis failure resolves to allow.

#[cfg(test)]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guardian_ai::{AiVerdict, RelevanceClassifier, RelevanceVerdict};
use guardian_storage::{
    AllowedMetadata, BypassTable, ClockTime, ContentCategory, FocusSession, GuardianSettings,
    PageMetadata, TimeWindow,
};
use regex::Regex;
use serde::Serialize;
use std::fmt;

use crate::ai_classifier::DistractionClassifier;
use crate::content_filter::{evaluate_categories, CategoryDecision};

/// Chat assistants whose typed query is matched instead of page metadata
const CHAT_HOSTS: &str =
    r"(?i)(^|\.)(chat\.openai\.com|chatgpt\.com|perplexity\.ai|claude\.ai|bard\.google\.com|gemini\.google\.com)$";

/// Records `hostname` as an extra domain of a session if its quota allows
#[async_trait]
pub trait ExtraDomainGrant: Send + Sync {
    async fn grant(&self, session_id: &str, hostname: &str) -> Result<bool>;
}

/// Why a verdict was reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", content = "detail", rename_all = "camelCase")]
pub enum VerdictReason {
    HardExemption(String),
    AllowListed(String),
    NotInSessionWhitelist,
    BypassActive,
    CategoryBlocked(ContentCategory, Option<TimeWindow>),
    CategoryWindow(ContentCategory, TimeWindow),
    ExplicitlyBlocked(String),
    MetadataMismatch,
    AiDistracting,
    AiProductive,
    AiFailed(String),
    NoRuleMatched,
}

impl fmt::Display for VerdictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HardExemption(pattern) => write!(f, "hard exemption ({pattern})"),
            Self::AllowListed(site) => write!(f, "allowed site ({site})"),
            Self::NotInSessionWhitelist => write!(f, "domain not in session whitelist"),
            Self::BypassActive => write!(f, "temporary bypass active"),
            Self::CategoryBlocked(category, None) => write!(f, "{category} content blocked"),
            Self::CategoryBlocked(category, Some(window)) => {
                write!(f, "{category} content blocked outside {window}")
            }
            Self::CategoryWindow(category, window) => {
                write!(f, "{category} content allowed during {window}")
            }
            Self::ExplicitlyBlocked(site) => write!(f, "explicitly blocked site ({site})"),
            Self::MetadataMismatch => write!(f, "content does not match allowed metadata"),
            Self::AiDistracting => write!(f, "AI detected distracting content"),
            Self::AiProductive => write!(f, "AI classified content as productive"),
            Self::AiFailed(e) => write!(f, "AI analysis failed, allowing: {e}"),
            Self::NoRuleMatched => write!(f, "no rule matched"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyVerdict {
    pub allow: bool,
    pub reason: VerdictReason,
}

impl PolicyVerdict {
    #[must_use]
    pub const fn allow(reason: VerdictReason) -> Self {
        Self {
            allow: true,
            reason,
        }
    }

    #[must_use]
    pub const fn block(reason: VerdictReason) -> Self {
        Self {
            allow: false,
            reason,
        }
    }
}

/// Everything one evaluation looks at
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    pub hostname: &'a str,
    pub url: &'a str,
    pub page: Option<&'a PageMetadata>,
    /// Only an active session; expired sessions must not be passed
    pub session: Option<&'a FocusSession>,
    pub bypass: &'a BypassTable,
    pub settings: &'a GuardianSettings,
    /// Wall-clock time in the configured zone, needed by windowed category rules
    pub local_time: Option<ClockTime>,
    pub now: DateTime<Utc>,
    pub ai_available: bool,
}

fn contains_entry<'s>(hostname: &str, entries: &'s [String]) -> Option<&'s str> {
    entries
        .iter()
        .map(String::as_str)
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .find(|e| hostname.contains(&e.to_lowercase()))
}

pub struct PolicyEngine {
    exemptions: Vec<String>,
    relevance: RelevanceClassifier,
    relevance_threshold: f32,
    chat_hosts: Regex,
}

impl PolicyEngine {
    /// # Errors
    ///
    /// Returns an error if the chat-host pattern fails to compile
    pub fn new(
        exemptions: Vec<String>,
        relevance: RelevanceClassifier,
        relevance_threshold: f32,
    ) -> Result<Self> {
        Ok(Self {
            exemptions: exemptions
                .into_iter()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            relevance,
            relevance_threshold,
            chat_hosts: Regex::new(CHAT_HOSTS)?,
        })
    }

    #[must_use]
    pub fn is_chat_host(&self, hostname: &str) -> bool {
        self.chat_hosts.is_match(hostname)
    }

    /// Evaluate the rules in priority order. Never fails; faults allow.
    pub async fn evaluate(
        &self,
        ctx: &PolicyContext<'_>,
        grants: &dyn ExtraDomainGrant,
        classifier: Option<&dyn DistractionClassifier>,
    ) -> PolicyVerdict {
        let verdict = self.decide(ctx, grants, classifier).await;
        log::debug!(
            "{} -> {} ({})",
            ctx.hostname,
            if verdict.allow { "allow" } else { "block" },
            verdict.reason
        );
        verdict
    }

    async fn decide(
        &self,
        ctx: &PolicyContext<'_>,
        grants: &dyn ExtraDomainGrant,
        classifier: Option<&dyn DistractionClassifier>,
    ) -> PolicyVerdict {
        let hostname = ctx.hostname.to_lowercase();
        let url = ctx.url.to_lowercase();

        if let Some(pattern) = self
            .exemptions
            .iter()
            .find(|p| hostname.contains(p.as_str()) || url.contains(p.as_str()))
        {
            return PolicyVerdict::allow(VerdictReason::HardExemption(pattern.clone()));
        }

        if let Some(site) = contains_entry(&hostname, &ctx.settings.allowed_sites) {
            return PolicyVerdict::allow(VerdictReason::AllowListed(site.to_string()));
        }

        if let Some(session) = ctx.session {
            if !self.session_admits(session, &hostname, grants).await {
                return PolicyVerdict::block(VerdictReason::NotInSessionWhitelist);
            }
        }

        if ctx.bypass.is_active(&hostname, ctx.now) {
            return PolicyVerdict::allow(VerdictReason::BypassActive);
        }

        match evaluate_categories(&ctx.settings.category_rules, &url, &hostname, ctx.local_time) {
            Some(CategoryDecision::Block(category)) => {
                let window = ctx
                    .settings
                    .category_rules
                    .iter()
                    .find(|r| r.category == category)
                    .and_then(|r| r.window);
                return PolicyVerdict::block(VerdictReason::CategoryBlocked(category, window));
            }
            Some(CategoryDecision::Allow(category, window)) => {
                return PolicyVerdict::allow(VerdictReason::CategoryWindow(category, window));
            }
            None => {}
        }

        if let Some(site) = contains_entry(&hostname, &ctx.settings.blocked_sites) {
            return PolicyVerdict::block(VerdictReason::ExplicitlyBlocked(site.to_string()));
        }

        if let Some(relevance) = self.metadata_gate(ctx, &hostname).await {
            if !relevance.relevant {
                log::debug!("Metadata gate: {}", relevance.reason);
                return PolicyVerdict::block(VerdictReason::MetadataMismatch);
            }
        }

        if ctx.ai_available {
            if let Some(classifier) = classifier {
                return match classifier.classify(ctx.url, &hostname, ctx.page).await {
                    Ok(AiVerdict::Distracting) => {
                        PolicyVerdict::block(VerdictReason::AiDistracting)
                    }
                    Ok(AiVerdict::Productive) => PolicyVerdict::allow(VerdictReason::AiProductive),
                    Err(e) => {
                        log::warn!("AI classification of {hostname} failed, allowing: {e}");
                        PolicyVerdict::allow(VerdictReason::AiFailed(e.to_string()))
                    }
                };
            }
        }

        PolicyVerdict::allow(VerdictReason::NoRuleMatched)
    }

    /// Whitelist match, or a granted extra domain. A failing grant store admits.
    async fn session_admits(
        &self,
        session: &FocusSession,
        hostname: &str,
        grants: &dyn ExtraDomainGrant,
    ) -> bool {
        if session.allows_domain(hostname) {
            return true;
        }
        match grants.grant(&session.id, hostname).await {
            Ok(granted) => granted,
            Err(e) => {
                log::warn!("Extra-domain lookup for {hostname} failed, allowing: {e:#}");
                true
            }
        }
    }

    /// Session metadata when any list is set, else the global lists
    fn effective_metadata<'a>(ctx: &PolicyContext<'a>) -> &'a AllowedMetadata {
        match ctx.session {
            Some(session) if !session.allowed_metadata.is_empty() => &session.allowed_metadata,
            _ => &ctx.settings.allowed_metadata,
        }
    }

    /// `None` when the gate does not apply to this context
    async fn metadata_gate(
        &self,
        ctx: &PolicyContext<'_>,
        hostname: &str,
    ) -> Option<RelevanceVerdict> {
        if ctx.session.is_none() && !ctx.settings.focus_mode {
            return None;
        }
        let page = ctx.page?;
        let allowed = Self::effective_metadata(ctx);
        if allowed.is_empty() {
            return None;
        }

        if self.is_chat_host(hostname) {
            let topics = allowed.all_keywords();
            let query = page.chat_query.as_deref().unwrap_or_default();
            let page_text = format!("{} {}", page.title, page.text);
            let baseline = guardian_ai::relevance::chat_relevance(&topics, query, &page_text);
            if baseline.relevant {
                return Some(baseline);
            }
            let combined = format!("{query} {page_text}");
            return Some(
                self.relevance
                    .is_relevant(&combined, &topics, self.relevance_threshold)
                    .await,
            );
        }

        Some(
            self.relevance
                .matches_metadata(allowed, page, self.relevance_threshold)
                .await,
        )
    }
}
