use anyhow::{bail, Result};
use clap::{Subcommand, ValueEnum};
use guardian_core::{GuardianCommand, GuardianResponse};
use guardian_storage::{CategoryRule, GuardianSettings, SettingsPatch};

use super::helpers::{ok_response, open_oneshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Print current settings as JSON
    Show,
    /// Add a site to the block list
    Block { site: String },
    /// Add a site to the allow list
    Allow { site: String },
    /// Global focus mode (metadata gate without a session)
    Focus { state: Toggle },
    /// Turn the guardian on or off
    Enable { state: Toggle },
    /// Time-gated categories (adult always, entertainment outside 03:30-06:00)
    Categories { state: Toggle },
}

/// Append `site` unless an equal entry exists; `None` when unchanged
fn with_site(list: &[String], site: &str) -> Option<Vec<String>> {
    let site = site.trim().to_lowercase();
    if site.is_empty() || list.iter().any(|s| s.eq_ignore_ascii_case(&site)) {
        return None;
    }
    let mut updated = list.to_vec();
    updated.push(site);
    Some(updated)
}

fn patch_for(action: &SettingsAction, current: &GuardianSettings) -> Option<SettingsPatch> {
    let patch = match action {
        SettingsAction::Show => return None,
        SettingsAction::Block { site } => SettingsPatch {
            blocked_sites: Some(with_site(&current.blocked_sites, site)?),
            ..SettingsPatch::default()
        },
        SettingsAction::Allow { site } => SettingsPatch {
            allowed_sites: Some(with_site(&current.allowed_sites, site)?),
            ..SettingsPatch::default()
        },
        SettingsAction::Focus { state } => SettingsPatch {
            focus_mode: Some(state.is_on()),
            ..SettingsPatch::default()
        },
        SettingsAction::Enable { state } => SettingsPatch {
            enabled: Some(state.is_on()),
            ..SettingsPatch::default()
        },
        SettingsAction::Categories { state } => SettingsPatch {
            category_rules: Some(if state.is_on() {
                CategoryRule::default_table()
            } else {
                Vec::new()
            }),
            ..SettingsPatch::default()
        },
    };
    Some(patch)
}

pub async fn handle_settings_command(action: SettingsAction) -> Result<()> {
    let mut guardian = open_oneshot().await?;
    let current = guardian.settings().clone();

    if matches!(action, SettingsAction::Show) {
        println!("{}", serde_json::to_string_pretty(&current)?);
        return Ok(());
    }

    let Some(patch) = patch_for(&action, &current) else {
        println!("Nothing to change");
        return Ok(());
    };
    if current.focus_lock && guardian.sessions().is_active() {
        log::warn!("Focus lock is on; changing settings during a session");
    }
    match ok_response(guardian.handle(GuardianCommand::UpdateSettings { settings: patch }).await)? {
        GuardianResponse::SettingsUpdated { .. } => {
            println!("Settings updated");
            Ok(())
        }
        other => bail!("unexpected response: {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_adds_normalized_site_once() {
        let settings = GuardianSettings::default();
        let patch = patch_for(
            &SettingsAction::Block {
                site: String::from(" Reddit.com "),
            },
            &settings,
        )
        .unwrap();
        let blocked = patch.blocked_sites.unwrap();
        assert_eq!(blocked.last().map(String::as_str), Some("reddit.com"));
        assert!(patch.allowed_sites.is_none());

        let duplicate = patch_for(
            &SettingsAction::Block {
                site: String::from("youtube.com"),
            },
            &settings,
        );
        assert!(duplicate.is_none());
    }

    #[test]
    fn test_categories_toggle() {
        let settings = GuardianSettings::default();
        let on = patch_for(&SettingsAction::Categories { state: Toggle::On }, &settings).unwrap();
        assert_eq!(on.category_rules.unwrap().len(), 2);
        let off = patch_for(&SettingsAction::Categories { state: Toggle::Off }, &settings).unwrap();
        assert!(off.category_rules.unwrap().is_empty());
    }

    #[test]
    fn test_show_has_no_patch() {
        assert!(patch_for(&SettingsAction::Show, &GuardianSettings::default()).is_none());
    }
}
