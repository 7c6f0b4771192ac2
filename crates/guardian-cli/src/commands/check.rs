use anyhow::{bail, Result};
use guardian_core::{GuardianCommand, GuardianResponse};
use guardian_storage::PageMetadata;
use tabled::{Table, Tabled};

use super::helpers::{format_time, ok_response, open_oneshot, truncate_str};

#[derive(Tabled)]
struct BlockRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Host")]
    hostname: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Page metadata from CLI flags; `None` when no flag was given
#[must_use]
pub fn page_from_flags(
    title: Option<String>,
    description: Option<String>,
    keywords: Option<String>,
    query: Option<String>,
    text: Option<String>,
) -> Option<PageMetadata> {
    if title.is_none()
        && description.is_none()
        && keywords.is_none()
        && query.is_none()
        && text.is_none()
    {
        return None;
    }
    Some(PageMetadata {
        title: title.unwrap_or_default(),
        description: description.unwrap_or_default(),
        keywords: keywords.unwrap_or_default(),
        text: text.unwrap_or_default(),
        chat_query: query,
    })
}

pub async fn check_command(url: &str, page: Option<PageMetadata>) -> Result<()> {
    let mut guardian = open_oneshot().await?;

    if let Some(data) = page {
        let response = ok_response(
            guardian
                .handle(GuardianCommand::AnalyzeContent {
                    url: url.to_string(),
                    data,
                })
                .await,
        )?;
        match response {
            GuardianResponse::Analysis {
                should_block,
                reason,
            } => println!("{} {url}: {reason}", if should_block { "BLOCK" } else { "ALLOW" }),
            other => bail!("unexpected response: {other:?}"),
        }
        return Ok(());
    }

    match guardian.on_navigate(0, url).await {
        Some(verdict) if verdict.allow => println!("ALLOW {url}: {}", verdict.reason),
        // The console sink already printed the block
        Some(_) => {}
        None => println!("SKIP  {url}: not evaluated"),
    }
    Ok(())
}

pub async fn bypass_command(hostname: &str, reason: &str) -> Result<()> {
    let mut guardian = open_oneshot().await?;
    let response = ok_response(
        guardian
            .handle(GuardianCommand::RequestBypass {
                hostname: hostname.to_string(),
                justification: reason.to_string(),
            })
            .await,
    )?;
    match response {
        GuardianResponse::Bypass {
            approved: true,
            hostname,
            until: Some(until),
            minutes,
        } => println!(
            "Bypass approved for {hostname} ({minutes} min, until {})",
            format_time(until)
        ),
        GuardianResponse::Bypass { hostname, .. } => {
            println!("Bypass for {hostname} denied: give a study or work reason (20+ characters)");
        }
        other => bail!("unexpected response: {other:?}"),
    }
    Ok(())
}

pub async fn time_command() -> Result<()> {
    let mut guardian = open_oneshot().await?;
    match ok_response(guardian.handle(GuardianCommand::GetZoneTime).await)? {
        GuardianResponse::ZoneTime { zone, hour, minute } => {
            println!("{zone}: {hour:02}:{minute:02}");
            Ok(())
        }
        other => bail!("unexpected response: {other:?}"),
    }
}

pub async fn blocked_command(limit: usize) -> Result<()> {
    let mut guardian = open_oneshot().await?;
    let GuardianResponse::BlockedEvents { events } =
        ok_response(guardian.handle(GuardianCommand::GetBlockedEvents).await)?
    else {
        bail!("unexpected response to blocked events request");
    };

    if events.is_empty() {
        println!("No blocks recorded");
        return Ok(());
    }

    let rows: Vec<BlockRow> = events
        .iter()
        .rev()
        .take(limit)
        .map(|e| BlockRow {
            time: format_time(e.timestamp),
            hostname: e.hostname.clone(),
            reason: truncate_str(&e.reason, 60),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_flags_means_navigation() {
        assert!(page_from_flags(None, None, None, None, None).is_none());
    }

    #[test]
    fn test_flags_build_page() {
        let page = page_from_flags(
            Some(String::from("ChatGPT")),
            None,
            None,
            Some(String::from("explain entropy")),
            None,
        )
        .unwrap();
        assert_eq!(page.title, "ChatGPT");
        assert_eq!(page.chat_query.as_deref(), Some("explain entropy"));
        assert!(page.description.is_empty());
    }
}
