//! Long-running mode: navigations arrive on stdin, expiry ticks on a channel.

use anyhow::Result;
use guardian_core::{SystemClock, TokioScheduler};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::helpers::open_guardian;

/// `<url>` or `<tab> <url>`; blank lines and `#` comments are skipped
fn parse_navigation(line: &str) -> Option<(u64, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match line.split_once(char::is_whitespace) {
        Some((tab, url)) => match tab.parse::<u64>() {
            Ok(tab) => Some((tab, url.trim())),
            Err(_) => Some((0, line)),
        },
        None => Some((0, line)),
    }
}

pub async fn run_command() -> Result<()> {
    let (ticks_tx, mut ticks) = tokio::sync::mpsc::unbounded_channel();
    let scheduler = TokioScheduler::new(Arc::new(SystemClock), ticks_tx);
    let mut guardian = open_guardian(Arc::new(scheduler)).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    log::info!("Guardian running; reading navigations from stdin");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    log::info!("stdin closed, shutting down");
                    break;
                };
                if let Some((tab, url)) = parse_navigation(&line) {
                    match guardian.on_navigate(tab, url).await {
                        Some(verdict) if verdict.allow => {
                            println!("ALLOW [tab {tab}] {url}: {}", verdict.reason);
                        }
                        Some(_) => {}
                        None => log::debug!("Ignored {url}"),
                    }
                }
            }
            Some(deadline) = ticks.recv() => {
                log::debug!("Expiry check due at {deadline}");
                guardian.on_expiry_tick().await;
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Received Ctrl-C, shutting down...");
                break;
            }
        }
    }
    Ok(())
}
