//! CLI output handling.
//!
//! Progress events arrive on the hub event channel and are rendered on
//! stderr so stdout stays clean for command results (plain text or JSON).

use std::io::{self, Write};

use anyhow::Result;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::events::HubEvent;
use crate::hub::{FileEntry, RepoDescriptor};

/// Drain `event_rx` until every sender is gone.
pub async fn run_event_loop(
    mut event_rx: mpsc::UnboundedReceiver<HubEvent>,
    json_mode: bool,
) -> Result<()> {
    while let Some(event) = event_rx.recv().await {
        if let Some(line) = render_event(&event, json_mode)? {
            eprintln!("{}", line);
        }
    }
    Ok(())
}

/// One stderr line for `event`, or `None` if the event is not shown.
pub fn render_event(event: &HubEvent, json_mode: bool) -> Result<Option<String>> {
    if json_mode {
        return Ok(Some(serde_json::to_string(event)?));
    }

    let line = match event {
        HubEvent::RetryScheduled {
            path,
            attempt,
            max_retries,
            delay_ms,
            reason,
        } => format!(
            "[retry] {}/{} for {} in {}ms ({})",
            attempt,
            max_retries,
            truncate(path, 60),
            delay_ms,
            reason
        ),
        HubEvent::RetryExhausted {
            path,
            attempts,
            reason,
        } => format!(
            "[retry] Gave up on {} after {} attempts: {}",
            truncate(path, 60),
            attempts,
            reason
        ),
        HubEvent::CommitStarted {
            repo,
            branch,
            operations,
        } => format!("[commit] {}@{}: {} operation(s)", repo, branch, operations),
        HubEvent::LfsUploadCompleted { path, size } => {
            format!("[lfs] Uploaded {} ({})", path, format_size(*size))
        }
        HubEvent::DownloadProgress {
            path,
            downloaded,
            total,
        } => format!(
            "[download] {}: {} / {}",
            truncate(path, 60),
            format_size(*downloaded),
            total.map(format_size).unwrap_or_else(|| "?".to_string())
        ),
        HubEvent::CommitFailed { error, .. } => format!("[commit] Failed: {}", error),
        // The command result reports these
        HubEvent::CommitCompleted { .. } | HubEvent::CacheInvalidated { .. } => return Ok(None),
    };
    Ok(Some(line))
}

/// Print `value` as one JSON document on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    io::stdout().flush()?;
    Ok(())
}

pub fn repo_line(repo: &RepoDescriptor) -> String {
    let star = if repo.is_favorite { "*" } else { " " };
    let modified = repo
        .last_modified
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{} {:<48} {:<8} {:>8} dl {:>6} likes  {}",
        star,
        repo.id.as_str(),
        repo.visibility.to_string(),
        repo.downloads,
        repo.likes,
        modified
    )
}

pub fn file_line(entry: &FileEntry) -> String {
    let lfs = if entry.is_lfs { " (lfs)" } else { "" };
    format!("{:>10}  {}{}", format_size(entry.size_bytes), entry.path, lfs)
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Truncate a string to a maximum length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
