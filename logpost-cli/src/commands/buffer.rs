//! `logpost buffer` command handler

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use logpost_core::config::LogpostConfig;
use logpost_spool::{BufferStats, DurableBuffer};

use crate::cli::{BufferAction, BufferArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `buffer` command.
pub async fn execute(
    args: BufferArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        BufferAction::Status { path } => {
            let path = match path {
                Some(path) => path,
                None => LogpostConfig::load(config_path).await?.buffer_path(),
            };
            let report = status(&path).await?;
            writer.render(&report)?;
            Ok(())
        }
    }
}

/// Read buffer statistics without disturbing a running daemon's leases.
///
/// # Errors
///
/// Returns `CliError::BufferUnavailable` if the file does not exist or is not
/// a buffer database.
pub async fn status(path: &Path) -> Result<BufferStatusReport, CliError> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(CliError::BufferUnavailable(format!(
            "{} does not exist",
            path.display()
        )));
    }

    info!(path = %path.display(), "reading durable buffer");
    let buffer = DurableBuffer::open_read_only(path).await?;
    let stats = buffer.stats().await?;
    Ok(BufferStatusReport::new(path.to_path_buf(), stats, Utc::now()))
}

/// Buffer status report.
#[derive(Debug, Serialize)]
pub struct BufferStatusReport {
    pub path: PathBuf,
    pub pending: u64,
    pub in_flight: u64,
    pub backlog: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_age_secs: Option<i64>,
    pub delivered_total: u64,
    pub expired_total: u64,
    pub evicted_total: u64,
}

impl BufferStatusReport {
    fn new(path: PathBuf, stats: BufferStats, now: DateTime<Utc>) -> Self {
        Self {
            path,
            pending: stats.pending,
            in_flight: stats.in_flight,
            backlog: stats.backlog(),
            oldest_enqueued_at: stats.oldest_enqueued_at,
            oldest_age_secs: stats
                .oldest_enqueued_at
                .map(|at| (now - at).num_seconds().max(0)),
            delivered_total: stats.delivered_total,
            expired_total: stats.expired_total,
            evicted_total: stats.evicted_total,
        }
    }
}

impl Render for BufferStatusReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Durable buffer: {}", self.path.display().to_string().bold())?;
        writeln!(w)?;
        writeln!(w, "{:<12} {}", "Status", "Entries")?;
        writeln!(w, "{}", "-".repeat(24))?;
        writeln!(w, "{:<12} {}", "pending", self.pending)?;
        writeln!(w, "{:<12} {}", "in_flight", self.in_flight)?;
        writeln!(w)?;

        match (&self.oldest_enqueued_at, self.oldest_age_secs) {
            (Some(at), Some(age)) => {
                writeln!(w, "Oldest entry: {} ({}s ago)", at.to_rfc3339(), age)?;
            }
            _ => writeln!(w, "Oldest entry: {}", "none".green())?,
        }

        writeln!(
            w,
            "Totals: delivered={} expired={} evicted={}",
            self.delivered_total, self.expired_total, self.evicted_total
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_report_computes_backlog_and_age() {
        let now = Utc::now();
        let stats = BufferStats {
            pending: 3,
            in_flight: 2,
            oldest_enqueued_at: Some(now - Duration::seconds(90)),
            delivered_total: 10,
            expired_total: 1,
            evicted_total: 0,
        };

        let report = BufferStatusReport::new(PathBuf::from("/var/lib/logpost/buffer.db"), stats, now);

        assert_eq!(report.backlog, 5);
        assert_eq!(report.oldest_age_secs, Some(90));
    }

    #[test]
    fn test_empty_buffer_renders_none() {
        let report = BufferStatusReport::new(
            PathBuf::from("buffer.db"),
            BufferStats::default(),
            Utc::now(),
        );

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("pending"));
        assert!(output.contains("none"));

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("oldest_enqueued_at").is_none());
        assert_eq!(json["backlog"], 0);
    }
}
