//! `logpost status` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use logpost_core::config::LogpostConfig;

use crate::cli::StatusArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `status` command.
pub async fn execute(
    args: StatusArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = LogpostConfig::load(config_path).await?;
    let report = build_status_report(&config, args.verbose).await;
    writer.render(&report)?;
    Ok(())
}

/// Assemble the status report from configuration, the PID file and the buffer.
pub async fn build_status_report(config: &LogpostConfig, verbose: bool) -> StatusReport {
    let daemon_pid = running_pid(&config.general.pid_file);

    let details = |text: String| verbose.then_some(text);
    let modules = vec![
        ModuleStatus {
            name: "collector".to_owned(),
            enabled: config.collector.enabled,
            details: details(format!(
                "client_id={}, sources={}, processors={}",
                config.sealing.client_id,
                config.collector.sources.len(),
                config.collector.processors.len()
            )),
        },
        ModuleStatus {
            name: "transport".to_owned(),
            enabled: config.transport.enabled,
            details: details(format!("endpoint={}", config.transport.endpoint)),
        },
        ModuleStatus {
            name: "intake".to_owned(),
            enabled: config.intake.enabled,
            details: details(format!(
                "bind_addr={}, clients={}",
                config.intake.bind_addr,
                config.intake.clients.len()
            )),
        },
    ];

    let buffer_backlog = if config.collector.enabled || config.transport.enabled {
        match super::buffer::status(&config.buffer_path()).await {
            Ok(report) => Some(report.backlog),
            Err(e) => {
                debug!(error = %e, "buffer not readable");
                None
            }
        }
    } else {
        None
    };

    StatusReport {
        daemon_running: daemon_pid.is_some(),
        pid: daemon_pid,
        buffer_backlog,
        modules,
    }
}

/// PID recorded in `pid_file`, if that process is alive.
fn running_pid(pid_file: &str) -> Option<u32> {
    if pid_file.is_empty() {
        return None;
    }

    let content = match std::fs::read_to_string(pid_file) {
        Ok(content) => content,
        Err(e) => {
            debug!(pid_file, error = %e, "pid file not readable");
            return None;
        }
    };

    let pid = match content.trim().parse::<u32>() {
        Ok(pid) => pid,
        Err(e) => {
            warn!(pid_file, error = %e, "failed to parse pid");
            return None;
        }
    };

    is_process_alive(pid).then_some(pid)
}

/// Check if a process with the given PID is alive.
#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };

    // SAFETY: kill(2) with signal 0 performs only the existence and permission check
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        return true;
    }
    // EPERM: the process exists but belongs to another user
    std::io::Error::last_os_error().kind() == std::io::ErrorKind::PermissionDenied
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    warn!("process liveness check not supported on this platform");
    false
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub daemon_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_backlog: Option<u64>,
    pub modules: Vec<ModuleStatus>,
}

#[derive(Debug, Serialize)]
pub struct ModuleStatus {
    pub name: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Render for StatusReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match self.pid {
            Some(pid) => writeln!(w, "Daemon: {} (pid {})", "running".green().bold(), pid)?,
            None => writeln!(w, "Daemon: {}", "not running".red().bold())?,
        }
        if let Some(backlog) = self.buffer_backlog {
            writeln!(w, "Buffer backlog: {}", backlog)?;
        }

        writeln!(w)?;
        writeln!(w, "{:<12} Enabled", "Component")?;
        writeln!(w, "{}", "-".repeat(24))?;

        for m in &self.modules {
            let enabled = if m.enabled { "yes".green() } else { "no".yellow() };
            writeln!(w, "{:<12} {}", m.name, enabled)?;
            if let Some(details) = &m.details {
                writeln!(w, "  {}", details.dimmed())?;
            }
        }

        Ok(())
    }
}
