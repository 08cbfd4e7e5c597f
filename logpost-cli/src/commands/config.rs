//! `logpost config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use logpost_core::config::LogpostConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const REDACTED: &str = "***REDACTED***";

/// Section names accepted by `config show --section`.
pub const SECTIONS: &[&str] = &[
    "general",
    "collector",
    "sealing",
    "buffer",
    "transport",
    "intake",
    "metrics",
];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => {
            let report = validate(config_path).await;
            writer.render(&report)?;
            if !report.valid {
                return Err(CliError::Config("configuration is invalid".to_owned()));
            }
            Ok(())
        }
        ConfigAction::Show { section } => {
            let report = show(config_path, section.as_deref()).await?;
            writer.render(&report)?;
            Ok(())
        }
    }
}

/// Load, apply environment overrides and validate the file at `config_path`.
///
/// Never fails: problems are reported inside the returned report.
pub async fn validate(config_path: &Path) -> ConfigValidationReport {
    info!(path = %config_path.display(), "validating configuration");

    let errors = match LogpostConfig::load(config_path).await {
        Ok(_) => Vec::new(),
        Err(e) => vec![e.to_string()],
    };

    ConfigValidationReport {
        source: config_path.display().to_string(),
        valid: errors.is_empty(),
        errors,
    }
}

/// Build the effective configuration report, with secrets redacted.
///
/// # Errors
///
/// Returns `CliError::Core` if loading fails or `CliError::Command` if the
/// section name is unknown.
pub async fn show(config_path: &Path, section: Option<&str>) -> Result<ConfigReport, CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let mut config = LogpostConfig::load(config_path).await?;
    redact_secrets(&mut config);

    let config_toml = match section {
        None => to_toml(&config),
        Some("general") => to_toml(&config.general),
        Some("collector") => to_toml(&config.collector),
        Some("sealing") => to_toml(&config.sealing),
        Some("buffer") => to_toml(&config.buffer),
        Some("transport") => to_toml(&config.transport),
        Some("intake") => to_toml(&config.intake),
        Some("metrics") => to_toml(&config.metrics),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {} (expected: {})",
                other,
                SECTIONS.join(", ")
            )));
        }
    };

    Ok(ConfigReport {
        source: config_path.display().to_string(),
        section: section.map(str::to_owned),
        config_toml,
    })
}

fn to_toml<T: Serialize>(value: &T) -> String {
    toml::to_string_pretty(value).unwrap_or_else(|e| format!("(serialization error: {})", e))
}

/// Replace bearer tokens with a placeholder. Empty values stay empty so an
/// unset token is still visible as unset.
fn redact_secrets(config: &mut LogpostConfig) {
    redact(&mut config.transport.bearer_token);
    for client in &mut config.intake.clients {
        redact(&mut client.token);
    }
}

fn redact(value: &mut String) {
    if !value.is_empty() {
        *value = REDACTED.to_owned();
    }
}

/// Configuration display report.
///
/// The `config_toml` field is skipped during JSON serialization (only used for text rendering).
#[derive(Debug, Serialize)]
pub struct ConfigReport {
    /// Configuration file path
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Serialized TOML configuration (with redacted secrets)
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{}]", section);
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Debug, Serialize)]
pub struct ConfigValidationReport {
    /// Configuration file path
    pub source: String,
    /// Whether the configuration is valid
    pub valid: bool,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(report: &impl Render) -> String {
        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");
        String::from_utf8(buffer).expect("valid UTF-8")
    }

    #[test]
    fn test_config_report_render_text_specific_section() {
        let report = ConfigReport {
            source: "/etc/logpost/logpost.toml".to_owned(),
            section: Some("transport".to_owned()),
            config_toml: "endpoint = \"https://intake\"".to_owned(),
        };

        let output = render(&report);
        assert!(output.contains("[transport]"), "should show section name");
        assert!(output.contains("endpoint"), "should show config content");
    }

    #[test]
    fn test_config_report_json_skips_toml_body() {
        let report = ConfigReport {
            source: "test.toml".to_owned(),
            section: None,
            config_toml: "enabled = true".to_owned(),
        };

        let parsed = serde_json::to_value(&report).expect("JSON serialization should succeed");
        assert_eq!(parsed["source"].as_str(), Some("test.toml"));
        assert!(parsed.get("section").is_none());
        assert!(parsed.get("config_toml").is_none());
    }

    #[test]
    fn test_config_validation_report_invalid_lists_errors() {
        let report = ConfigValidationReport {
            source: "bad.toml".to_owned(),
            valid: false,
            errors: vec!["transport.endpoint: must not be empty".to_owned()],
        };

        let output = render(&report);
        assert!(output.contains("INVALID"));
        assert!(output.contains("transport.endpoint"));
    }

    #[test]
    fn test_redact_secrets_keeps_empty_tokens_empty() {
        let mut config = LogpostConfig::default();
        config.transport.bearer_token = "s3cret".to_owned();
        config.intake.clients = vec![
            logpost_core::config::IntakeClient {
                client_id: "edge-01".to_owned(),
                token: "t0ken".to_owned(),
            },
            logpost_core::config::IntakeClient {
                client_id: "edge-02".to_owned(),
                token: String::new(),
            },
        ];

        redact_secrets(&mut config);

        assert_eq!(config.transport.bearer_token, REDACTED);
        assert_eq!(config.intake.clients[0].token, REDACTED);
        assert!(config.intake.clients[1].token.is_empty());
        assert_eq!(config.intake.clients[0].client_id, "edge-01");
    }
}
