//! `logpost seal` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use logpost_core::envelope::{Envelope, FORMAT_VERSION};
use logpost_seal::Algorithm;

use crate::cli::{SealAction, SealArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `seal` command.
pub async fn execute(args: SealArgs, writer: &OutputWriter) -> Result<(), CliError> {
    match args.action {
        SealAction::Inspect { envelope } => {
            let report = inspect(&envelope).await?;
            writer.render(&report)?;
            Ok(())
        }
    }
}

/// Decode the header of an envelope file. The payload stays sealed.
pub async fn inspect(path: &Path) -> Result<EnvelopeReport, CliError> {
    let bytes = tokio::fs::read(path).await?;
    let envelope = Envelope::from_json(&bytes)
        .map_err(|e| CliError::Seal(format!("{}: not an envelope: {}", path.display(), e)))?;
    Ok(EnvelopeReport::from_envelope(path, &envelope))
}

/// Envelope header summary.
#[derive(Debug, Serialize)]
pub struct EnvelopeReport {
    pub source: String,
    pub client_id: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub version: u32,
    pub version_supported: bool,
    pub algorithm: String,
    pub algorithm_supported: bool,
    pub compressed: bool,
    pub nonce_len: usize,
    pub payload_len: usize,
    pub content_hash: String,
}

impl EnvelopeReport {
    fn from_envelope(path: &Path, envelope: &Envelope) -> Self {
        Self {
            source: path.display().to_string(),
            client_id: envelope.client_id.clone(),
            timestamp: envelope.created_at,
            created_at: chrono::DateTime::from_timestamp(envelope.created_at, 0)
                .map(|t| t.to_rfc3339()),
            version: envelope.format_version,
            version_supported: envelope.format_version == FORMAT_VERSION,
            algorithm: envelope.algorithm.clone(),
            algorithm_supported: envelope.algorithm.parse::<Algorithm>().is_ok(),
            compressed: envelope.compressed,
            nonce_len: envelope.nonce.len(),
            payload_len: envelope.payload.len(),
            content_hash: envelope.content_hash(),
        }
    }
}

impl Render for EnvelopeReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let flag = |ok: bool| if ok { "ok".green() } else { "unsupported".red() };

        writeln!(w, "Envelope: {}", self.source.bold())?;
        writeln!(w, "  client_id:    {}", self.client_id)?;
        writeln!(
            w,
            "  timestamp:    {} ({})",
            self.timestamp,
            self.created_at.as_deref().unwrap_or("out of range")
        )?;
        writeln!(w, "  version:      {} [{}]", self.version, flag(self.version_supported))?;
        writeln!(
            w,
            "  algorithm:    {} [{}]",
            self.algorithm,
            flag(self.algorithm_supported)
        )?;
        writeln!(w, "  compressed:   {}", self.compressed)?;
        writeln!(w, "  nonce:        {} bytes", self.nonce_len)?;
        writeln!(w, "  payload:      {} bytes (sealed)", self.payload_len)?;
        writeln!(w, "  content hash: {}", self.content_hash.dimmed())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(algorithm: &str) -> Envelope {
        Envelope {
            client_id: "edge-01".to_owned(),
            created_at: 1_700_000_000,
            format_version: FORMAT_VERSION,
            algorithm: algorithm.to_owned(),
            nonce: vec![1; 24],
            payload: b"ciphertext".to_vec(),
            compressed: true,
        }
    }

    #[test]
    fn test_report_summarizes_header() {
        let report = EnvelopeReport::from_envelope(Path::new("e.json"), &envelope("xchacha20poly1305"));

        assert_eq!(report.client_id, "edge-01");
        assert_eq!(report.created_at.as_deref(), Some("2023-11-14T22:13:20+00:00"));
        assert!(report.version_supported);
        assert!(report.algorithm_supported);
        assert_eq!(report.nonce_len, 24);
        assert_eq!(report.payload_len, 10);
        assert_eq!(report.content_hash, envelope("xchacha20poly1305").content_hash());
    }

    #[test]
    fn test_unknown_algorithm_is_flagged_not_rejected() {
        let report = EnvelopeReport::from_envelope(Path::new("e.json"), &envelope("aes256gcm"));
        assert!(!report.algorithm_supported);

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("aes256gcm"));
        assert!(output.contains("unsupported"));
    }

    #[test]
    fn test_report_json_has_no_payload_bytes() {
        let report = EnvelopeReport::from_envelope(Path::new("e.json"), &envelope("ed25519"));
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("data").is_none());
        assert!(json.get("payload").is_none());
        assert_eq!(json["payload_len"], 10);
    }
}
