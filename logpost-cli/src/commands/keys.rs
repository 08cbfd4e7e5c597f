//! `logpost keys` command handler

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use logpost_core::config::{LogpostConfig, SealingConfig};
use logpost_seal::Algorithm;
use logpost_seal::keys::{generate_aead_key, generate_signing_key};

use crate::cli::{KeyKind, KeysAction, KeysArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `keys` command.
pub async fn execute(
    args: KeysArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        KeysAction::Generate {
            kind,
            signing_key,
            encryption_key,
        } => {
            let sealing = sealing_config(config_path).await?;
            let request = GenerateRequest::resolve(&sealing, kind, signing_key, encryption_key)?;
            let report = generate(&request)?;
            writer.render(&report)?;
            Ok(())
        }
    }
}

/// Read the `[sealing]` section, falling back to defaults when no
/// configuration file exists yet (first-time setup).
async fn sealing_config(config_path: &Path) -> Result<SealingConfig, CliError> {
    let mut config = if tokio::fs::try_exists(config_path).await.unwrap_or(false) {
        LogpostConfig::from_file(config_path).await?
    } else {
        debug!(path = %config_path.display(), "no configuration file, using sealing defaults");
        LogpostConfig::default()
    };
    config.apply_env_overrides();
    Ok(config.sealing)
}

/// Fully resolved key generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    /// Client id the keys belong to (may be empty)
    pub client_id: String,
    /// Signing key destination, if a signing key is wanted
    pub signing_key: Option<PathBuf>,
    /// AEAD key destination, if an AEAD key is wanted
    pub encryption_key: Option<PathBuf>,
}

impl GenerateRequest {
    /// Combine CLI overrides with the sealing configuration.
    ///
    /// Without `--kind`, the key required by `sealing.algorithm` is generated.
    pub fn resolve(
        sealing: &SealingConfig,
        kind: Option<KeyKind>,
        signing_key: Option<PathBuf>,
        encryption_key: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let kind = match kind {
            Some(kind) => kind,
            None => match sealing.algorithm.parse::<Algorithm>()? {
                Algorithm::Ed25519 => KeyKind::Signing,
                Algorithm::XChaCha20Poly1305 => KeyKind::Aead,
            },
        };

        let pick = |flag: Option<PathBuf>, configured: &str, field: &str| {
            match flag {
                Some(path) => Ok(path),
                None if configured.is_empty() => Err(CliError::Config(format!(
                    "{field} is empty and no path was given"
                ))),
                None => Ok(PathBuf::from(configured)),
            }
        };

        let signing_key = match kind {
            KeyKind::Signing | KeyKind::Both => Some(pick(
                signing_key,
                &sealing.signing_key_path,
                "sealing.signing_key_path",
            )?),
            KeyKind::Aead => None,
        };
        let encryption_key = match kind {
            KeyKind::Aead | KeyKind::Both => Some(pick(
                encryption_key,
                &sealing.encryption_key_path,
                "sealing.encryption_key_path",
            )?),
            KeyKind::Signing => None,
        };

        Ok(Self {
            client_id: sealing.client_id.clone(),
            signing_key,
            encryption_key,
        })
    }
}

/// Write the requested key files. Existing files are never overwritten.
pub fn generate(request: &GenerateRequest) -> Result<KeysReport, CliError> {
    let mut keys = Vec::new();

    if let Some(path) = &request.signing_key {
        let verifying_key = generate_signing_key(path)?;
        let public_path = path.with_extension("pub");
        info!(path = %path.display(), "generated ed25519 signing key");
        keys.push(GeneratedKey {
            algorithm: Algorithm::Ed25519.as_str(),
            path: path.display().to_string(),
            public_path: Some(public_path.display().to_string()),
            public_key: Some(hex::encode(verifying_key.as_bytes())),
            fingerprint: None,
            intake_file: intake_file(&request.client_id, "pub"),
        });
    }

    if let Some(path) = &request.encryption_key {
        let key = generate_aead_key(path)?;
        info!(path = %path.display(), "generated XChaCha20-Poly1305 key");
        keys.push(GeneratedKey {
            algorithm: Algorithm::XChaCha20Poly1305.as_str(),
            path: path.display().to_string(),
            public_path: None,
            public_key: None,
            fingerprint: Some(key.fingerprint()),
            intake_file: intake_file(&request.client_id, "aead"),
        });
    }

    Ok(KeysReport { keys })
}

fn intake_file(client_id: &str, extension: &str) -> Option<String> {
    (!client_id.is_empty()).then(|| format!("{client_id}.{extension}"))
}

/// One generated key.
#[derive(Debug, Serialize)]
pub struct GeneratedKey {
    /// Algorithm identifier
    pub algorithm: &'static str,
    /// Secret key file
    pub path: String,
    /// Public key file (ed25519 only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_path: Option<String>,
    /// Public key, hex (ed25519 only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Key fingerprint (AEAD only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// File name the intake expects in its `keys_dir`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intake_file: Option<String>,
}

/// Result of `keys generate`.
#[derive(Debug, Serialize)]
pub struct KeysReport {
    pub keys: Vec<GeneratedKey>,
}

impl Render for KeysReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for key in &self.keys {
            writeln!(w, "{} key written to {}", key.algorithm.bold(), key.path)?;
            if let Some(public_path) = &key.public_path {
                writeln!(w, "  public key:  {}", public_path)?;
            }
            if let Some(public_key) = &key.public_key {
                writeln!(w, "  public hex:  {}", public_key.dimmed())?;
            }
            if let Some(fingerprint) = &key.fingerprint {
                writeln!(w, "  fingerprint: {}", fingerprint.dimmed())?;
            }
            match (&key.intake_file, key.public_path.as_ref()) {
                (Some(name), Some(public_path)) => writeln!(
                    w,
                    "  register:    copy {} to <intake keys_dir>/{}",
                    public_path, name
                )?,
                (Some(name), None) => writeln!(
                    w,
                    "  register:    copy {} to <intake keys_dir>/{} over a secure channel",
                    key.path, name
                )?,
                (None, _) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealing(algorithm: &str) -> SealingConfig {
        SealingConfig {
            client_id: "edge-01".to_owned(),
            algorithm: algorithm.to_owned(),
            signing_key_path: "/etc/logpost/client.key".to_owned(),
            encryption_key_path: "/etc/logpost/client.aead".to_owned(),
            ..SealingConfig::default()
        }
    }

    #[test]
    fn test_resolve_defaults_to_configured_algorithm() {
        let signing = GenerateRequest::resolve(&sealing("ed25519"), None, None, None).unwrap();
        assert_eq!(signing.signing_key, Some(PathBuf::from("/etc/logpost/client.key")));
        assert!(signing.encryption_key.is_none());

        let aead =
            GenerateRequest::resolve(&sealing("xchacha20poly1305"), None, None, None).unwrap();
        assert!(aead.signing_key.is_none());
        assert_eq!(aead.encryption_key, Some(PathBuf::from("/etc/logpost/client.aead")));
    }

    #[test]
    fn test_resolve_unknown_algorithm_without_kind_fails() {
        let err = GenerateRequest::resolve(&sealing("rot13"), None, None, None).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_resolve_flag_overrides_configured_path() {
        let request = GenerateRequest::resolve(
            &sealing("ed25519"),
            Some(KeyKind::Both),
            None,
            Some(PathBuf::from("/tmp/k.aead")),
        )
        .unwrap();
        assert_eq!(request.signing_key, Some(PathBuf::from("/etc/logpost/client.key")));
        assert_eq!(request.encryption_key, Some(PathBuf::from("/tmp/k.aead")));
    }

    #[test]
    fn test_resolve_empty_configured_path_needs_flag() {
        let mut config = sealing("ed25519");
        config.signing_key_path.clear();
        let err = GenerateRequest::resolve(&config, None, None, None).unwrap_err();
        assert!(err.to_string().contains("sealing.signing_key_path"));
    }

    #[test]
    fn test_report_text_mentions_intake_file_names() {
        let report = KeysReport {
            keys: vec![GeneratedKey {
                algorithm: "ed25519",
                path: "/k/client.key".to_owned(),
                public_path: Some("/k/client.pub".to_owned()),
                public_key: Some("ab".repeat(32)),
                fingerprint: None,
                intake_file: Some("edge-01.pub".to_owned()),
            }],
        };

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("/k/client.pub"));
        assert!(output.contains("edge-01.pub"));
    }
}
