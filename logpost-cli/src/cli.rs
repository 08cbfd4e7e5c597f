//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Logpost -- tamper-evident log shipping agent and intake.
///
/// Use `logpost <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "logpost", version, about, long_about = None)]
pub struct Cli {
    /// Path to the logpost.toml configuration file.
    #[arg(short, long, global = true, default_value = "/etc/logpost/logpost.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show whether the daemon is running and which components are enabled.
    Status(StatusArgs),

    /// Manage configuration.
    Config(ConfigArgs),

    /// Generate sealing keys.
    Keys(KeysArgs),

    /// Inspect the local durable buffer.
    Buffer(BufferArgs),

    /// Inspect sealed envelopes.
    Seal(SealArgs),
}

// ---- status ----

/// Display daemon liveness, enabled components and buffer backlog.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show per-component configuration details.
    #[arg(short, long)]
    pub verbose: bool,
}

// ---- config ----

/// Manage logpost configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, collector, sealing, buffer, transport, intake, metrics).
        #[arg(long)]
        section: Option<String>,
    },
}

// ---- keys ----

/// Manage sealing keys.
#[derive(Args, Debug)]
pub struct KeysArgs {
    #[command(subcommand)]
    pub action: KeysAction,
}

#[derive(Subcommand, Debug)]
pub enum KeysAction {
    /// Generate new key files (mode 0600). Existing files are never overwritten.
    Generate {
        /// Which keys to generate (default: the one `sealing.algorithm` needs).
        #[arg(long)]
        kind: Option<KeyKind>,

        /// Signing key path (default: `sealing.signing_key_path`). The public key lands next to it as `.pub`.
        #[arg(long)]
        signing_key: Option<PathBuf>,

        /// AEAD key path (default: `sealing.encryption_key_path`).
        #[arg(long)]
        encryption_key: Option<PathBuf>,
    },
}

/// Key material kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyKind {
    /// ed25519 signing key pair.
    Signing,
    /// 32-byte XChaCha20-Poly1305 shared key.
    Aead,
    /// Both of the above.
    Both,
}

// ---- buffer ----

/// Inspect the durable buffer.
#[derive(Args, Debug)]
pub struct BufferArgs {
    #[command(subcommand)]
    pub action: BufferAction,
}

#[derive(Subcommand, Debug)]
pub enum BufferAction {
    /// Show entry counts per status, the oldest entry and lifetime totals.
    Status {
        /// Buffer database path (default: from configuration).
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

// ---- seal ----

/// Inspect sealed envelopes.
#[derive(Args, Debug)]
pub struct SealArgs {
    #[command(subcommand)]
    pub action: SealAction,
}

#[derive(Subcommand, Debug)]
pub enum SealAction {
    /// Decode an envelope header. The payload is never decrypted.
    Inspect {
        /// Envelope JSON file.
        envelope: PathBuf,
    },
}
