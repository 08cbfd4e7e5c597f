//! CLI-specific error types and exit code mapping

use logpost_core::error::LogpostError;
use logpost_seal::SealError;
use logpost_spool::SpoolError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The durable buffer could not be opened or read.
    #[error("buffer unavailable: {0}")]
    BufferUnavailable(String),

    /// Key generation or envelope decoding failed.
    #[error("seal error: {0}")]
    Seal(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from logpost-core.
    #[error("{0}")]
    Core(#[from] LogpostError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                       |
    /// |------|-------------------------------|
    /// | 0    | Success                       |
    /// | 1    | General / command error       |
    /// | 2    | Configuration error           |
    /// | 3    | Buffer unavailable            |
    /// | 4    | Key or envelope error         |
    /// | 10   | IO error                      |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Core(LogpostError::Config(_)) => 2,
            Self::BufferUnavailable(_) => 3,
            Self::Seal(_) => 4,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<SealError> for CliError {
    fn from(e: SealError) -> Self {
        Self::Seal(e.to_string())
    }
}

impl From<SpoolError> for CliError {
    fn from(e: SpoolError) -> Self {
        Self::BufferUnavailable(e.to_string())
    }
}
