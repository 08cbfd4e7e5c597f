//! Logging initialization for logpost-daemon.
//!
//! Configures `tracing-subscriber` from the `[general]` section of
//! `LogpostConfig`. `RUST_LOG` takes precedence over `general.log_level`.
//!
//! * `"json"`: one JSON object per line (default, for log shippers)
//! * `"pretty"`: multi-line human-readable output

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use logpost_core::config::GeneralConfig;

/// Initialize the global tracing subscriber. Call once, before any component starts.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), &config.log_level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.log_format.as_str() {
        "json" => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false),
            )
            .try_init(),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        other => anyhow::bail!("unknown log format '{}', expected 'json' or 'pretty'", other),
    };

    result.map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {}", e))
}

/// Build the level filter. A non-empty `rust_log` wins over the configured level.
fn build_filter(rust_log: Option<&str>, level: &str) -> Result<EnvFilter> {
    let directives = rust_log.filter(|s| !s.trim().is_empty()).unwrap_or(level);
    EnvFilter::try_new(directives)
        .map_err(|e| anyhow::anyhow!("invalid log filter '{}': {}", directives, e))
}
