//! `logpost` -- operations CLI for the logpost agent and intake.

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use logpost_cli::cli::{Cli, Commands};
use logpost_cli::commands;
use logpost_cli::error::CliError;
use logpost_cli::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_deref());

    let writer = OutputWriter::new(cli.output);
    if let Err(e) = run(cli, &writer).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli, writer: &OutputWriter) -> Result<(), CliError> {
    match cli.command {
        Commands::Status(args) => commands::status::execute(args, &cli.config, writer).await,
        Commands::Config(args) => commands::config::execute(args, &cli.config, writer).await,
        Commands::Keys(args) => commands::keys::execute(args, &cli.config, writer).await,
        Commands::Buffer(args) => commands::buffer::execute(args, &cli.config, writer).await,
        Commands::Seal(args) => commands::seal::execute(args, writer).await,
    }
}

/// Diagnostics go to stderr so JSON output on stdout stays parseable.
///
/// `RUST_LOG` wins over `--log-level`; the default is `warn`.
fn init_tracing(log_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.unwrap_or("warn")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}
