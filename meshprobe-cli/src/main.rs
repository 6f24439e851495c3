//! meshprobe -- service mesh traffic verification CLI.
//!
//! Exit codes: 0 success, 1 failed check, 2 configuration error, 10 IO error.

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use meshprobe_core::config::{GeneralConfig, MeshProbeConfig};

use cli::{Cli, Commands};
use error::CliError;
use output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let general = logging_config(&cli).await;
    logging::init_tracing(&general).map_err(|e| CliError::Config(e.to_string()))?;

    info!(config = %cli.config.display(), "meshprobe starting");

    let writer = OutputWriter::new(cli.output);
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, &cli.config, &writer, cancel).await,
        Commands::Reachability(args) => {
            commands::reachability::execute(args, &cli.config, &writer, cancel).await
        }
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    }
}

/// `[general]` from the config file with the command-line log flags on top.
///
/// Falls back to defaults when the file cannot be loaded; the command itself
/// reports that error.
async fn logging_config(cli: &Cli) -> GeneralConfig {
    let mut general = MeshProbeConfig::load(&cli.config)
        .await
        .map(|config| config.general)
        .unwrap_or_default();
    if let Some(level) = &cli.log_level {
        general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        general.log_format = format.clone();
    }
    general
}

/// Cancel in-flight checks on Ctrl-C so teardown still runs.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt received, cancelling verification");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for interrupt"),
        }
    });
}
