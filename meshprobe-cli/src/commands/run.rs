//! `meshprobe run` command handler

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use meshprobe_cluster::KubectlDriver;
use meshprobe_verifier::{ScenarioOutcome, SuiteConfig, SuiteReport, SuiteRunner};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

use super::reachability::render_reachability;

/// Execute the `run` command.
///
/// The suite file is only read when routing scenarios are enabled.
pub async fn execute(
    args: RunArgs,
    config_path: &Path,
    writer: &OutputWriter,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    let config = super::load_config(config_path, &args.target).await?;

    let suite = if args.skip_routing {
        SuiteConfig::default()
    } else {
        SuiteConfig::load(&args.suite).await?
    };

    let driver = KubectlDriver::from_config(&config.cluster)
        .map_err(|e| CliError::Config(e.to_string()))?;

    info!(
        namespace = %config.cluster.namespace,
        suite = %args.suite.display(),
        scenarios = suite.scenarios.len(),
        skip_routing = args.skip_routing,
        "starting verification run"
    );

    let report = SuiteRunner::new(Arc::new(driver), config)
        .with_cancellation(cancel)
        .skip_routing(args.skip_routing)
        .run(&suite)
        .await?;

    writer.render(&report)?;
    Ok(())
}

impl Render for SuiteReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Mesh verification: {}", self.namespace.bold())?;
        writeln!(w)?;
        render_reachability(&self.reachability, w)?;
        writeln!(w)?;

        if self.routing_skipped {
            writeln!(w, "Routing: {}", "SKIPPED".yellow())?;
            return Ok(());
        }

        writeln!(w, "Routing scenarios ({}):", self.scenarios.len())?;
        for scenario in &self.scenarios {
            match &scenario.outcome {
                ScenarioOutcome::Routing(routing) => {
                    let observed = routing
                        .observed
                        .iter()
                        .map(|(version, count)| format!("{version}={count}"))
                        .collect::<Vec<_>>()
                        .join(" ");
                    writeln!(
                        w,
                        "  {:<20} {}  {} -> {}  {}/{} samples  [{}]",
                        scenario.name,
                        "PASSED".green().bold(),
                        routing.src,
                        routing.dst,
                        routing.samples.saturating_sub(routing.unmatched),
                        routing.samples,
                        observed
                    )?;
                }
                ScenarioOutcome::Fault(fault) => {
                    writeln!(
                        w,
                        "  {:<20} {}  {} -> {}  {} ms (expected {}±{}), status {}",
                        scenario.name,
                        "PASSED".green().bold(),
                        fault.src,
                        fault.dst,
                        fault.observed_latency_ms,
                        fault.expected_latency_ms,
                        fault.tolerance_ms,
                        fault.observed_status
                    )?;
                }
            }
        }
        Ok(())
    }
}
