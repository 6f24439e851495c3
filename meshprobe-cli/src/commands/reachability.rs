//! `meshprobe reachability` command handler

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use meshprobe_cluster::KubectlDriver;
use meshprobe_verifier::{FanOutMode, ReachabilityReport, SuiteRunner};

use crate::cli::ReachabilityArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `reachability` command.
pub async fn execute(
    args: ReachabilityArgs,
    config_path: &Path,
    writer: &OutputWriter,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    let config = super::load_config(config_path, &args.target).await?;
    let driver = KubectlDriver::from_config(&config.cluster)
        .map_err(|e| CliError::Config(e.to_string()))?;

    info!(
        namespace = %config.cluster.namespace,
        workloads = config.topology.workloads.len(),
        "starting reachability check"
    );

    let report = SuiteRunner::new(Arc::new(driver), config)
        .with_cancellation(cancel)
        .run_reachability()
        .await?;

    writer.render(&report)?;
    Ok(())
}

pub(crate) fn mode_label(mode: FanOutMode) -> String {
    match mode {
        FanOutMode::Sequential => "sequential".to_owned(),
        FanOutMode::Parallel { max_in_flight } => format!("parallel (max {max_in_flight})"),
    }
}

pub(crate) fn render_reachability(
    report: &ReachabilityReport,
    w: &mut dyn Write,
) -> std::io::Result<()> {
    use colored::Colorize;

    writeln!(
        w,
        "Reachability: {} ({} cells, {}, {} ms)",
        "PASSED".green().bold(),
        report.cells,
        mode_label(report.mode),
        report.elapsed_ms
    )?;
    for (workload, ids) in &report.correlated {
        writeln!(w, "  {:<16} {} ids correlated", workload, ids)?;
    }
    Ok(())
}

impl Render for ReachabilityReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        render_reachability(self, w)
    }
}
