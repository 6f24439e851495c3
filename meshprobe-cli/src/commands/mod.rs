//! Command handlers -- one module per subcommand

pub mod config;
pub mod reachability;
pub mod run;

use std::path::Path;

use meshprobe_core::config::MeshProbeConfig;

use crate::cli::TargetArgs;
use crate::error::CliError;

/// Load `meshprobe.toml` and apply the cluster selection flags on top.
///
/// Command-line values win over the environment and the file, so the
/// result is validated again after they are applied.
pub(crate) async fn load_config(
    config_path: &Path,
    target: &TargetArgs,
) -> Result<MeshProbeConfig, CliError> {
    let mut config = MeshProbeConfig::load(config_path).await?;
    apply_target(&mut config, target);
    config.validate()?;
    Ok(config)
}

fn apply_target(config: &mut MeshProbeConfig, target: &TargetArgs) {
    if let Some(namespace) = &target.namespace {
        config.cluster.namespace = namespace.clone();
    }
    if target.sequential {
        config.verifier.parallel = false;
    }
}
