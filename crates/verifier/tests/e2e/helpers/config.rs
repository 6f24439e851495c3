//! Test configuration builders.

use std::path::PathBuf;
use std::sync::Arc;

use meshprobe_cluster::{ConfigKind, ConfigObject};
use meshprobe_core::config::MeshProbeConfig;
use meshprobe_verifier::{MeshVerifier, WorkloadRegistry};

use super::mesh::FakeMesh;

pub const NAMESPACE: &str = "mesh-e2e";

/// Default configuration against the `mesh-e2e` namespace.
pub fn test_config() -> MeshProbeConfig {
    let mut config = MeshProbeConfig::default();
    config.cluster.namespace = NAMESPACE.to_owned();
    config
}

/// Same as [`test_config`] with a small retry budget so failing waits end fast.
pub fn impatient_config() -> MeshProbeConfig {
    let mut config = test_config();
    config.verifier.retry_budget = 5;
    config
}

/// Path of a file shipped under `demos/`.
pub fn demo_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos")
        .join(relative)
}

/// Loads a demo rule or policy.
pub async fn demo_rule(kind: ConfigKind, name: &str) -> ConfigObject {
    ConfigObject::load(kind, name, NAMESPACE, demo_path(&format!("rules/{name}.yaml")))
        .await
        .expect("demo rule should load")
}

/// Resolves the registry for `names` and builds a verifier over `mesh`.
pub async fn verifier_for(
    mesh: &Arc<FakeMesh>,
    config: &MeshProbeConfig,
    names: &[&str],
) -> MeshVerifier<FakeMesh> {
    let names: Vec<String> = names.iter().map(|n| (*n).to_owned()).collect();
    let policy = meshprobe_verifier::RetryPolicy::from_config(&config.verifier);
    let registry = WorkloadRegistry::resolve(
        mesh.as_ref(),
        &names,
        &config.cluster.proxy_container,
        &policy,
        &tokio_util::sync::CancellationToken::new(),
    )
    .await
    .expect("workloads should resolve");
    MeshVerifier::new(Arc::clone(mesh), Arc::new(registry), config)
}
