//! Configuration -- `meshprobe.toml` parsing and runtime settings
//!
//! [`MeshProbeConfig`] is the top-level structure holding every section.
//!
//! # Loading precedence
//! 1. CLI arguments (highest)
//! 2. Environment variables (`MESHPROBE_CLUSTER_NAMESPACE=mesh-e2e`)
//! 3. Config file (`meshprobe.toml`)
//! 4. Defaults (`Default` impls)
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), meshprobe_core::error::MeshProbeError> {
//! use meshprobe_core::config::MeshProbeConfig;
//!
//! // Load from file and apply env overrides
//! let config = MeshProbeConfig::load("meshprobe.toml").await?;
//!
//! // Parse a TOML string directly
//! let config = MeshProbeConfig::parse("[verifier]\nparallel = false")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, MeshProbeError};

/// Placeholder substituted with the cluster namespace in `topology.domains`.
pub const NAMESPACE_PLACEHOLDER: &str = "{namespace}";

/// Upper bounds for numeric settings
const MAX_COMMAND_TIMEOUT_SECS: u64 = 600;
const MAX_RETRY_BUDGET: u32 = 1_000;
const MAX_RETRY_INTERVAL_MS: u64 = 60_000;
const MAX_CONCURRENT_PROBES: usize = 1_024;
const MAX_FAULT_TOLERANCE_MS: u64 = 60_000;

/// meshprobe configuration
///
/// Mirrors the structure of `meshprobe.toml`. Each component reads only
/// its own section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshProbeConfig {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
    /// Cluster driver settings
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Verification engine settings
    #[serde(default)]
    pub verifier: VerifierConfig,
    /// Reachability topology
    #[serde(default)]
    pub topology: TopologyConfig,
}

impl MeshProbeConfig {
    /// Loads the TOML file and applies environment overrides.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, MeshProbeError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads the TOML file without environment overrides.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, MeshProbeError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MeshProbeError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                MeshProbeError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, MeshProbeError> {
        toml::from_str(toml_str).map_err(|e| {
            MeshProbeError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Applies environment overrides.
    ///
    /// Naming: `MESHPROBE_{SECTION}_{FIELD}`, e.g. `MESHPROBE_VERIFIER_PARALLEL=false`.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "MESHPROBE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "MESHPROBE_GENERAL_LOG_FORMAT");
        override_bool(
            &mut self.general.dump_responses,
            "MESHPROBE_GENERAL_DUMP_RESPONSES",
        );
        override_bool(
            &mut self.general.dump_proxy_logs,
            "MESHPROBE_GENERAL_DUMP_PROXY_LOGS",
        );

        // Cluster
        override_string(&mut self.cluster.kubectl, "MESHPROBE_CLUSTER_KUBECTL");
        override_string(&mut self.cluster.kubeconfig, "MESHPROBE_CLUSTER_KUBECONFIG");
        override_string(&mut self.cluster.namespace, "MESHPROBE_CLUSTER_NAMESPACE");
        override_u64(
            &mut self.cluster.command_timeout_secs,
            "MESHPROBE_CLUSTER_COMMAND_TIMEOUT_SECS",
        );

        // Verifier
        override_u32(
            &mut self.verifier.retry_budget,
            "MESHPROBE_VERIFIER_RETRY_BUDGET",
        );
        override_u64(
            &mut self.verifier.retry_interval_ms,
            "MESHPROBE_VERIFIER_RETRY_INTERVAL_MS",
        );
        override_bool(&mut self.verifier.parallel, "MESHPROBE_VERIFIER_PARALLEL");
        override_usize(
            &mut self.verifier.max_concurrent_probes,
            "MESHPROBE_VERIFIER_MAX_CONCURRENT_PROBES",
        );
        override_string(
            &mut self.verifier.canary_workload,
            "MESHPROBE_VERIFIER_CANARY_WORKLOAD",
        );

        // Topology
        override_csv(&mut self.topology.workloads, "MESHPROBE_TOPOLOGY_WORKLOADS");
        override_csv(
            &mut self.topology.log_checked_workloads,
            "MESHPROBE_TOPOLOGY_LOG_CHECKED_WORKLOADS",
        );
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), MeshProbeError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.cluster.validate()?;
        self.verifier.validate()?;
        self.topology.validate()?;
        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> MeshProbeError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format (json, pretty)
    pub log_format: String,
    /// Log every raw probe response at debug level
    pub dump_responses: bool,
    /// Dump proxy logs of the log-checked workloads during teardown
    pub dump_proxy_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            dump_responses: false,
            dump_proxy_logs: false,
        }
    }
}

/// Cluster driver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// kubectl binary
    pub kubectl: String,
    /// kubeconfig path (empty uses kubectl's own resolution)
    pub kubeconfig: String,
    /// Namespace holding the test topology
    pub namespace: String,
    /// Container running the probe client
    pub app_container: String,
    /// Container running the sidecar proxy
    pub proxy_container: String,
    /// Probe client command inside `app_container`
    pub client_command: String,
    /// Proxy admin endpoint reporting the restart epoch
    pub admin_url: String,
    /// Label carrying the logical workload name
    pub app_label: String,
    /// Per-command timeout (seconds)
    pub command_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_owned(),
            kubeconfig: String::new(),
            namespace: "default".to_owned(),
            app_container: "app".to_owned(),
            proxy_container: "proxy".to_owned(),
            client_command: "client".to_owned(),
            admin_url: "http://localhost:5000/server_info".to_owned(),
            app_label: "app".to_owned(),
            command_timeout_secs: 60,
        }
    }
}

impl ClusterConfig {
    fn validate(&self) -> Result<(), MeshProbeError> {
        for (field, value) in [
            ("cluster.kubectl", &self.kubectl),
            ("cluster.namespace", &self.namespace),
            ("cluster.app_container", &self.app_container),
            ("cluster.proxy_container", &self.proxy_container),
            ("cluster.client_command", &self.client_command),
            ("cluster.admin_url", &self.admin_url),
            ("cluster.app_label", &self.app_label),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }

        if self.command_timeout_secs == 0 || self.command_timeout_secs > MAX_COMMAND_TIMEOUT_SECS {
            return Err(invalid(
                "cluster.command_timeout_secs",
                format!("must be 1-{MAX_COMMAND_TIMEOUT_SECS}"),
            ));
        }
        Ok(())
    }
}

/// Verification engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Retries after the first attempt for every bounded poll
    pub retry_budget: u32,
    /// Sleep between attempts (milliseconds)
    pub retry_interval_ms: u64,
    /// Probe topology cells concurrently
    pub parallel: bool,
    /// Worker pool size for concurrent probes
    pub max_concurrent_probes: usize,
    /// Non-proxied workload whose self-probe must not be intercepted
    pub canary_workload: String,
    /// Absolute per-version tolerance for traffic splits
    pub distribution_epsilon: u32,
    /// Latency tolerance for fault injection (milliseconds)
    pub fault_tolerance_ms: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            retry_budget: 30,
            retry_interval_ms: 1_000,
            parallel: true,
            max_concurrent_probes: 64,
            canary_workload: "t".to_owned(),
            distribution_epsilon: 5,
            fault_tolerance_ms: 2_000,
        }
    }
}

impl VerifierConfig {
    fn validate(&self) -> Result<(), MeshProbeError> {
        if self.retry_budget > MAX_RETRY_BUDGET {
            return Err(invalid(
                "verifier.retry_budget",
                format!("must be 0-{MAX_RETRY_BUDGET}"),
            ));
        }
        if self.retry_interval_ms > MAX_RETRY_INTERVAL_MS {
            return Err(invalid(
                "verifier.retry_interval_ms",
                format!("must be 0-{MAX_RETRY_INTERVAL_MS}"),
            ));
        }
        if self.max_concurrent_probes == 0 || self.max_concurrent_probes > MAX_CONCURRENT_PROBES {
            return Err(invalid(
                "verifier.max_concurrent_probes",
                format!("must be 1-{MAX_CONCURRENT_PROBES}"),
            ));
        }
        if self.fault_tolerance_ms > MAX_FAULT_TOLERANCE_MS {
            return Err(invalid(
                "verifier.fault_tolerance_ms",
                format!("must be 0-{MAX_FAULT_TOLERANCE_MS}"),
            ));
        }
        Ok(())
    }
}

/// Reachability topology
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Workloads probed against each other (sources and destinations)
    pub workloads: Vec<String>,
    /// Port suffixes (`""` means the default port)
    pub ports: Vec<String>,
    /// Domain qualifiers; `{namespace}` is substituted
    pub domains: Vec<String>,
    /// Workloads whose proxy log is correlated
    pub log_checked_workloads: Vec<String>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            workloads: vec!["a".to_owned(), "b".to_owned(), "t".to_owned()],
            ports: vec![String::new(), ":80".to_owned(), ":8080".to_owned()],
            domains: vec![String::new(), format!(".{NAMESPACE_PLACEHOLDER}")],
            log_checked_workloads: vec!["a".to_owned(), "b".to_owned()],
        }
    }
}

impl TopologyConfig {
    /// Domain qualifiers with the namespace placeholder substituted.
    pub fn resolved_domains(&self, namespace: &str) -> Vec<String> {
        self.domains
            .iter()
            .map(|d| d.replace(NAMESPACE_PLACEHOLDER, namespace))
            .collect()
    }

    fn validate(&self) -> Result<(), MeshProbeError> {
        if self.workloads.is_empty() {
            return Err(invalid("topology.workloads", "must not be empty"));
        }
        if self.workloads.iter().any(|w| w.trim().is_empty()) {
            return Err(invalid(
                "topology.workloads",
                "workload names must not be empty",
            ));
        }
        if self.ports.is_empty() {
            return Err(invalid(
                "topology.ports",
                "must not be empty (use \"\" for the default port)",
            ));
        }
        if self.domains.is_empty() {
            return Err(invalid(
                "topology.domains",
                "must not be empty (use \"\" for the short name)",
            ));
        }
        if let Some(unknown) = self
            .log_checked_workloads
            .iter()
            .find(|w| !self.workloads.contains(w))
        {
            return Err(invalid(
                "topology.log_checked_workloads",
                format!("'{unknown}' is not listed in topology.workloads"),
            ));
        }
        Ok(())
    }
}

// --- Environment override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val.split(',').map(|s| s.trim().to_owned()).collect();
    }
}
