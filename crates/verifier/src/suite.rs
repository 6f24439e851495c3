//! Scenario suites -- `suite.toml` parsing and ordered execution
//!
//! A suite lists routing and fault-injection scenarios. [`SuiteRunner`]
//! resolves the workloads, runs the reachability check, then every
//! scenario in file order, stopping at the first failure. Teardown runs
//! whatever the outcome.
//!
//! # Example
//! ```toml
//! [[scenarios]]
//! name = "weighted-route"
//! kind = "RouteRule"
//! rule_file = "rules/weighted-route.yaml"
//! src = "hello"
//! dst = "world"
//!
//! [scenarios.expect]
//! v1 = 75
//! v2 = 25
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use meshprobe_cluster::{ClusterDriver, ConfigKind, ConfigObject, validate_name};
use meshprobe_core::config::{MeshProbeConfig, VerifierConfig};

use crate::checks::{MeshVerifier, ReachabilityReport};
use crate::error::VerifierError;
use crate::fanout::Topology;
use crate::fault::{FaultCheck, FaultReport};
use crate::probe::Header;
use crate::registry::WorkloadRegistry;
use crate::retry::RetryPolicy;
use crate::routing::{DEFAULT_SAMPLES, ExpectedDistribution, RoutingCheck, RoutingReport};

/// Suite file looked up when none is given.
pub const DEFAULT_SUITE_FILE: &str = "suite.toml";

fn default_samples() -> u32 {
    DEFAULT_SAMPLES
}

/// Ordered list of scenarios.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteConfig {
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
    /// Directory relative rule files are resolved against
    #[serde(skip)]
    base_dir: PathBuf,
}

/// One configuration change and the traffic it must produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Object name, also used in reports
    pub name: String,
    pub kind: ConfigKind,
    pub rule_file: PathBuf,
    pub src: String,
    pub dst: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<Header>,
    #[serde(default = "default_samples")]
    pub samples: u32,
    /// Overrides `verifier.distribution_epsilon`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<ExpectedDistribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultExpectation>,
}

/// Expected effect of a fault-injection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FaultExpectation {
    pub delay_ms: u64,
    pub status: i32,
    /// Overrides `verifier.fault_tolerance_ms`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance_ms: Option<u64>,
}

/// The check a scenario resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioCheck {
    Routing(RoutingCheck),
    Fault(FaultCheck),
}

impl Scenario {
    /// Builds the check, filling tolerances from `defaults`.
    pub fn check(&self, defaults: &VerifierConfig) -> Result<ScenarioCheck, VerifierError> {
        match (&self.expect, &self.fault) {
            (Some(expected), None) => Ok(ScenarioCheck::Routing(RoutingCheck {
                src: self.src.clone(),
                dst: self.dst.clone(),
                header: self.header.clone(),
                samples: self.samples,
                expected: expected.clone(),
                epsilon: self.epsilon.unwrap_or(defaults.distribution_epsilon),
            })),
            (None, Some(fault)) => Ok(ScenarioCheck::Fault(FaultCheck {
                src: self.src.clone(),
                dst: self.dst.clone(),
                header: self.header.clone(),
                expected_latency: Duration::from_millis(fault.delay_ms),
                expected_status: fault.status,
                tolerance: Duration::from_millis(
                    fault.tolerance_ms.unwrap_or(defaults.fault_tolerance_ms),
                ),
            })),
            _ => Err(self.invalid("needs exactly one of `expect` or `fault`")),
        }
    }

    fn validate(&self) -> Result<(), VerifierError> {
        validate_name("scenario name", &self.name)
            .map_err(|e| VerifierError::Config(e.to_string()))?;
        if self.src.trim().is_empty() || self.dst.trim().is_empty() {
            return Err(self.invalid("`src` and `dst` must not be empty"));
        }
        if self.samples == 0 {
            return Err(self.invalid("`samples` must be positive"));
        }
        if let Some(expected) = &self.expect {
            if expected.is_empty() {
                return Err(self.invalid("`expect` lists no version"));
            }
            // each version is checked on its own within epsilon
            let total: u64 = expected.iter().map(|(_, count)| u64::from(count)).sum();
            if total > u64::from(self.samples) {
                warn!(
                    scenario = %self.name,
                    total,
                    samples = self.samples,
                    "expected counts add up to more than the sample size"
                );
            }
        }
        self.check(&VerifierConfig::default()).map(|_| ())
    }

    fn invalid(&self, reason: impl std::fmt::Display) -> VerifierError {
        VerifierError::Config(format!("scenario '{}': {reason}", self.name))
    }
}

impl SuiteConfig {
    /// Reads and validates a suite file. Rule files resolve against its
    /// directory.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, VerifierError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            VerifierError::Config(format!("cannot read suite {}: {e}", path.display()))
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let suite = Self::parse(&content, base_dir)?;
        suite.validate()?;
        Ok(suite)
    }

    pub fn parse(toml_str: &str, base_dir: impl Into<PathBuf>) -> Result<Self, VerifierError> {
        let mut suite: Self = toml::from_str(toml_str)
            .map_err(|e| VerifierError::Config(format!("cannot parse suite: {e}")))?;
        suite.base_dir = base_dir.into();
        Ok(suite)
    }

    pub fn validate(&self) -> Result<(), VerifierError> {
        let mut seen = HashSet::new();
        for scenario in &self.scenarios {
            scenario.validate()?;
            if !seen.insert(scenario.name.as_str()) {
                return Err(scenario.invalid("duplicate scenario name"));
            }
        }
        Ok(())
    }

    pub fn rule_path(&self, scenario: &Scenario) -> PathBuf {
        if scenario.rule_file.is_absolute() {
            scenario.rule_file.clone()
        } else {
            self.base_dir.join(&scenario.rule_file)
        }
    }

    /// Scenario sources in first-seen order.
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for scenario in &self.scenarios {
            if !sources.contains(&scenario.src) {
                sources.push(scenario.src.clone());
            }
        }
        sources
    }
}

/// Outcome of one passed scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: ScenarioOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    Routing(RoutingReport),
    Fault(FaultReport),
}

/// Outcome of a passed suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuiteReport {
    pub namespace: String,
    pub reachability: ReachabilityReport,
    pub scenarios: Vec<ScenarioReport>,
    pub routing_skipped: bool,
}

struct PreparedScenario {
    name: String,
    object: ConfigObject,
    check: ScenarioCheck,
}

/// Runs suites against one cluster.
pub struct SuiteRunner<D> {
    driver: Arc<D>,
    config: MeshProbeConfig,
    cancel: CancellationToken,
    skip_routing: bool,
}

impl<D: ClusterDriver> SuiteRunner<D> {
    pub fn new(driver: Arc<D>, config: MeshProbeConfig) -> Self {
        Self {
            driver,
            config,
            cancel: CancellationToken::new(),
            skip_routing: false,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the reachability check only.
    pub fn skip_routing(mut self, skip: bool) -> Self {
        self.skip_routing = skip;
        self
    }

    /// Setup, reachability, then every scenario in order.
    ///
    /// Rule files are loaded before anything touches the cluster.
    pub async fn run(&self, suite: &SuiteConfig) -> Result<SuiteReport, VerifierError> {
        let prepared = if self.skip_routing {
            info!("routing scenarios skipped");
            Vec::new()
        } else {
            self.prepare(suite).await?
        };

        let mut names = self.config.topology.workloads.clone();
        for scenario in &prepared {
            let src = match &scenario.check {
                ScenarioCheck::Routing(check) => &check.src,
                ScenarioCheck::Fault(check) => &check.src,
            };
            if !names.contains(src) {
                names.push(src.clone());
            }
        }

        let registry = self.setup(&names).await?;
        let outcome = self.execute(Arc::clone(&registry), prepared).await;
        self.teardown(&registry).await;
        outcome
    }

    /// Setup and the reachability check alone.
    pub async fn run_reachability(&self) -> Result<ReachabilityReport, VerifierError> {
        let registry = self.setup(&self.config.topology.workloads).await?;
        let outcome = self
            .verifier(Arc::clone(&registry))
            .run_reachability_check(&self.topology())
            .await;
        self.teardown(&registry).await;
        outcome
    }

    async fn prepare(&self, suite: &SuiteConfig) -> Result<Vec<PreparedScenario>, VerifierError> {
        let mut prepared = Vec::with_capacity(suite.scenarios.len());
        for scenario in &suite.scenarios {
            let object = ConfigObject::load(
                scenario.kind,
                scenario.name.clone(),
                self.config.cluster.namespace.clone(),
                suite.rule_path(scenario),
            )
            .await
            .map_err(|e| VerifierError::Config(format!("scenario '{}': {e}", scenario.name)))?;
            prepared.push(PreparedScenario {
                name: scenario.name.clone(),
                object,
                check: scenario.check(&self.config.verifier)?,
            });
        }
        Ok(prepared)
    }

    async fn setup(&self, names: &[String]) -> Result<Arc<WorkloadRegistry>, VerifierError> {
        let policy = RetryPolicy::from_config(&self.config.verifier);
        let registry =
            WorkloadRegistry::resolve(
                self.driver.as_ref(),
                names,
                &self.config.cluster.proxy_container,
                &policy,
                &self.cancel,
            )
            .await?;
        Ok(Arc::new(registry))
    }

    async fn execute(
        &self,
        registry: Arc<WorkloadRegistry>,
        prepared: Vec<PreparedScenario>,
    ) -> Result<SuiteReport, VerifierError> {
        let verifier = self.verifier(registry);
        let reachability = verifier.run_reachability_check(&self.topology()).await?;

        let mut scenarios = Vec::with_capacity(prepared.len());
        for scenario in prepared {
            info!(scenario = %scenario.name, object = %scenario.object, "running scenario");
            let outcome = match &scenario.check {
                ScenarioCheck::Routing(check) => ScenarioOutcome::Routing(
                    verifier.run_routing_check(&scenario.object, check).await?,
                ),
                ScenarioCheck::Fault(check) => ScenarioOutcome::Fault(
                    verifier
                        .run_fault_injection_check(&scenario.object, check)
                        .await?,
                ),
            };
            info!(scenario = %scenario.name, "scenario passed");
            scenarios.push(ScenarioReport {
                name: scenario.name,
                outcome,
            });
        }

        Ok(SuiteReport {
            namespace: self.config.cluster.namespace.clone(),
            reachability,
            scenarios,
            routing_skipped: self.skip_routing,
        })
    }

    async fn teardown(&self, registry: &WorkloadRegistry) {
        if !self.config.general.dump_proxy_logs {
            return;
        }
        for workload in &self.config.topology.log_checked_workloads {
            let Ok(handle) = registry.handle(workload) else {
                continue;
            };
            match self
                .driver
                .logs(handle, &self.config.cluster.proxy_container)
                .await
            {
                Ok(log) => info!(workload = %workload, log = %log, "proxy log"),
                Err(e) => warn!(workload = %workload, error = %e, "failed to fetch proxy log"),
            }
        }
    }

    fn verifier(&self, registry: Arc<WorkloadRegistry>) -> MeshVerifier<D> {
        MeshVerifier::new(Arc::clone(&self.driver), registry, &self.config)
            .with_cancellation(self.cancel.clone())
    }

    fn topology(&self) -> Topology {
        Topology::from_config(&self.config.topology, &self.config.cluster.namespace)
    }
}
