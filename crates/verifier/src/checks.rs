//! Check entry points.
//!
//! [`MeshVerifier`] wires the engine components around one driver and one
//! resolved registry, and exposes the three checks a test run is made of:
//!
//! - reachability: fan-out probing, then access-log correlation
//! - routing: apply a rule, wait for convergence, sample the traffic split
//! - fault injection: apply a policy, wait for convergence, time one probe

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use meshprobe_cluster::{ClusterDriver, ConfigObject};
use meshprobe_core::config::MeshProbeConfig;

use crate::access_log::AccessLogCorrelator;
use crate::convergence::ConvergenceDetector;
use crate::error::VerifierError;
use crate::fanout::{CorrelationCollector, FanOutMode, Topology};
use crate::fault::{FaultCheck, FaultReport, FaultVerifier};
use crate::probe::{ProbeExecutor, millis};
use crate::registry::WorkloadRegistry;
use crate::retry::RetryPolicy;
use crate::routing::{RoutingCheck, RoutingReport, RoutingVerifier};

/// Outcome of a passed reachability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReachabilityReport {
    /// Topology cells probed
    pub cells: usize,
    pub mode: FanOutMode,
    /// Identifiers confirmed in each checked proxy log
    pub correlated: BTreeMap<String, usize>,
    pub elapsed_ms: u64,
}

/// The traffic verification engine bound to one cluster.
pub struct MeshVerifier<D> {
    driver: Arc<D>,
    collector: CorrelationCollector<D>,
    correlator: AccessLogCorrelator<D>,
    detector: ConvergenceDetector<D>,
    routing: RoutingVerifier<D>,
    fault: FaultVerifier<D>,
    cancel: CancellationToken,
}

impl<D: ClusterDriver> MeshVerifier<D> {
    pub fn new(driver: Arc<D>, registry: Arc<WorkloadRegistry>, config: &MeshProbeConfig) -> Self {
        let policy = RetryPolicy::from_config(&config.verifier);
        let executor = Arc::new(
            ProbeExecutor::new(Arc::clone(&driver), Arc::clone(&registry), &config.cluster)
                .with_dump_responses(config.general.dump_responses),
        );

        Self {
            collector: CorrelationCollector::new(
                Arc::clone(&executor),
                policy,
                config.verifier.canary_workload.clone(),
                FanOutMode::from_config(&config.verifier),
            ),
            correlator: AccessLogCorrelator::new(
                Arc::clone(&driver),
                registry,
                config.cluster.proxy_container.clone(),
                config.topology.log_checked_workloads.clone(),
                policy,
            ),
            detector: ConvergenceDetector::new(
                Arc::clone(&executor),
                config.cluster.admin_url.clone(),
                policy,
            ),
            routing: RoutingVerifier::new(
                Arc::clone(&executor),
                config.verifier.max_concurrent_probes,
            ),
            fault: FaultVerifier::new(executor),
            driver,
            cancel: CancellationToken::new(),
        }
    }

    /// Every check stops with `VerifierError::Cancelled` once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Probes every cell of `topology`, then waits until every collected
    /// request identifier appears in the checked proxy logs.
    pub async fn run_reachability_check(
        &self,
        topology: &Topology,
    ) -> Result<ReachabilityReport, VerifierError> {
        let start = Instant::now();
        let ledger = self.collector.collect(topology, &self.cancel).await?;
        let correlated = self.correlator.verify(&ledger, &self.cancel).await?;
        let elapsed = start.elapsed();

        info!(
            cells = topology.len(),
            elapsed_ms = millis(elapsed),
            "reachability check passed"
        );
        Ok(ReachabilityReport {
            cells: topology.len(),
            mode: self.collector.mode(),
            correlated,
            elapsed_ms: millis(elapsed),
        })
    }

    /// Applies `rule`, waits for the source proxy to pick it up, then
    /// samples the traffic split.
    pub async fn run_routing_check(
        &self,
        rule: &ConfigObject,
        check: &RoutingCheck,
    ) -> Result<RoutingReport, VerifierError> {
        self.apply_and_converge(rule, &check.src).await?;
        self.routing.verify(check, &self.cancel).await
    }

    /// Applies `policy`, waits for the source proxy to pick it up, then
    /// times one probe.
    pub async fn run_fault_injection_check(
        &self,
        policy: &ConfigObject,
        check: &FaultCheck,
    ) -> Result<FaultReport, VerifierError> {
        self.apply_and_converge(policy, &check.src).await?;
        if self.cancel.is_cancelled() {
            return Err(VerifierError::Cancelled);
        }
        self.fault.verify(check).await
    }

    async fn apply_and_converge(
        &self,
        object: &ConfigObject,
        workload: &str,
    ) -> Result<u64, VerifierError> {
        let baseline = self.detector.current_epoch(workload).await?;
        info!(object = %object, workload, baseline, "applying configuration");
        self.driver.apply(object).await?;
        self.detector
            .wait_for_new_epoch(workload, baseline, &self.cancel)
            .await
    }
}
