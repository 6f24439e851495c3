//! Topology fan-out and request-identifier collection.
//!
//! Every cell of source × destination × port × domain gets probed until the
//! response carries a request identifier. The identifier is attributed to
//! both the source and the destination in the [`AccessLogLedger`], to be
//! found later in their proxy logs.
//!
//! # Concurrency
//!
//! In parallel mode every cell runs as a task in one [`JoinSet`], with at
//! most `max_in_flight` probes admitted by a semaphore. A permit covers one
//! remote call only; a cell waiting out its retry interval holds none. The
//! first task error
//! cancels the group token, aborts the set and is returned once every task
//! has stopped. Tasks sleeping inside the retry loop observe the token and
//! exit without waiting out their interval.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use meshprobe_cluster::ClusterDriver;
use meshprobe_core::config::{TopologyConfig, VerifierConfig};

use crate::error::VerifierError;
use crate::ledger::{AccessLogLedger, LedgerSnapshot};
use crate::probe::{ProbeExecutor, ProbeTarget};
use crate::retry::{Attempt, RetryPolicy};

/// One source/destination/port/domain combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyCell {
    pub src: String,
    pub dst: String,
    pub port: String,
    pub domain: String,
}

impl TopologyCell {
    pub fn target(&self) -> ProbeTarget {
        ProbeTarget::new(self.src.clone(), self.dst.clone())
            .with_port(self.port.clone())
            .with_domain(self.domain.clone())
    }
}

/// Workloads, port variants and domain qualifiers to cross.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    workloads: Vec<String>,
    ports: Vec<String>,
    domains: Vec<String>,
}

impl Topology {
    pub fn new(workloads: Vec<String>, ports: Vec<String>, domains: Vec<String>) -> Self {
        Self {
            workloads,
            ports,
            domains,
        }
    }

    /// Topology from the `[topology]` section, with `{namespace}` substituted.
    pub fn from_config(config: &TopologyConfig, namespace: &str) -> Self {
        Self::new(
            config.workloads.clone(),
            config.ports.clone(),
            config.resolved_domains(namespace),
        )
    }

    pub fn workloads(&self) -> &[String] {
        &self.workloads
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.workloads.len() * self.workloads.len() * self.ports.len() * self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every cell, sources outermost and domains innermost.
    pub fn cells(&self) -> Vec<TopologyCell> {
        let mut cells = Vec::with_capacity(self.len());
        for src in &self.workloads {
            for dst in &self.workloads {
                for port in &self.ports {
                    for domain in &self.domains {
                        cells.push(TopologyCell {
                            src: src.clone(),
                            dst: dst.clone(),
                            port: port.clone(),
                            domain: domain.clone(),
                        });
                    }
                }
            }
        }
        cells
    }
}

/// How cells are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOutMode {
    /// One probe in flight, cells in order
    Sequential,
    /// All cells as tasks, at most `max_in_flight` probing at once
    Parallel { max_in_flight: usize },
}

impl FanOutMode {
    pub fn from_config(config: &VerifierConfig) -> Self {
        if config.parallel {
            Self::Parallel {
                max_in_flight: config.max_concurrent_probes.max(1),
            }
        } else {
            Self::Sequential
        }
    }
}

/// Probes every topology cell and records the identifiers it sees.
pub struct CorrelationCollector<D> {
    executor: Arc<ProbeExecutor<D>>,
    policy: RetryPolicy,
    canary: String,
    mode: FanOutMode,
}

impl<D: ClusterDriver> CorrelationCollector<D> {
    /// `canary` is the non-proxied workload whose self-probe is expected to
    /// carry no identifier.
    pub fn new(
        executor: Arc<ProbeExecutor<D>>,
        policy: RetryPolicy,
        canary: impl Into<String>,
        mode: FanOutMode,
    ) -> Self {
        Self {
            executor,
            policy,
            canary: canary.into(),
            mode,
        }
    }

    pub fn mode(&self) -> FanOutMode {
        self.mode
    }

    /// Probes every cell of `topology` and returns the completed ledger.
    ///
    /// # Errors
    ///
    /// - `VerifierError::BudgetExceeded` if a cell never yields an identifier
    /// - `VerifierError::ProbeExecution` if any remote call fails
    /// - `VerifierError::Cancelled` if `cancel` fires
    pub async fn collect(
        &self,
        topology: &Topology,
        cancel: &CancellationToken,
    ) -> Result<LedgerSnapshot, VerifierError> {
        info!(cells = topology.len(), mode = ?self.mode, "probing topology");
        match self.mode {
            FanOutMode::Sequential => self.collect_sequential(topology, cancel).await,
            FanOutMode::Parallel { max_in_flight } => {
                self.collect_parallel(topology, max_in_flight, cancel).await
            }
        }
    }

    async fn collect_sequential(
        &self,
        topology: &Topology,
        cancel: &CancellationToken,
    ) -> Result<LedgerSnapshot, VerifierError> {
        let ledger = AccessLogLedger::new();
        for cell in topology.cells() {
            discover(
                &self.executor,
                self.policy,
                &self.canary,
                &cell,
                &ledger,
                None,
                cancel,
            )
            .await?;
        }
        Ok(ledger.into_snapshot())
    }

    async fn collect_parallel(
        &self,
        topology: &Topology,
        max_in_flight: usize,
        cancel: &CancellationToken,
    ) -> Result<LedgerSnapshot, VerifierError> {
        let ledger = Arc::new(AccessLogLedger::new());
        let group = cancel.child_token();
        let permits = Arc::new(Semaphore::new(max_in_flight.max(1)));
        let mut tasks = JoinSet::new();

        for cell in topology.cells() {
            let executor = Arc::clone(&self.executor);
            let ledger = Arc::clone(&ledger);
            let permits = Arc::clone(&permits);
            let group = group.clone();
            let canary = self.canary.clone();
            let policy = self.policy;

            tasks.spawn(async move {
                discover(
                    &executor,
                    policy,
                    &canary,
                    &cell,
                    &ledger,
                    Some(permits.as_ref()),
                    &group,
                )
                .await
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| Err(task_failure(e)));
            if let Err(err) = outcome {
                if first_error.is_none() {
                    warn!(error = %err, "probe failed, cancelling remaining probes");
                    group.cancel();
                    tasks.abort_all();
                    first_error = Some(err);
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        match Arc::try_unwrap(ledger) {
            Ok(ledger) => Ok(ledger.into_snapshot()),
            Err(shared) => Ok(shared.snapshot().await),
        }
    }
}

fn task_failure(err: JoinError) -> VerifierError {
    if err.is_cancelled() {
        VerifierError::Cancelled
    } else {
        VerifierError::ProbeExecution {
            src: "fan-out".to_owned(),
            url: String::new(),
            reason: format!("probe task panicked: {err}"),
        }
    }
}

/// Probes one cell until it yields an identifier (or the canary pair
/// answers without one) and records the result.
///
/// With `permits`, each probe call holds one permit for its duration.
async fn discover<D: ClusterDriver>(
    executor: &ProbeExecutor<D>,
    policy: RetryPolicy,
    canary: &str,
    cell: &TopologyCell,
    ledger: &AccessLogLedger,
    permits: Option<&Semaphore>,
    cancel: &CancellationToken,
) -> Result<(), VerifierError> {
    let target = cell.target();
    let url = target.url();
    let is_canary_pair = cell.src == canary && cell.dst == canary;
    let operation = format!("proxy injection from {} to {} ({url})", cell.src, cell.dst);

    let target = &target;
    let url = url.as_str();
    let found = policy
        .run(&operation, cancel, |attempt| async move {
            debug!(src = %target.src, url, attempt, "making a request");
            let _permit = match permits {
                Some(permits) => Some(
                    permits
                        .acquire()
                        .await
                        .map_err(|_| VerifierError::Cancelled)?,
                ),
                None => None,
            };
            let result = executor.probe(target).await?;
            match result.request_id {
                Some(id) => Ok(Attempt::Done(Some(id))),
                None if is_canary_pair => {
                    debug!(src = %target.src, url, "no request id from canary pair, as expected");
                    Ok(Attempt::Done(None))
                }
                None => Ok(Attempt::Retry(format!("no request id in response to {url}"))),
            }
        })
        .await?;

    if let Some(id) = found {
        debug!(src = %cell.src, dst = %cell.dst, id = %id, "request id recorded");
        ledger.record(&cell.src, &cell.dst, &id).await;
    }
    Ok(())
}
