//! Logical workload name to execution handle mapping.
//!
//! [`WorkloadRegistry::resolve`] waits until every requested workload has a
//! running instance, then freezes the mapping. The registry is never updated
//! afterwards; share it behind an `Arc`.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use meshprobe_cluster::ClusterDriver;
use meshprobe_core::types::{WorkloadHandle, WorkloadStatus};

use crate::error::VerifierError;
use crate::retry::{Attempt, RetryPolicy};

/// Write-once map of workload name to handle.
#[derive(Debug, Clone, Default)]
pub struct WorkloadRegistry {
    handles: BTreeMap<String, WorkloadHandle>,
}

impl WorkloadRegistry {
    /// Builds a registry from already-known handles.
    pub fn from_handles(handles: impl IntoIterator<Item = WorkloadHandle>) -> Self {
        Self {
            handles: handles
                .into_iter()
                .map(|h| (h.workload.clone(), h))
                .collect(),
        }
    }

    /// Polls the driver until every name in `names` has a running instance.
    ///
    /// When a workload has several instances all must be running; the
    /// handle points at the lexicographically first one. Instances of
    /// workloads not in `names` are ignored.
    ///
    /// # Errors
    ///
    /// - `VerifierError::BudgetExceeded` if the topology never becomes ready;
    ///   the `proxy_container` logs of every requested instance are dumped at
    ///   `warn` first
    /// - `VerifierError::Driver` if listing fails
    pub async fn resolve<D: ClusterDriver>(
        driver: &D,
        names: &[String],
        proxy_container: &str,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<Self, VerifierError> {
        info!(workloads = ?names, "waiting for workloads to be running");

        let result = policy
            .run("workload readiness", cancel, |attempt| async move {
                let statuses = driver.list_workloads().await?;
                match Self::try_from_statuses(names, &statuses) {
                    Ok(registry) => Ok(Attempt::Done(registry)),
                    Err(not_ready) => {
                        debug!(attempt, not_ready = %not_ready, "workloads not ready");
                        Ok(Attempt::Retry(not_ready))
                    }
                }
            })
            .await;
        let registry = match result {
            Ok(registry) => registry,
            Err(err @ VerifierError::BudgetExceeded { .. }) => {
                dump_proxy_logs(driver, names, proxy_container).await;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        for handle in registry.handles.values() {
            debug!(workload = %handle.workload, instance = %handle.instance, "workload resolved");
        }
        Ok(registry)
    }

    /// Builds the mapping if every name is ready, otherwise describes what is not.
    fn try_from_statuses(names: &[String], statuses: &[WorkloadStatus]) -> Result<Self, String> {
        let mut handles = BTreeMap::new();
        let mut not_ready = Vec::new();

        for name in names {
            let mut instances: Vec<&WorkloadStatus> = statuses
                .iter()
                .filter(|s| s.workload.as_deref() == Some(name.as_str()))
                .collect();
            instances.sort_by(|a, b| a.instance.cmp(&b.instance));

            let Some(first) = instances.first() else {
                not_ready.push(format!("{name} (no instance)"));
                continue;
            };
            if let Some(pending) = instances.iter().find(|s| !s.is_running()) {
                not_ready.push(format!("{name} ({} is {})", pending.instance, pending.phase));
                continue;
            }
            handles.insert(
                name.clone(),
                WorkloadHandle::new(name.clone(), first.instance.clone()),
            );
        }

        if not_ready.is_empty() {
            Ok(Self { handles })
        } else {
            Err(format!("not running: {}", not_ready.join(", ")))
        }
    }

    /// Handle for `workload`.
    pub fn handle(&self, workload: &str) -> Result<&WorkloadHandle, VerifierError> {
        self.handles
            .get(workload)
            .ok_or_else(|| VerifierError::UnknownWorkload(workload.to_owned()))
    }

    pub fn workloads(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Logs the proxy output of every listed instance of `names`.
async fn dump_proxy_logs<D: ClusterDriver>(driver: &D, names: &[String], proxy_container: &str) {
    let statuses = match driver.list_workloads().await {
        Ok(statuses) => statuses,
        Err(e) => {
            warn!(error = %e, "failed to list workloads for log dump");
            return;
        }
    };
    for status in &statuses {
        let Some(workload) = status.workload.as_deref() else {
            continue;
        };
        if !names.iter().any(|n| n == workload) {
            continue;
        }
        let handle = WorkloadHandle::new(workload, status.instance.clone());
        match driver.logs(&handle, proxy_container).await {
            Ok(log) => warn!(
                workload,
                instance = %status.instance,
                phase = %status.phase,
                log = %log,
                "proxy log of workload that did not become ready"
            ),
            Err(e) => warn!(
                workload,
                instance = %status.instance,
                error = %e,
                "failed to fetch proxy log"
            ),
        }
    }
}
