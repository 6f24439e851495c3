//! Configuration propagation detection via the proxy restart epoch.
//!
//! A proxy's admin endpoint reports a generation counter that only grows
//! while the proxy process lives. A read strictly above a baseline taken
//! before a configuration change means the change has been picked up.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use meshprobe_cluster::ClusterDriver;

use crate::error::VerifierError;
use crate::marker::extract_restart_epoch;
use crate::probe::ProbeExecutor;
use crate::retry::{Attempt, RetryPolicy};

pub struct ConvergenceDetector<D> {
    executor: Arc<ProbeExecutor<D>>,
    admin_url: String,
    policy: RetryPolicy,
}

impl<D: ClusterDriver> ConvergenceDetector<D> {
    pub fn new(
        executor: Arc<ProbeExecutor<D>>,
        admin_url: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            executor,
            admin_url: admin_url.into(),
            policy,
        }
    }

    /// One read of `workload`'s restart epoch.
    ///
    /// # Errors
    ///
    /// - `VerifierError::ProbeExecution` if the admin read fails
    /// - `VerifierError::MalformedResponse` if no status line is found
    pub async fn current_epoch(&self, workload: &str) -> Result<u64, VerifierError> {
        let raw = self.executor.fetch(workload, &self.admin_url).await?;
        extract_restart_epoch(&raw).ok_or_else(|| VerifierError::MalformedResponse {
            src: workload.to_owned(),
            url: self.admin_url.clone(),
            marker: "restart epoch".to_owned(),
        })
    }

    /// Polls until `workload`'s epoch exceeds `baseline` and returns it.
    ///
    /// Failed reads and unparsable responses are retried.
    pub async fn wait_for_new_epoch(
        &self,
        workload: &str,
        baseline: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, VerifierError> {
        info!(workload, baseline, "waiting for restart epoch to increase");
        let operation = format!("restart epoch of {workload} to exceed {baseline}");

        let epoch = self
            .policy
            .run(&operation, cancel, |attempt| async move {
                match self.current_epoch(workload).await {
                    Ok(epoch) if epoch > baseline => Ok(Attempt::Done(epoch)),
                    Ok(epoch) => Ok(Attempt::Retry(format!(
                        "epoch {epoch} not above baseline {baseline}"
                    ))),
                    Err(err @ VerifierError::UnknownWorkload(_)) => Err(err),
                    Err(err) => {
                        debug!(workload, attempt, error = %err, "could not read restart epoch");
                        Ok(Attempt::Retry(err.to_string()))
                    }
                }
            })
            .await?;

        info!(workload, epoch, "new configuration generation observed");
        Ok(epoch)
    }
}
