//! Cross-checks collected request identifiers against proxy logs.
//!
//! Each attempt re-reads the full proxy log of every checked workload and
//! requires every identifier attributed to it to appear verbatim. A single
//! miss fails the attempt as a whole; the next attempt starts over.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use meshprobe_cluster::ClusterDriver;

use crate::error::VerifierError;
use crate::ledger::LedgerSnapshot;
use crate::registry::WorkloadRegistry;
use crate::retry::{Attempt, RetryPolicy};

/// First identifier of `workload` absent from `log`.
pub fn find_missing<'a>(ledger: &'a LedgerSnapshot, workload: &str, log: &str) -> Option<&'a str> {
    ledger
        .ids_for(workload)
        .iter()
        .map(String::as_str)
        .find(|id| !log.contains(id))
}

/// Waits until every proxy log holds its workload's identifiers.
pub struct AccessLogCorrelator<D> {
    driver: Arc<D>,
    registry: Arc<WorkloadRegistry>,
    proxy_container: String,
    workloads: Vec<String>,
    policy: RetryPolicy,
}

impl<D: ClusterDriver> AccessLogCorrelator<D> {
    /// `workloads` are the ones whose proxy log is checked.
    pub fn new(
        driver: Arc<D>,
        registry: Arc<WorkloadRegistry>,
        proxy_container: impl Into<String>,
        workloads: Vec<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            driver,
            registry,
            proxy_container: proxy_container.into(),
            workloads,
            policy,
        }
    }

    /// Runs the correlation and returns the number of identifiers found per
    /// checked workload.
    ///
    /// # Errors
    ///
    /// - `VerifierError::BudgetExceeded` if some identifier never shows up
    /// - `VerifierError::Driver` if a log fetch fails
    pub async fn verify(
        &self,
        ledger: &LedgerSnapshot,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, usize>, VerifierError> {
        info!(workloads = ?self.workloads, "correlating request ids with proxy logs");

        self.policy
            .run("access log correlation", cancel, |attempt| async move {
                self.check_once(ledger, attempt).await
            })
            .await?;

        Ok(self
            .workloads
            .iter()
            .map(|w| (w.clone(), ledger.ids_for(w).len()))
            .collect())
    }

    async fn check_once(
        &self,
        ledger: &LedgerSnapshot,
        attempt: u32,
    ) -> Result<Attempt<()>, VerifierError> {
        for workload in &self.workloads {
            let handle = self.registry.handle(workload)?;
            let log = self.driver.logs(handle, &self.proxy_container).await?;

            if let Some(missing) = find_missing(ledger, workload, &log) {
                debug!(workload = %workload, id = missing, attempt, "request id not in proxy log yet");
                return Ok(Attempt::Retry(format!(
                    "request id {missing} not found in proxy log of {workload}"
                )));
            }
        }
        Ok(Attempt::Done(()))
    }
}
