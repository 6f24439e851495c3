//! Weighted and header-based routing verification.
//!
//! A batch of concurrent probes goes from one source to one destination.
//! Each response names the version that served it; the per-version tally is
//! compared with the expected counts, each within an absolute epsilon.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use meshprobe_cluster::ClusterDriver;

use crate::error::{VerifierError, VersionMismatch};
use crate::probe::{Header, ProbeExecutor, ProbeTarget};

/// Default number of probes per routing check
pub const DEFAULT_SAMPLES: u32 = 100;

/// Expected count per version tag out of the sample size.
///
/// Counts need not add up to the sample size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpectedDistribution(BTreeMap<String, u32>);

impl ExpectedDistribution {
    pub fn new(expected: BTreeMap<String, u32>) -> Self {
        Self(expected)
    }

    pub fn get(&self, version: &str) -> Option<u32> {
        self.0.get(version).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(v, c)| (v.as_str(), *c))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for ExpectedDistribution {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(v, c)| (v.into(), c)).collect())
    }
}

/// Versions whose observed count is more than `epsilon` away from expected.
///
/// Versions present only in `observed` are not checked; a version expected
/// but never observed counts as zero.
pub fn evaluate_distribution(
    expected: &ExpectedDistribution,
    observed: &BTreeMap<String, u32>,
    epsilon: u32,
) -> Vec<VersionMismatch> {
    expected
        .iter()
        .filter_map(|(version, want)| {
            let got = observed.get(version).copied().unwrap_or(0);
            (got.abs_diff(want) > epsilon).then(|| VersionMismatch {
                version: version.to_owned(),
                expected: want,
                observed: got,
            })
        })
        .collect()
}

/// Input of a routing verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingCheck {
    pub src: String,
    pub dst: String,
    pub header: Option<Header>,
    pub samples: u32,
    pub expected: ExpectedDistribution,
    pub epsilon: u32,
}

/// Outcome of a passed routing verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingReport {
    pub src: String,
    pub dst: String,
    pub samples: u32,
    pub epsilon: u32,
    pub expected: ExpectedDistribution,
    pub observed: BTreeMap<String, u32>,
    /// Responses that carried no version tag
    pub unmatched: u32,
}

/// Issues a batch of probes and checks the version split.
pub struct RoutingVerifier<D> {
    executor: Arc<ProbeExecutor<D>>,
    max_in_flight: usize,
}

impl<D: ClusterDriver> RoutingVerifier<D> {
    pub fn new(executor: Arc<ProbeExecutor<D>>, max_in_flight: usize) -> Self {
        Self {
            executor,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Runs `check.samples` probes concurrently and compares the tally.
    ///
    /// A failing probe is not retried; it fails the whole verification and
    /// cancels the outstanding probes.
    ///
    /// # Errors
    ///
    /// - `VerifierError::ProbeExecution` if any probe fails
    /// - `VerifierError::DistributionMismatch` if any expected version is
    ///   out of tolerance
    pub async fn verify(
        &self,
        check: &RoutingCheck,
        cancel: &CancellationToken,
    ) -> Result<RoutingReport, VerifierError> {
        let target = Arc::new(
            ProbeTarget::new(check.src.clone(), check.dst.clone())
                .with_header(check.header.clone()),
        );
        info!(
            src = %check.src,
            url = %target.url(),
            samples = check.samples,
            header = ?check.header,
            "sampling traffic split"
        );

        let initial: BTreeMap<String, u32> =
            check.expected.iter().map(|(v, _)| (v.to_owned(), 0)).collect();
        let tally = Arc::new(Mutex::new(initial));
        let unmatched = Arc::new(Mutex::new(0u32));
        let group = cancel.child_token();
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();

        for _ in 0..check.samples {
            let executor = Arc::clone(&self.executor);
            let target = Arc::clone(&target);
            let tally = Arc::clone(&tally);
            let unmatched = Arc::clone(&unmatched);
            let permits = Arc::clone(&permits);
            let group = group.clone();

            tasks.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = group.cancelled() => return Err(VerifierError::Cancelled),
                    permit = permits.acquire_owned() => {
                        permit.map_err(|_| VerifierError::Cancelled)?
                    }
                };
                let result = tokio::select! {
                    biased;
                    _ = group.cancelled() => return Err(VerifierError::Cancelled),
                    result = executor.probe(&target) => result?,
                };
                match result.version {
                    Some(version) => *tally.lock().await.entry(version).or_insert(0) += 1,
                    None => *unmatched.lock().await += 1,
                }
                Ok(())
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| {
                Err(VerifierError::ProbeExecution {
                    src: check.src.clone(),
                    url: target.url(),
                    reason: format!("probe task failed: {e}"),
                })
            });
            if let Err(err) = outcome {
                if first_error.is_none() {
                    group.cancel();
                    tasks.abort_all();
                    first_error = Some(err);
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        let observed = tally.lock().await.clone();
        let unmatched = *unmatched.lock().await;
        let mismatches = evaluate_distribution(&check.expected, &observed, check.epsilon);

        for mismatch in &mismatches {
            warn!(
                version = %mismatch.version,
                expected = mismatch.expected,
                observed = mismatch.observed,
                epsilon = check.epsilon,
                "version count out of tolerance"
            );
        }
        if !mismatches.is_empty() {
            return Err(VerifierError::DistributionMismatch {
                src: check.src.clone(),
                dst: check.dst.clone(),
                mismatches,
            });
        }

        info!(src = %check.src, dst = %check.dst, observed = ?observed, unmatched, "traffic split within tolerance");
        Ok(RoutingReport {
            src: check.src.clone(),
            dst: check.dst.clone(),
            samples: check.samples,
            epsilon: check.epsilon,
            expected: check.expected.clone(),
            observed,
            unmatched,
        })
    }
}
