//! Fault-injection verification.
//!
//! One probe, timed around the remote call. The delay must fall inside
//! `[expected - tolerance, expected + tolerance]` and the status must match
//! exactly. No retries.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use meshprobe_cluster::ClusterDriver;

use crate::error::VerifierError;
use crate::probe::{Header, ProbeExecutor, ProbeTarget, millis};

/// Input of a fault-injection verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultCheck {
    pub src: String,
    pub dst: String,
    pub header: Option<Header>,
    pub expected_latency: Duration,
    pub expected_status: i32,
    pub tolerance: Duration,
}

/// Outcome of a passed fault-injection verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaultReport {
    pub src: String,
    pub dst: String,
    pub expected_latency_ms: u64,
    pub tolerance_ms: u64,
    pub observed_latency_ms: u64,
    pub expected_status: i32,
    pub observed_status: i32,
}

/// True when latency and status both meet `check`.
pub fn evaluate_fault(check: &FaultCheck, observed_latency: Duration, observed_status: i32) -> bool {
    let lower = check.expected_latency.saturating_sub(check.tolerance);
    let upper = check.expected_latency.saturating_add(check.tolerance);
    (lower..=upper).contains(&observed_latency) && observed_status == check.expected_status
}

pub struct FaultVerifier<D> {
    executor: Arc<ProbeExecutor<D>>,
}

impl<D: ClusterDriver> FaultVerifier<D> {
    pub fn new(executor: Arc<ProbeExecutor<D>>) -> Self {
        Self { executor }
    }

    /// # Errors
    ///
    /// - `VerifierError::ProbeExecution` if the probe fails
    /// - `VerifierError::MalformedResponse` if the response has no status
    /// - `VerifierError::FaultAssertionMismatch` on latency or status mismatch
    pub async fn verify(&self, check: &FaultCheck) -> Result<FaultReport, VerifierError> {
        let target = ProbeTarget::new(check.src.clone(), check.dst.clone())
            .with_header(check.header.clone());
        let url = target.url();
        info!(src = %check.src, url = %url, "probing fault injection");

        let result = self.executor.probe(&target).await?;
        let observed_status = result
            .status_code
            .ok_or_else(|| VerifierError::MalformedResponse {
                src: check.src.clone(),
                url: url.clone(),
                marker: "StatusCode".to_owned(),
            })?;

        let report = FaultReport {
            src: check.src.clone(),
            dst: check.dst.clone(),
            expected_latency_ms: millis(check.expected_latency),
            tolerance_ms: millis(check.tolerance),
            observed_latency_ms: millis(result.elapsed),
            expected_status: check.expected_status,
            observed_status,
        };
        info!(
            observed_latency_ms = report.observed_latency_ms,
            observed_status,
            expected_latency_ms = report.expected_latency_ms,
            expected_status = check.expected_status,
            "fault probe answered"
        );

        if !evaluate_fault(check, result.elapsed, observed_status) {
            return Err(VerifierError::FaultAssertionMismatch {
                src: report.src,
                dst: report.dst,
                expected_latency_ms: report.expected_latency_ms,
                tolerance_ms: report.tolerance_ms,
                observed_latency_ms: report.observed_latency_ms,
                expected_status: report.expected_status,
                observed_status: report.observed_status,
            });
        }
        Ok(report)
    }
}
