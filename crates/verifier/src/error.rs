//! Verification error types
//!
//! [`VerifierError`] is the failure taxonomy of the verification engine.
//! Every check entry point returns it; `From<VerifierError> for MeshProbeError`
//! hands it to the top level.

use std::fmt;

use meshprobe_cluster::ClusterDriverError;
use meshprobe_core::error::{ConfigError, MeshProbeError, VerificationError};
use serde::Serialize;

/// One version whose observed count fell outside tolerance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionMismatch {
    pub version: String,
    pub expected: u32,
    pub observed: u32,
}

impl fmt::Display for VersionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, observed {}",
            self.version, self.expected, self.observed
        )
    }
}

fn join_mismatches(mismatches: &[VersionMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Verification engine error
#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    /// A bounded poll ran out of attempts
    #[error("{operation}: gave up after {attempts} attempts: {last_reason}")]
    BudgetExceeded {
        /// What was being waited for
        operation: String,
        /// Attempts made
        attempts: u32,
        /// Why the final attempt did not succeed
        last_reason: String,
    },

    /// The remote call behind a probe or log fetch failed
    #[error("probe from {src} to {url} failed: {reason}")]
    ProbeExecution {
        src: String,
        url: String,
        reason: String,
    },

    /// Observed traffic split outside tolerance
    #[error("traffic from {src} to {dst} out of tolerance: {}", join_mismatches(.mismatches))]
    DistributionMismatch {
        src: String,
        dst: String,
        mismatches: Vec<VersionMismatch>,
    },

    /// Fault-injection latency or status not as expected
    #[error(
        "fault from {src} to {dst}: expected status {expected_status} after {expected_latency_ms}ms (±{tolerance_ms}ms), observed status {observed_status} after {observed_latency_ms}ms"
    )]
    FaultAssertionMismatch {
        src: String,
        dst: String,
        expected_latency_ms: u64,
        tolerance_ms: u64,
        observed_latency_ms: u64,
        expected_status: i32,
        observed_status: i32,
    },

    /// A required marker is absent from a response
    #[error("response to {src} from {url} carries no {marker} marker")]
    MalformedResponse {
        src: String,
        url: String,
        marker: String,
    },

    /// The run was cancelled before completing
    #[error("verification cancelled")]
    Cancelled,

    /// A logical workload name that the registry never resolved
    #[error("unknown workload '{0}'")]
    UnknownWorkload(String),

    /// Cluster driver failure outside a probe path
    #[error("cluster driver error: {0}")]
    Driver(#[from] ClusterDriverError),

    /// Invalid verifier input (suite file, expectations)
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<VerifierError> for MeshProbeError {
    fn from(err: VerifierError) -> Self {
        match err {
            VerifierError::Driver(inner) => inner.into(),
            VerifierError::Config(reason) => MeshProbeError::Config(ConfigError::InvalidValue {
                field: "suite".to_owned(),
                reason,
            }),
            VerifierError::BudgetExceeded { .. } => {
                MeshProbeError::Verification(VerificationError::BudgetExceeded(err.to_string()))
            }
            VerifierError::ProbeExecution { .. } => {
                MeshProbeError::Verification(VerificationError::ProbeExecution(err.to_string()))
            }
            VerifierError::DistributionMismatch { .. } => MeshProbeError::Verification(
                VerificationError::DistributionMismatch(err.to_string()),
            ),
            VerifierError::FaultAssertionMismatch { .. } => MeshProbeError::Verification(
                VerificationError::FaultAssertionMismatch(err.to_string()),
            ),
            VerifierError::MalformedResponse { .. } => {
                MeshProbeError::Verification(VerificationError::MalformedResponse(err.to_string()))
            }
            VerifierError::Cancelled | VerifierError::UnknownWorkload(_) => {
                MeshProbeError::Verification(VerificationError::Aborted(err.to_string()))
            }
        }
    }
}
