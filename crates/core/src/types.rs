//! Domain types shared between the cluster driver and the verifier.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A logical workload resolved to a concrete execution handle.
///
/// `workload` is the stable logical name used by the test topology
/// (`a`, `b`, `hello`, ...); `instance` is what the cluster driver needs
/// to reach it (a pod name for Kubernetes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadHandle {
    /// Logical workload name
    pub workload: String,
    /// Driver-specific instance identifier
    pub instance: String,
}

impl WorkloadHandle {
    /// Creates a handle for `workload` running as `instance`.
    pub fn new(workload: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            workload: workload.into(),
            instance: instance.into(),
        }
    }
}

impl fmt::Display for WorkloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.workload, self.instance)
    }
}

/// Lifecycle phase of a workload instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl WorkloadPhase {
    /// Maps a Kubernetes pod phase string. Unrecognised values map to `Unknown`.
    pub fn from_phase_str(phase: &str) -> Self {
        match phase {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for WorkloadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instance as reported by the cluster driver's listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadStatus {
    /// Logical workload name, if the instance carries the workload label
    pub workload: Option<String>,
    /// Instance identifier
    pub instance: String,
    /// Current phase
    pub phase: WorkloadPhase,
}

impl WorkloadStatus {
    pub fn is_running(&self) -> bool {
        self.phase == WorkloadPhase::Running
    }
}
