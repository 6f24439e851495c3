//! meshprobe core: types, errors and configuration shared by every crate.
//!
//! - [`config`]: `meshprobe.toml` parsing, env overrides and validation
//! - [`error`]: the top-level error taxonomy (`MeshProbeError`)
//! - [`types`]: workload handles and status reported by the cluster driver

pub mod config;
pub mod error;
pub mod types;

// --- Re-exports ---

// Errors
pub use error::{ClusterError, ConfigError, MeshProbeError, VerificationError};

// Configuration
pub use config::MeshProbeConfig;

// Domain types
pub use types::{WorkloadHandle, WorkloadPhase, WorkloadStatus};
