//! meshprobe cluster driver.
//!
//! The verification engine never talks to a cluster directly. Everything
//! remote goes through the [`ClusterDriver`] trait: listing workload
//! instances, executing a command inside one, fetching a container's log
//! and applying a configuration object.
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`ClusterDriverError`)
//! - [`driver`]: `ClusterDriver` trait and the `kubectl`-backed `KubectlDriver`
//! - [`policy`]: Routing rules and fault policies (`ConfigKind`, `ConfigObject`)

pub mod driver;
pub mod error;
pub mod policy;

// --- Public API Re-exports ---

pub use driver::{ClusterDriver, KubectlDriver, validate_name};
pub use error::ClusterDriverError;
pub use policy::{ConfigKind, ConfigObject};
