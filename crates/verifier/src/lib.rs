//! meshprobe traffic verification engine.
//!
//! Confirms that a service mesh actually intercepts, routes and disrupts
//! traffic the way its configuration says. Every observation is made
//! through a [`ClusterDriver`](meshprobe_cluster::ClusterDriver): probes
//! are commands executed inside workloads, proxy behaviour is read back
//! from proxy logs and admin endpoints.
//!
//! # Architecture
//!
//! ```text
//! SuiteRunner
//!   |- WorkloadRegistry::resolve      (wait for Running instances)
//!   |- MeshVerifier
//!   |    |- run_reachability_check    CorrelationCollector -> AccessLogCorrelator
//!   |    |- run_routing_check         apply -> ConvergenceDetector -> RoutingVerifier
//!   |    `- run_fault_injection_check apply -> ConvergenceDetector -> FaultVerifier
//!   `- teardown                       (optional proxy log dump)
//! ```
//!
//! Every bounded wait goes through [`RetryPolicy`]: a budget of `B`
//! retries allows `B + 1` attempts with a fixed sleep in between.
//!
//! # Module Structure
//!
//! - [`error`]: `VerifierError` and `VersionMismatch`
//! - [`retry`]: bounded poll loop
//! - [`marker`]: request id, version, status and restart epoch extraction
//! - [`registry`]: logical workload name to instance resolution
//! - [`probe`]: probe targets and the remote probe executor
//! - [`ledger`]: per-workload request id ledger
//! - [`fanout`]: topology fan-out and id collection
//! - [`access_log`]: proxy log correlation
//! - [`convergence`]: restart epoch detection
//! - [`routing`]: traffic split verification
//! - [`fault`]: fault-injection verification
//! - [`checks`]: check entry points
//! - [`suite`]: scenario suites

pub mod access_log;
pub mod checks;
pub mod convergence;
pub mod error;
pub mod fanout;
pub mod fault;
pub mod ledger;
pub mod marker;
pub mod probe;
pub mod registry;
pub mod retry;
pub mod routing;
pub mod suite;

#[cfg(test)]
mod testing;

// --- Public API Re-exports ---

pub use checks::{MeshVerifier, ReachabilityReport};
pub use error::{VerifierError, VersionMismatch};
pub use fanout::{FanOutMode, Topology};
pub use fault::{FaultCheck, FaultReport};
pub use probe::{Header, ProbeTarget};
pub use registry::WorkloadRegistry;
pub use retry::RetryPolicy;
pub use routing::{ExpectedDistribution, RoutingCheck, RoutingReport};
pub use suite::{ScenarioOutcome, ScenarioReport, SuiteConfig, SuiteReport, SuiteRunner};
