//! Single HTTP probe from a source workload.
//!
//! A probe runs the client binary inside the source workload's app
//! container with the target URL (and optionally one header) as arguments.
//! The URL has the form `http://<dst><domain><port>/<src>`, so the echoing
//! destination can tell who called it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use meshprobe_cluster::ClusterDriver;
use meshprobe_core::config::ClusterConfig;

use crate::error::VerifierError;
use crate::marker::ProbeResult;
use crate::registry::WorkloadRegistry;

/// Request header sent with a probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.value)
    }
}

/// Where a probe goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    /// Source workload (logical name)
    pub src: String,
    /// Destination service name or address
    pub dst: String,
    /// Port suffix such as `:8080`, or empty
    pub port: String,
    /// Domain qualifier such as `.mesh-e2e`, or empty
    pub domain: String,
    pub header: Option<Header>,
}

impl ProbeTarget {
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            port: String::new(),
            domain: String::new(),
            header: None,
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_header(mut self, header: Option<Header>) -> Self {
        self.header = header;
        self
    }

    pub fn url(&self) -> String {
        format!(
            "http://{}{}{}/{}",
            self.dst, self.domain, self.port, self.src
        )
    }
}

/// Runs probes through the cluster driver.
pub struct ProbeExecutor<D> {
    driver: Arc<D>,
    registry: Arc<WorkloadRegistry>,
    app_container: String,
    client_command: String,
    dump_responses: bool,
}

impl<D: ClusterDriver> ProbeExecutor<D> {
    pub fn new(driver: Arc<D>, registry: Arc<WorkloadRegistry>, cluster: &ClusterConfig) -> Self {
        Self {
            driver,
            registry,
            app_container: cluster.app_container.clone(),
            client_command: cluster.client_command.clone(),
            dump_responses: false,
        }
    }

    /// Log every raw response at debug level.
    pub fn with_dump_responses(mut self, enabled: bool) -> Self {
        self.dump_responses = enabled;
        self
    }

    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    pub fn registry(&self) -> &Arc<WorkloadRegistry> {
        &self.registry
    }

    /// Issues one probe and extracts every marker from the response.
    ///
    /// # Errors
    ///
    /// - `VerifierError::UnknownWorkload` if `target.src` was never resolved
    /// - `VerifierError::ProbeExecution` if the remote call fails
    pub async fn probe(&self, target: &ProbeTarget) -> Result<ProbeResult, VerifierError> {
        let url = target.url();
        let (raw, elapsed) = self
            .run_client(&target.src, &url, target.header.as_ref())
            .await?;
        Ok(ProbeResult::from_output(raw, elapsed))
    }

    /// Fetches `url` from inside `workload` and returns the raw response.
    pub async fn fetch(&self, workload: &str, url: &str) -> Result<String, VerifierError> {
        let (raw, _) = self.run_client(workload, url, None).await?;
        Ok(raw)
    }

    async fn run_client(
        &self,
        src: &str,
        url: &str,
        header: Option<&Header>,
    ) -> Result<(String, std::time::Duration), VerifierError> {
        let handle = self.registry.handle(src)?;

        let mut command = vec![self.client_command.clone(), url.to_owned()];
        if let Some(header) = header {
            command.push(header.key.clone());
            command.push(header.value.clone());
        }

        let start = Instant::now();
        let raw = self
            .driver
            .exec(handle, &self.app_container, &command)
            .await
            .map_err(|e| VerifierError::ProbeExecution {
                src: src.to_owned(),
                url: url.to_owned(),
                reason: e.to_string(),
            })?;
        let elapsed = start.elapsed();

        if self.dump_responses {
            debug!(
                src,
                url,
                elapsed_ms = millis(elapsed),
                response = %raw,
                "probe response"
            );
        }
        Ok((raw, elapsed))
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
