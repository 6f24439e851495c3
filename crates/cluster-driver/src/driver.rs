//! Cluster access abstraction for testability.
//!
//! The [`ClusterDriver`] trait is the only way the verifier reaches the
//! cluster. Production code uses [`KubectlDriver`], which shells out to
//! `kubectl`; tests substitute scripted in-memory drivers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │   MeshVerifier   │
//! └────────┬─────────┘
//!          │
//!          ▼
//!   ┌──────────────┐
//!   │ClusterDriver │ (trait)
//!   └──────────────┘
//!        │      │
//!        ▼      ▼
//!   ┌───────┐ ┌────────┐
//!   │kubectl│ │Scripted│
//!   └───┬───┘ └────────┘
//!       │
//!       ▼
//!   API server
//! ```
//!
//! # Name Validation
//!
//! Instance, container, namespace and object names are checked against
//! DNS-1123 rules before they reach a command line:
//! - 1-253 characters
//! - lowercase ASCII alphanumerics, `-` and `.`
//! - must start and end with an alphanumeric

use std::collections::HashMap;
use std::future::Future;
use std::process::{Output, Stdio};
use std::time::Duration;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use meshprobe_core::config::ClusterConfig;
use meshprobe_core::types::{WorkloadHandle, WorkloadPhase, WorkloadStatus};

use crate::error::ClusterDriverError;
use crate::policy::ConfigObject;

/// Maximum length of a DNS-1123 subdomain
const MAX_NAME_LEN: usize = 253;

/// Validates a resource name before it is placed on a command line.
pub fn validate_name(field: &str, value: &str) -> Result<(), ClusterDriverError> {
    let reject = |reason: &str| ClusterDriverError::InvalidName {
        field: field.to_owned(),
        value: value.to_owned(),
        reason: reason.to_owned(),
    };

    if value.is_empty() || value.len() > MAX_NAME_LEN {
        return Err(reject(&format!(
            "length {} (must be 1-{MAX_NAME_LEN})",
            value.len()
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(reject(
            "only lowercase alphanumerics, '-' and '.' are allowed",
        ));
    }
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    if !value.starts_with(alnum) || !value.ends_with(alnum) {
        return Err(reject("must start and end with an alphanumeric"));
    }
    Ok(())
}

/// Trait abstracting cluster operations.
///
/// The trait is `Send + Sync + 'static` so a driver can be shared behind an
/// `Arc` by concurrently running probes.
///
/// # Implementations
///
/// - [`KubectlDriver`]: Production implementation using the `kubectl` binary
/// - Scripted drivers: test implementations with canned responses
pub trait ClusterDriver: Send + Sync + 'static {
    /// Lists every instance in the driver's namespace.
    ///
    /// Instances in any phase are returned; readiness filtering is the
    /// caller's job.
    fn list_workloads(
        &self,
    ) -> impl Future<Output = Result<Vec<WorkloadStatus>, ClusterDriverError>> + Send;

    /// Runs `command` inside `container` of the given instance.
    ///
    /// Returns combined stdout and stderr. A non-zero exit is an error.
    fn exec(
        &self,
        handle: &WorkloadHandle,
        container: &str,
        command: &[String],
    ) -> impl Future<Output = Result<String, ClusterDriverError>> + Send;

    /// Returns the full log of `container` in the given instance.
    fn logs(
        &self,
        handle: &WorkloadHandle,
        container: &str,
    ) -> impl Future<Output = Result<String, ClusterDriverError>> + Send;

    /// Creates or updates a configuration object.
    ///
    /// Success means the control plane accepted it, not that proxies have
    /// picked it up.
    fn apply(
        &self,
        object: &ConfigObject,
    ) -> impl Future<Output = Result<(), ClusterDriverError>> + Send;
}

/// `kubectl`-backed cluster driver.
///
/// Every call spawns one `kubectl` process bounded by a per-call timeout.
/// The child is killed if the call is dropped or times out.
#[derive(Debug, Clone)]
pub struct KubectlDriver {
    kubectl: String,
    kubeconfig: Option<String>,
    namespace: String,
    app_label: String,
    timeout: Duration,
}

impl KubectlDriver {
    /// Creates a driver for `namespace` using the given `kubectl` binary.
    pub fn new(
        kubectl: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Result<Self, ClusterDriverError> {
        let namespace = namespace.into();
        validate_name("namespace", &namespace)?;
        Ok(Self {
            kubectl: kubectl.into(),
            kubeconfig: None,
            namespace,
            app_label: "app".to_owned(),
            timeout: Duration::from_secs(60),
        })
    }

    /// Creates a driver from the `[cluster]` configuration section.
    pub fn from_config(config: &ClusterConfig) -> Result<Self, ClusterDriverError> {
        let driver = Self::new(config.kubectl.clone(), config.namespace.clone())?
            .with_app_label(config.app_label.clone())
            .with_timeout(Duration::from_secs(config.command_timeout_secs));
        if config.kubeconfig.is_empty() {
            Ok(driver)
        } else {
            Ok(driver.with_kubeconfig(config.kubeconfig.clone()))
        }
    }

    pub fn with_kubeconfig(mut self, path: impl Into<String>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    /// Label whose value names the logical workload of a pod.
    pub fn with_app_label(mut self, label: impl Into<String>) -> Self {
        self.app_label = label.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn base_args(&self) -> Vec<String> {
        match &self.kubeconfig {
            Some(path) => vec!["--kubeconfig".to_owned(), path.clone()],
            None => Vec::new(),
        }
    }

    fn list_args(&self) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(
            ["get", "pods", "-n", self.namespace.as_str(), "-o", "json"]
                .iter()
                .map(|s| (*s).to_owned()),
        );
        args
    }

    fn exec_args(&self, instance: &str, container: &str, command: &[String]) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(
            ["exec", instance, "-n", self.namespace.as_str(), "-c", container, "--"]
                .iter()
                .map(|s| (*s).to_owned()),
        );
        args.extend(command.iter().cloned());
        args
    }

    fn logs_args(&self, instance: &str, container: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(
            ["logs", instance, "-n", self.namespace.as_str(), "-c", container]
                .iter()
                .map(|s| (*s).to_owned()),
        );
        args
    }

    fn apply_args(&self, namespace: &str) -> Vec<String> {
        let mut args = self.base_args();
        args.extend(
            ["apply", "-n", namespace, "-f", "-"]
                .iter()
                .map(|s| (*s).to_owned()),
        );
        args
    }

    /// Runs kubectl with `args`, feeding `stdin` if given.
    ///
    /// Returns the raw output of a successful run.
    async fn run(
        &self,
        args: Vec<String>,
        stdin: Option<Vec<u8>>,
    ) -> Result<Output, ClusterDriverError> {
        let command_line = format!("{} {}", self.kubectl, args.join(" "));
        debug!(command = %command_line, "running kubectl");

        let mut command = Command::new(&self.kubectl);
        command
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| ClusterDriverError::Spawn {
            command: command_line.clone(),
            reason: e.to_string(),
        })?;

        let completion = async move {
            if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
                pipe.write_all(&input).await?;
                pipe.shutdown().await?;
            }
            child.wait_with_output().await
        };

        let output = match tokio::time::timeout(self.timeout, completion).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ClusterDriverError::Spawn {
                    command: command_line,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(
                    command = %command_line,
                    timeout_secs = self.timeout.as_secs(),
                    "kubectl call timed out"
                );
                return Err(ClusterDriverError::Timeout {
                    command: command_line,
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            return Err(ClusterDriverError::command_failed(
                command_line,
                output.status.to_string(),
                &combined_output(&output),
            ));
        }
        Ok(output)
    }
}

impl ClusterDriver for KubectlDriver {
    async fn list_workloads(&self) -> Result<Vec<WorkloadStatus>, ClusterDriverError> {
        let output = self.run(self.list_args(), None).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_pod_list(&stdout, &self.app_label)
    }

    async fn exec(
        &self,
        handle: &WorkloadHandle,
        container: &str,
        command: &[String],
    ) -> Result<String, ClusterDriverError> {
        validate_name("instance", &handle.instance)?;
        validate_name("container", container)?;
        let output = self
            .run(self.exec_args(&handle.instance, container, command), None)
            .await?;
        Ok(combined_output(&output))
    }

    async fn logs(
        &self,
        handle: &WorkloadHandle,
        container: &str,
    ) -> Result<String, ClusterDriverError> {
        validate_name("instance", &handle.instance)?;
        validate_name("container", container)?;
        let output = self
            .run(self.logs_args(&handle.instance, container), None)
            .await?;
        Ok(combined_output(&output))
    }

    async fn apply(&self, object: &ConfigObject) -> Result<(), ClusterDriverError> {
        validate_name("namespace", &object.namespace)?;
        let manifest = serde_json::to_vec(&object.manifest())
            .map_err(|e| ClusterDriverError::Decode(format!("manifest encoding failed: {e}")))?;
        self.run(self.apply_args(&object.namespace), Some(manifest))
            .await?;
        debug!(object = %object, "configuration applied");
        Ok(())
    }
}

fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

#[derive(Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Deserialize)]
struct Pod {
    metadata: PodMetadata,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Deserialize)]
struct PodMetadata {
    name: String,
    #[serde(default)]
    labels: HashMap<String, String>,
}

#[derive(Default, Deserialize)]
struct PodStatus {
    #[serde(default)]
    phase: String,
}

/// Decodes `kubectl get pods -o json` output.
fn parse_pod_list(json: &str, app_label: &str) -> Result<Vec<WorkloadStatus>, ClusterDriverError> {
    let list: PodList = serde_json::from_str(json)
        .map_err(|e| ClusterDriverError::Decode(format!("pod list: {e}")))?;

    Ok(list
        .items
        .into_iter()
        .map(|pod| WorkloadStatus {
            workload: pod.metadata.labels.get(app_label).cloned(),
            instance: pod.metadata.name,
            phase: WorkloadPhase::from_phase_str(&pod.status.phase),
        })
        .collect())
}
