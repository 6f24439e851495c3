//! Scripted in-memory cluster driver for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use meshprobe_cluster::{ClusterDriver, ClusterDriverError, ConfigObject};
use meshprobe_core::types::{WorkloadHandle, WorkloadPhase, WorkloadStatus};

type ListFn = dyn Fn(u32) -> Result<Vec<WorkloadStatus>, ClusterDriverError> + Send + Sync;
type ExecFn = dyn Fn(&WorkloadHandle, &[String]) -> Result<String, ClusterDriverError> + Send + Sync;
type LogsFn = dyn Fn(&WorkloadHandle, &str) -> Result<String, ClusterDriverError> + Send + Sync;

/// Driver whose every answer comes from a test-supplied closure.
pub(crate) struct ScriptedDriver {
    list: Box<ListFn>,
    exec: Box<ExecFn>,
    logs: Box<LogsFn>,
    exec_delay: Option<Duration>,
    pub applied: Mutex<Vec<ConfigObject>>,
    pub list_calls: AtomicU32,
    pub exec_calls: AtomicU32,
    pub log_calls: AtomicU32,
}

/// Running instance `<name>-0` labelled with `name`.
pub(crate) fn running(name: &str) -> WorkloadStatus {
    WorkloadStatus {
        workload: Some(name.to_owned()),
        instance: format!("{name}-0"),
        phase: WorkloadPhase::Running,
    }
}

/// Extracts the URL argument from a probe client command.
pub(crate) fn url_of(command: &[String]) -> &str {
    command.get(1).map(String::as_str).unwrap_or_default()
}

/// Host part of a probe URL without domain or port.
pub(crate) fn host_of(url: &str) -> &str {
    let rest = url.trim_start_matches("http://");
    let end = rest.find(['.', ':', '/']).unwrap_or(rest.len());
    &rest[..end]
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self {
            list: Box::new(|_| Ok(Vec::new())),
            exec: Box::new(|_, _| Ok(String::new())),
            logs: Box::new(|_, _| Ok(String::new())),
            exec_delay: None,
            applied: Mutex::new(Vec::new()),
            list_calls: AtomicU32::new(0),
            exec_calls: AtomicU32::new(0),
            log_calls: AtomicU32::new(0),
        }
    }

    /// Every named workload runs as a single `Running` instance.
    pub fn with_running(names: &[&str]) -> Self {
        let statuses: Vec<WorkloadStatus> = names.iter().map(|n| running(n)).collect();
        Self::new().on_list(move |_| Ok(statuses.clone()))
    }

    pub fn on_list(
        mut self,
        f: impl Fn(u32) -> Result<Vec<WorkloadStatus>, ClusterDriverError> + Send + Sync + 'static,
    ) -> Self {
        self.list = Box::new(f);
        self
    }

    pub fn on_exec(
        mut self,
        f: impl Fn(&WorkloadHandle, &[String]) -> Result<String, ClusterDriverError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.exec = Box::new(f);
        self
    }

    pub fn on_logs(
        mut self,
        f: impl Fn(&WorkloadHandle, &str) -> Result<String, ClusterDriverError> + Send + Sync + 'static,
    ) -> Self {
        self.logs = Box::new(f);
        self
    }

    /// Every exec sleeps this long before answering.
    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = Some(delay);
        self
    }

    pub fn applied_names(&self) -> Vec<String> {
        self.applied
            .lock()
            .unwrap()
            .iter()
            .map(|o| o.name.clone())
            .collect()
    }
}

impl ClusterDriver for ScriptedDriver {
    async fn list_workloads(&self) -> Result<Vec<WorkloadStatus>, ClusterDriverError> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
        (self.list)(call)
    }

    async fn exec(
        &self,
        handle: &WorkloadHandle,
        _container: &str,
        command: &[String],
    ) -> Result<String, ClusterDriverError> {
        self.exec_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.exec_delay {
            tokio::time::sleep(delay).await;
        }
        (self.exec)(handle, command)
    }

    async fn logs(
        &self,
        handle: &WorkloadHandle,
        container: &str,
    ) -> Result<String, ClusterDriverError> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        (self.logs)(handle, container)
    }

    async fn apply(&self, object: &ConfigObject) -> Result<(), ClusterDriverError> {
        self.applied.lock().unwrap().push(object.clone());
        Ok(())
    }
}

/// A driver failure as seen from a failing `kubectl exec`.
pub(crate) fn exec_failure(message: &str) -> ClusterDriverError {
    ClusterDriverError::command_failed("kubectl exec", "exit status: 1", message)
}
