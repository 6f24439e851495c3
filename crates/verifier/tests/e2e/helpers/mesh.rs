//! In-memory service mesh for E2E tests.
//!
//! Workloads `a`, `b`, `hello` and `world` (two instances, `v1` and `v2`)
//! run with a sidecar proxy; `t` runs without one. Every proxied request
//! gets an identifier which lands in the access log of each proxy on its
//! path. Applied route rules and destination policies take effect
//! immediately, but the source proxy only reports its new restart epoch
//! after a few admin reads, like a real proxy hot-restarting.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::Value;

use meshprobe_cluster::{ClusterDriver, ClusterDriverError, ConfigKind, ConfigObject};
use meshprobe_core::config::ClusterConfig;
use meshprobe_core::types::{WorkloadHandle, WorkloadPhase, WorkloadStatus};

const INSTANCES: &[(&str, &str)] = &[
    ("a", "a-7d9f8"),
    ("b", "b-5c6e1"),
    ("t", "t-0a2b3"),
    ("hello", "hello-9f1e2"),
    ("world", "world-v1-4b7c8"),
    ("world", "world-v2-1d3e5"),
];

/// A header-matched route.
#[derive(Debug, Clone)]
struct HeaderRoute {
    key: String,
    value: String,
    version: String,
}

/// A delay followed by an abort for one destination version.
#[derive(Debug, Clone)]
struct Fault {
    version: String,
    delay: Duration,
    status: i32,
}

#[derive(Debug, Default)]
struct MeshState {
    pending_lists: u32,
    epoch: u64,
    restart_countdown: Option<u32>,
    weighted: Vec<(String, u32)>,
    header_routes: Vec<HeaderRoute>,
    faults: Vec<Fault>,
    access_logs: BTreeMap<String, String>,
    next_id: u64,
    world_requests: u64,
}

/// What a probe to `world` resolves to, decided under the state lock.
enum WorldAnswer {
    Served(String),
    Faulted(Duration, i32),
}

pub struct FakeMesh {
    state: Mutex<MeshState>,
    admin_url: String,
    restart_after_reads: u32,
    unproxied: BTreeSet<String>,
    broken_proxies: BTreeSet<String>,
    ignored_objects: BTreeSet<String>,
    unreachable: BTreeSet<String>,
    applied: Mutex<Vec<String>>,
    pub list_calls: AtomicU32,
    pub exec_calls: AtomicU32,
    pub log_calls: AtomicU32,
}

impl FakeMesh {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MeshState {
                epoch: 1,
                ..MeshState::default()
            }),
            admin_url: ClusterConfig::default().admin_url,
            restart_after_reads: 2,
            unproxied: BTreeSet::from(["t".to_owned()]),
            broken_proxies: BTreeSet::new(),
            ignored_objects: BTreeSet::new(),
            unreachable: BTreeSet::new(),
            applied: Mutex::new(Vec::new()),
            list_calls: AtomicU32::new(0),
            exec_calls: AtomicU32::new(0),
            log_calls: AtomicU32::new(0),
        }
    }

    /// The first `lists` listings report every instance as `Pending`.
    pub fn with_pending_lists(self, lists: u32) -> Self {
        self.state.lock().unwrap().pending_lists = lists;
        self
    }

    /// `workload`'s proxy never writes its access log.
    pub fn with_broken_proxy(mut self, workload: &str) -> Self {
        self.broken_proxies.insert(workload.to_owned());
        self
    }

    /// Applying `name` is accepted but never reaches the proxies.
    pub fn ignoring(mut self, name: &str) -> Self {
        self.ignored_objects.insert(name.to_owned());
        self
    }

    /// Requests towards `workload` fail as a transport error.
    pub fn with_unreachable(mut self, workload: &str) -> Self {
        self.unreachable.insert(workload.to_owned());
        self
    }

    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    pub fn world_requests(&self) -> u64 {
        self.state.lock().unwrap().world_requests
    }

    pub fn access_log(&self, workload: &str) -> String {
        self.state
            .lock()
            .unwrap()
            .access_logs
            .get(workload)
            .cloned()
            .unwrap_or_default()
    }

    fn read_epoch(&self) -> String {
        let mut state = self.state.lock().unwrap();
        state.restart_countdown = match state.restart_countdown {
            Some(0) => {
                state.epoch += 1;
                None
            }
            Some(n) => Some(n - 1),
            None => None,
        };
        format!("envoy 267724/RELEASE live 1571 1571 {}\n", state.epoch)
    }

    fn answer_world(&self, header: Option<(&str, &str)>) -> WorldAnswer {
        let mut state = self.state.lock().unwrap();
        let routed = header.and_then(|(key, value)| {
            state
                .header_routes
                .iter()
                .find(|r| r.key == key && r.value == value)
                .map(|r| r.version.clone())
        });
        let version = match routed {
            Some(version) => version,
            None => {
                let slot = (state.world_requests % 100) as u32;
                state.world_requests += 1;
                pick_weighted(&state.weighted, slot)
            }
        };

        match state.faults.iter().find(|f| f.version == version) {
            Some(fault) => WorldAnswer::Faulted(fault.delay, fault.status),
            None => WorldAnswer::Served(format!("ServiceVersion={version}\nStatusCode=200\n")),
        }
    }

    fn answer_peer(&self, src: &str, dst: &str, url: &str) -> String {
        let proxies: Vec<&str> = [src, dst]
            .into_iter()
            .filter(|w| !self.unproxied.contains(*w))
            .collect();
        if proxies.is_empty() {
            return "StatusCode=200\n".to_owned();
        }

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("5b1c{:04x}-7e2d-4f3a-9c8b-{:012x}", state.next_id, state.next_id);
        for proxy in proxies {
            if self.broken_proxies.contains(proxy) {
                continue;
            }
            let line = format!("[2026-10-17T09:00:00.000Z] \"GET {url} HTTP/1.1\" 200 - 0 0 1 \"{id}\"\n");
            state
                .access_logs
                .entry(proxy.to_owned())
                .or_default()
                .push_str(&line);
        }
        format!("ServiceVersion=v1\nX-Request-Id={id}\nStatusCode=200\n")
    }

    fn interpret(&self, object: &ConfigObject) {
        let mut state = self.state.lock().unwrap();
        match object.kind {
            ConfigKind::RouteRule => {
                let routes = route_versions(&object.spec);
                match object.spec.pointer("/match/httpHeaders").and_then(Value::as_object) {
                    Some(headers) => {
                        for (key, condition) in headers {
                            let Some(value) = condition.get("exact").and_then(Value::as_str) else {
                                continue;
                            };
                            if let Some((version, _)) = routes.first() {
                                state.header_routes.push(HeaderRoute {
                                    key: key.clone(),
                                    value: value.to_owned(),
                                    version: version.clone(),
                                });
                            }
                        }
                    }
                    None => state.weighted = routes,
                }
            }
            ConfigKind::DestinationPolicy => {
                let policies = object.spec.get("policy").and_then(Value::as_array);
                for policy in policies.into_iter().flatten() {
                    let Some(version) = policy.pointer("/tags/version").and_then(Value::as_str)
                    else {
                        continue;
                    };
                    let delay = policy
                        .pointer("/httpFault/delay/fixedDelaySeconds")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0);
                    let status = policy
                        .pointer("/httpFault/abort/httpStatus")
                        .and_then(Value::as_i64)
                        .unwrap_or(200);
                    state.faults.push(Fault {
                        version: version.to_owned(),
                        delay: Duration::from_secs_f64(delay),
                        status: status as i32,
                    });
                }
            }
        }
        state.restart_countdown = Some(self.restart_after_reads);
    }
}

/// `(version, weight)` pairs of a route rule; a lone route weighs 100.
fn route_versions(spec: &Value) -> Vec<(String, u32)> {
    let routes = spec.get("route").and_then(Value::as_array);
    let routes: Vec<&Value> = routes.into_iter().flatten().collect();
    let default_weight = if routes.len() == 1 { 100 } else { 0 };
    routes
        .into_iter()
        .filter_map(|route| {
            let version = route.pointer("/tags/version")?.as_str()?.to_owned();
            let weight = route
                .get("weight")
                .and_then(Value::as_u64)
                .map_or(default_weight, |w| w as u32);
            Some((version, weight))
        })
        .collect()
}

/// Version for request slot `slot` (0..100). Without a rule the two
/// instances share traffic round-robin.
fn pick_weighted(weighted: &[(String, u32)], slot: u32) -> String {
    if weighted.is_empty() {
        return if slot % 2 == 0 { "v1" } else { "v2" }.to_owned();
    }
    let mut upper = 0;
    for (version, weight) in weighted {
        upper += weight;
        if slot < upper {
            return version.clone();
        }
    }
    weighted[weighted.len() - 1].0.clone()
}

fn host_of(url: &str) -> &str {
    let rest = url.trim_start_matches("http://");
    let end = rest.find(['.', ':', '/']).unwrap_or(rest.len());
    &rest[..end]
}

impl ClusterDriver for FakeMesh {
    async fn list_workloads(&self) -> Result<Vec<WorkloadStatus>, ClusterDriverError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let phase = {
            let mut state = self.state.lock().unwrap();
            if state.pending_lists > 0 {
                state.pending_lists -= 1;
                WorkloadPhase::Pending
            } else {
                WorkloadPhase::Running
            }
        };
        Ok(INSTANCES
            .iter()
            .map(|(workload, instance)| WorkloadStatus {
                workload: Some((*workload).to_owned()),
                instance: (*instance).to_owned(),
                phase,
            })
            .collect())
    }

    async fn exec(
        &self,
        handle: &WorkloadHandle,
        container: &str,
        command: &[String],
    ) -> Result<String, ClusterDriverError> {
        self.exec_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(container, "app", "probes run in the app container");
        let url = command.get(1).map(String::as_str).unwrap_or_default();
        if url == self.admin_url {
            return Ok(self.read_epoch());
        }

        let dst = host_of(url);
        if self.unreachable.contains(dst) {
            return Err(ClusterDriverError::command_failed(
                "kubectl exec",
                "exit status: 1",
                &format!("dial tcp: lookup {dst}: no such host"),
            ));
        }
        if dst != "world" {
            return Ok(self.answer_peer(&handle.workload, dst, url));
        }

        let header = match command.get(2..4) {
            Some([key, value]) => Some((key.as_str(), value.as_str())),
            _ => None,
        };
        match self.answer_world(header) {
            WorldAnswer::Served(body) => Ok(body),
            WorldAnswer::Faulted(delay, status) => {
                tokio::time::sleep(delay).await;
                Ok(format!("StatusCode={status}\n"))
            }
        }
    }

    async fn logs(
        &self,
        handle: &WorkloadHandle,
        container: &str,
    ) -> Result<String, ClusterDriverError> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(container, "proxy", "access logs come from the proxy");
        Ok(self.access_log(&handle.workload))
    }

    async fn apply(&self, object: &ConfigObject) -> Result<(), ClusterDriverError> {
        assert_eq!(object.namespace, "mesh-e2e");
        self.applied.lock().unwrap().push(object.name.clone());
        if !self.ignored_objects.contains(&object.name) {
            self.interpret(object);
        }
        Ok(())
    }
}
