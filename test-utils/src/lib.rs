//! Scripted in-memory runtime for exercising lifecycle and wait logic
//! without a daemon.
//!
//! Container ids are deterministic (`mock-1`, `mock-2`, ...) so tests can
//! script behavior for containers before they exist. Scripted queues are
//! sticky: once drained to their last element, that element repeats.

use async_trait::async_trait;
use berth::{
    BerthError, BerthResult, ContainerId, ContainerInspect, ContainerSpec, ExecOutput,
    HealthStatus, HostBinding, ImageName, LogTail, RuntimeClient, RuntimeInfo, RuntimeSession,
    RuntimeStatus,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Install a compact subscriber honoring `RUST_LOG`, writing through the
/// test harness capture. Safe to call from every test; only the first
/// call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Outcome of one scripted image existence probe.
#[derive(Debug, Clone)]
pub enum ImageProbe {
    Exists,
    Absent,
    /// Unexpected daemon-side failure, e.g. a 500.
    Fails(String),
}

type PortsMap = HashMap<String, Vec<HostBinding>>;

struct ContainerRecord {
    spec: ContainerSpec,
    running: bool,
    stopped: bool,
}

#[derive(Default)]
struct MockState {
    containers: HashMap<String, ContainerRecord>,
    statuses: HashMap<String, VecDeque<RuntimeStatus>>,
    exit_codes: HashMap<String, i64>,
    health: HashMap<String, VecDeque<HealthStatus>>,
    logs: HashMap<String, Vec<String>>,
    execs: HashMap<String, VecDeque<ExecOutput>>,
    port_plans: HashMap<String, VecDeque<PortsMap>>,
    current_ports: HashMap<String, PortsMap>,
    image_probes: HashMap<String, VecDeque<ImageProbe>>,
    image_probe_counts: HashMap<String, u32>,
    pulled: Vec<String>,
    started: Vec<String>,
    stopped: Vec<String>,
    restarted: Vec<String>,
    removed: Vec<(String, bool)>,
    networks_created: Vec<String>,
    networks_removed: Vec<String>,
    network_connections: Vec<(String, String, Vec<String>)>,
    next_container: u32,
    next_network: u32,
    next_host_port: u16,
}

/// In-memory [`RuntimeClient`] with scripted responses.
pub struct MockRuntime {
    state: Mutex<MockState>,
    probe_delay: Mutex<Option<Duration>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_host_port: 32768,
                ..Default::default()
            }),
            probe_delay: Mutex::new(None),
        }
    }

    /// The id the nth created container receives (1-based).
    pub fn nth_id(n: u32) -> ContainerId {
        ContainerId::new(format!("mock-{n}"))
    }

    /// Wrap this mock in a resolved session with host `localhost`.
    pub fn into_session(self: Arc<Self>) -> Arc<RuntimeSession> {
        let info = RuntimeInfo {
            description: "mock".to_string(),
            host: "localhost".to_string(),
            rootless: false,
        };
        Arc::new(RuntimeSession::with_client(self, info))
    }

    // ------------------------------------------------------------------
    // Scripting
    // ------------------------------------------------------------------

    /// Script the inspect statuses for a container, sticky on the last.
    pub fn script_status(&self, id: &ContainerId, statuses: impl IntoIterator<Item = RuntimeStatus>) {
        self.state
            .lock()
            .statuses
            .insert(id.to_string(), statuses.into_iter().collect());
    }

    /// Make the container report exited with the given code.
    pub fn script_exited(&self, id: &ContainerId, exit_code: i64) {
        let mut state = self.state.lock();
        state
            .statuses
            .insert(id.to_string(), VecDeque::from([RuntimeStatus::Exited]));
        state.exit_codes.insert(id.to_string(), exit_code);
    }

    pub fn script_health(&self, id: &ContainerId, health: impl IntoIterator<Item = HealthStatus>) {
        self.state
            .lock()
            .health
            .insert(id.to_string(), health.into_iter().collect());
    }

    pub fn script_logs(&self, id: &ContainerId, lines: Vec<String>) {
        self.state.lock().logs.insert(id.to_string(), lines);
    }

    pub fn script_exec(&self, id: &ContainerId, outputs: impl IntoIterator<Item = ExecOutput>) {
        self.state
            .lock()
            .execs
            .insert(id.to_string(), outputs.into_iter().collect());
    }

    /// Script the port map handed out on each (re)start, sticky on the
    /// last plan.
    pub fn script_ports(&self, id: &ContainerId, plans: Vec<PortsMap>) {
        self.state
            .lock()
            .port_plans
            .insert(id.to_string(), plans.into());
    }

    /// Script existence probe outcomes for an image (canonical name),
    /// sticky on the last.
    pub fn script_image(&self, image: &str, probes: impl IntoIterator<Item = ImageProbe>) {
        self.state
            .lock()
            .image_probes
            .insert(image.to_string(), probes.into_iter().collect());
    }

    /// Delay every image probe, to widen race windows in tests.
    pub fn set_probe_delay(&self, delay: Duration) {
        *self.probe_delay.lock() = Some(delay);
    }

    // ------------------------------------------------------------------
    // Assertions
    // ------------------------------------------------------------------

    pub fn image_probe_count(&self, image: &str) -> u32 {
        self.state
            .lock()
            .image_probe_counts
            .get(image)
            .copied()
            .unwrap_or(0)
    }

    pub fn pulled_images(&self) -> Vec<String> {
        self.state.lock().pulled.clone()
    }

    pub fn created_count(&self) -> u32 {
        self.state.lock().next_container
    }

    pub fn created_spec(&self, id: &ContainerId) -> Option<ContainerSpec> {
        self.state
            .lock()
            .containers
            .get(id.as_str())
            .map(|r| r.spec.clone())
    }

    pub fn started_ids(&self) -> Vec<String> {
        self.state.lock().started.clone()
    }

    pub fn stopped_ids(&self) -> Vec<String> {
        self.state.lock().stopped.clone()
    }

    pub fn restarted_ids(&self) -> Vec<String> {
        self.state.lock().restarted.clone()
    }

    pub fn removed_ids(&self) -> Vec<(String, bool)> {
        self.state.lock().removed.clone()
    }

    pub fn created_networks(&self) -> Vec<String> {
        self.state.lock().networks_created.clone()
    }

    pub fn removed_networks(&self) -> Vec<String> {
        self.state.lock().networks_removed.clone()
    }

    pub fn network_connections(&self) -> Vec<(String, String, Vec<String>)> {
        self.state.lock().network_connections.clone()
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Pop the front of a sticky queue: drains to the last element, then
/// repeats it.
fn pop_sticky<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

fn assign_ports(state: &mut MockState, id: &str) {
    let plan = state
        .port_plans
        .get_mut(id)
        .and_then(pop_sticky);
    let ports = match plan {
        Some(plan) => plan,
        None => {
            // Ephemeral auto-assignment, fresh ports on every (re)start.
            let exposed = state
                .containers
                .get(id)
                .map(|r| r.spec.exposed_ports.clone())
                .unwrap_or_default();
            let mut map = PortsMap::new();
            for port in exposed {
                let host_port = state.next_host_port;
                state.next_host_port += 1;
                map.insert(
                    format!("{port}/tcp"),
                    vec![HostBinding {
                        host_ip: "0.0.0.0".to_string(),
                        host_port,
                    }],
                );
            }
            map
        }
    };
    state.current_ports.insert(id.to_string(), ports);
}

#[async_trait]
impl RuntimeClient for MockRuntime {
    async fn ping(&self) -> BerthResult<()> {
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> BerthResult<ContainerId> {
        let mut state = self.state.lock();
        state.next_container += 1;
        let id = format!("mock-{}", state.next_container);
        state.containers.insert(
            id.clone(),
            ContainerRecord {
                spec: spec.clone(),
                running: false,
                stopped: false,
            },
        );
        Ok(ContainerId::new(id))
    }

    async fn start(&self, id: &ContainerId) -> BerthResult<()> {
        let mut state = self.state.lock();
        state.started.push(id.to_string());
        if let Some(record) = state.containers.get_mut(id.as_str()) {
            record.running = true;
            record.stopped = false;
        }
        assign_ports(&mut state, id.as_str());
        Ok(())
    }

    async fn stop(&self, id: &ContainerId, _timeout: Duration) -> BerthResult<()> {
        let mut state = self.state.lock();
        state.stopped.push(id.to_string());
        if let Some(record) = state.containers.get_mut(id.as_str()) {
            record.running = false;
            record.stopped = true;
        }
        Ok(())
    }

    async fn restart(&self, id: &ContainerId) -> BerthResult<()> {
        let mut state = self.state.lock();
        state.restarted.push(id.to_string());
        if let Some(record) = state.containers.get_mut(id.as_str()) {
            record.running = true;
            record.stopped = false;
        }
        assign_ports(&mut state, id.as_str());
        Ok(())
    }

    async fn remove(&self, id: &ContainerId, force: bool) -> BerthResult<()> {
        let mut state = self.state.lock();
        state.removed.push((id.to_string(), force));
        state.containers.remove(id.as_str());
        Ok(())
    }

    async fn inspect(&self, id: &ContainerId) -> BerthResult<ContainerInspect> {
        let mut state = self.state.lock();
        let status = state
            .statuses
            .get_mut(id.as_str())
            .and_then(pop_sticky)
            .unwrap_or_else(|| match state.containers.get(id.as_str()) {
                Some(record) if record.running => RuntimeStatus::Running,
                Some(record) if record.stopped => RuntimeStatus::Exited,
                Some(_) => RuntimeStatus::Created,
                // Unknown ids default to running so waits keep polling.
                None => RuntimeStatus::Running,
            });
        let health = state.health.get_mut(id.as_str()).and_then(pop_sticky);
        let exit_code = state.exit_codes.get(id.as_str()).copied();
        let ports = state
            .current_ports
            .get(id.as_str())
            .cloned()
            .unwrap_or_default();
        Ok(ContainerInspect {
            status,
            exit_code,
            health,
            ip_address: Some("172.17.0.2".to_string()),
            ports,
        })
    }

    async fn logs(&self, id: &ContainerId, tail: LogTail) -> BerthResult<Vec<String>> {
        let state = self.state.lock();
        let lines = state.logs.get(id.as_str()).cloned().unwrap_or_default();
        Ok(match tail {
            LogTail::All => lines,
            LogTail::Last(n) => {
                let skip = lines.len().saturating_sub(n as usize);
                lines[skip..].to_vec()
            }
        })
    }

    async fn exec(&self, id: &ContainerId, _cmd: &[String]) -> BerthResult<ExecOutput> {
        let mut state = self.state.lock();
        Ok(state
            .execs
            .get_mut(id.as_str())
            .and_then(pop_sticky)
            .unwrap_or_default())
    }

    async fn inspect_image(&self, image: &ImageName) -> BerthResult<bool> {
        let delay = *self.probe_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        let key = image.canonical();
        *state.image_probe_counts.entry(key.clone()).or_insert(0) += 1;
        let probe = state
            .image_probes
            .get_mut(&key)
            .and_then(pop_sticky)
            .unwrap_or(ImageProbe::Exists);
        match probe {
            ImageProbe::Exists => Ok(true),
            ImageProbe::Absent => Ok(false),
            ImageProbe::Fails(message) => Err(BerthError::ImageInspect {
                image: key,
                message,
            }),
        }
    }

    async fn pull(&self, image: &ImageName) -> BerthResult<()> {
        self.state.lock().pulled.push(image.canonical());
        Ok(())
    }

    async fn create_network(
        &self,
        name: &str,
        _labels: &HashMap<String, String>,
    ) -> BerthResult<String> {
        let mut state = self.state.lock();
        state.next_network += 1;
        state.networks_created.push(name.to_string());
        Ok(format!("net-{}", state.next_network))
    }

    async fn remove_network(&self, name: &str) -> BerthResult<()> {
        self.state.lock().networks_removed.push(name.to_string());
        Ok(())
    }

    async fn connect_network(
        &self,
        id: &ContainerId,
        network: &str,
        aliases: &[String],
    ) -> BerthResult<()> {
        self.state.lock().network_connections.push((
            id.to_string(),
            network.to_string(),
            aliases.to_vec(),
        ));
        Ok(())
    }
}
