//! Plain data types exchanged with the runtime client.

use std::collections::HashMap;
use std::fmt;

/// Opaque daemon-side container identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines, mirroring the daemon's own display.
    pub fn short(&self) -> &str {
        let mut end = self.0.len().min(12);
        // Ids from a daemon are hex, but injected ones need not be.
        while !self.0.is_char_boundary(end) {
            end -= 1;
        }
        &self.0[..end]
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Daemon-reported container state, as inspect returns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
}

impl RuntimeStatus {
    pub fn has_exited(&self) -> bool {
        matches!(self, RuntimeStatus::Exited | RuntimeStatus::Dead)
    }
}

/// Daemon-reported health-check state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Starting,
    Healthy,
    Unhealthy,
    None,
}

/// One live host-side binding of a container port, exactly as the daemon
/// reported it (unresolved host ip, may be a wildcard).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBinding {
    pub host_ip: String,
    pub host_port: u16,
}

/// Snapshot of a container's inspect result, reduced to the fields the
/// core consumes.
#[derive(Debug, Clone)]
pub struct ContainerInspect {
    pub status: RuntimeStatus,
    pub exit_code: Option<i64>,
    pub health: Option<HealthStatus>,
    pub ip_address: Option<String>,
    /// Raw port map keyed by `"<port>/<proto>"`, e.g. `"80/tcp"`.
    pub ports: HashMap<String, Vec<HostBinding>>,
}

/// How much of the log stream to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTail {
    All,
    Last(u32),
}

/// Captured output of a command executed inside a container.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

/// Creation parameters handed to the daemon.
///
/// Deliberately flat: the fluent configuration surface lives in
/// [`crate::ContainerRequest`]; this is the wire-shaped remainder.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub image: String,
    pub name: Option<String>,
    pub cmd: Option<Vec<String>>,
    pub entrypoint: Option<Vec<String>>,
    /// `KEY=VALUE` pairs.
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Container-internal TCP ports published to ephemeral host ports.
    pub exposed_ports: Vec<u16>,
    pub network: Option<String>,
    pub network_aliases: Vec<String>,
    /// Host bind mounts, `host:container` form. Used by the sidecars.
    pub binds: Vec<String>,
    /// Extra `/etc/hosts` entries, `hostname:ip` form.
    pub extra_hosts: Vec<String>,
}
