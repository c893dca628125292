//! Fluent container configuration.

use crate::constants::DEFAULT_STARTUP_TIMEOUT;
use crate::image::ImageName;
use crate::wait::WaitStrategy;
use std::collections::HashMap;
use std::time::Duration;

/// What to run and how to know it is ready.
///
/// Built fluently and handed to [`crate::Berth::start`]. Without an
/// explicit wait strategy the container is considered ready once all its
/// exposed TCP ports accept connections.
pub struct ContainerRequest {
    pub(crate) image: ImageName,
    pub(crate) name: Option<String>,
    pub(crate) cmd: Option<Vec<String>>,
    pub(crate) entrypoint: Option<Vec<String>>,
    pub(crate) env: Vec<String>,
    pub(crate) labels: HashMap<String, String>,
    pub(crate) exposed_ports: Vec<u16>,
    pub(crate) network: Option<String>,
    pub(crate) network_aliases: Vec<String>,
    pub(crate) extra_hosts: Vec<String>,
    pub(crate) wait: Option<Box<dyn WaitStrategy>>,
    pub(crate) startup_timeout: Duration,
    pub(crate) auto_pull: bool,
}

impl ContainerRequest {
    pub fn new(image: ImageName) -> Self {
        Self {
            image,
            name: None,
            cmd: None,
            entrypoint: None,
            env: Vec::new(),
            labels: HashMap::new(),
            exposed_ports: Vec::new(),
            network: None,
            network_aliases: Vec::new(),
            extra_hosts: Vec::new(),
            wait: None,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            auto_pull: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_cmd(mut self, cmd: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cmd = Some(cmd.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_entrypoint(
        mut self,
        entrypoint: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.entrypoint = Some(entrypoint.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .push(format!("{}={}", key.as_ref(), value.as_ref()));
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Publish a container TCP port to an ephemeral host port.
    pub fn with_exposed_port(mut self, port: u16) -> Self {
        if !self.exposed_ports.contains(&port) {
            self.exposed_ports.push(port);
        }
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// DNS alias for this container on its network.
    pub fn with_network_alias(mut self, alias: impl Into<String>) -> Self {
        self.network_aliases.push(alias.into());
        self
    }

    /// Extra `/etc/hosts` entry inside the container.
    pub fn with_extra_host(mut self, hostname: impl AsRef<str>, ip: impl AsRef<str>) -> Self {
        self.extra_hosts
            .push(format!("{}:{}", hostname.as_ref(), ip.as_ref()));
        self
    }

    pub fn with_wait(mut self, strategy: impl WaitStrategy + 'static) -> Self {
        self.wait = Some(Box::new(strategy));
        self
    }

    /// Overall readiness deadline for the start.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Fail on a locally missing image instead of pulling it.
    pub fn without_auto_pull(mut self) -> Self {
        self.auto_pull = false;
        self
    }
}

impl std::fmt::Debug for ContainerRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerRequest")
            .field("image", &self.image)
            .field("name", &self.name)
            .field("exposed_ports", &self.exposed_ports)
            .field("network", &self.network)
            .field("has_wait", &self.wait.is_some())
            .field("startup_timeout", &self.startup_timeout)
            .finish_non_exhaustive()
    }
}
