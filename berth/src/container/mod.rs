//! Managed container handle and its lifecycle orchestration.

mod request;
mod state;

pub use request::ContainerRequest;
pub use state::ContainerStatus;

use crate::constants::{DEFAULT_POLL_INTERVAL, DEFAULT_STOP_TIMEOUT};
use crate::errors::{BerthError, BerthResult};
use crate::image::ImageExistsCache;
use crate::ports::BoundPorts;
use crate::runtime::{ContainerId, ContainerSpec, ExecOutput, LogTail, RuntimeClient};
use crate::wait::{TcpWaitStrategy, WaitStrategy, WaitTarget};
use std::sync::Arc;
use std::time::Duration;

/// A container this library created and owns.
///
/// Obtained from [`crate::Berth::start`], already running and ready per
/// its wait strategy. `stop` and `remove` are idempotent; `restart`
/// re-runs the readiness wait and re-resolves ports, so bindings held
/// from before a restart are stale.
pub struct Container {
    id: ContainerId,
    client: Arc<dyn RuntimeClient>,
    host: String,
    status: ContainerStatus,
    ports: BoundPorts,
    wait: Box<dyn WaitStrategy>,
    startup_timeout: Duration,
    stop_timeout: Duration,
    /// Container ports expected to have host bindings once started.
    exposed_ports: Vec<u16>,
}

impl Container {
    /// Resolve image, create, register for reaping, start, resolve ports,
    /// wait for readiness. Any failure after creation force-removes the
    /// partial container before the error propagates.
    pub(crate) async fn launch(
        client: Arc<dyn RuntimeClient>,
        host: String,
        image_cache: &ImageExistsCache,
        mut register_cleanup: impl AsyncFnMut(&ContainerId) -> BerthResult<()>,
        request: ContainerRequest,
        extra_labels: impl IntoIterator<Item = (String, String)>,
    ) -> BerthResult<Self> {
        let ContainerRequest {
            image,
            name,
            cmd,
            entrypoint,
            env,
            mut labels,
            exposed_ports,
            network,
            network_aliases,
            extra_hosts,
            wait,
            startup_timeout,
            auto_pull,
        } = request;

        if auto_pull {
            image_cache
                .ensure_present(&client, &image)
                .await
                .map_err(|e| e.at_stage("image-resolution"))?;
        } else if !image_cache
            .exists(&client, &image)
            .await
            .map_err(|e| e.at_stage("image-resolution"))?
        {
            return Err(BerthError::ImageAbsent(image.canonical()));
        }

        labels.extend(extra_labels);

        let spec = ContainerSpec {
            image: image.canonical(),
            name,
            cmd,
            entrypoint,
            env,
            labels,
            exposed_ports: exposed_ports.clone(),
            network,
            network_aliases,
            binds: Vec::new(),
            extra_hosts,
        };

        tracing::info!(image = %image, "creating container");
        let id = client
            .create(&spec)
            .await
            .map_err(|e| e.at_stage("create"))?;

        let mut container = Self {
            id,
            client,
            host,
            status: ContainerStatus::Created,
            ports: BoundPorts::default(),
            wait: wait.unwrap_or_else(|| {
                Box::new(TcpWaitStrategy::new().with_startup_timeout(startup_timeout))
            }),
            startup_timeout,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            exposed_ports,
        };

        // The reaper filter goes in before start: if this process dies
        // mid-start, the sidecar still sweeps the container.
        if let Err(e) = register_cleanup(&container.id).await {
            container.cleanup_after_failed_start().await;
            return Err(e.at_stage("reaper-registration"));
        }

        if let Err(e) = container.boot().await {
            container.cleanup_after_failed_start().await;
            return Err(e);
        }

        Ok(container)
    }

    async fn boot(&mut self) -> BerthResult<()> {
        self.status.advance(ContainerStatus::Starting)?;
        self.client
            .start(&self.id)
            .await
            .map_err(|e| e.at_stage("start"))?;
        self.settle().await
    }

    /// Resolve ports and run the wait strategy after a (re)start.
    async fn settle(&mut self) -> BerthResult<()> {
        self.ports = self
            .resolve_ports()
            .await
            .map_err(|e| e.at_stage("port-resolution"))?;

        let target = WaitTarget {
            client: self.client.clone(),
            id: self.id.clone(),
            host: self.host.clone(),
            ports: self.ports.clone(),
        };
        tracing::debug!(container = %self.id.short(), strategy = self.wait.name(), "waiting for readiness");
        self.wait
            .wait_until_ready(&target)
            .await
            .map_err(|e| e.at_stage("wait"))?;

        self.status.advance(ContainerStatus::Running)?;
        tracing::info!(container = %self.id.short(), "container ready");
        Ok(())
    }

    /// Published host ports can lag a moment behind start on some
    /// daemons, so retry briefly until every exposed port has a binding.
    async fn resolve_ports(&self) -> BerthResult<BoundPorts> {
        let deadline = tokio::time::Instant::now() + self.startup_timeout.min(Duration::from_secs(5));
        loop {
            let inspect = self.client.inspect(&self.id).await?;
            let ports = BoundPorts::from_inspect(&inspect, &self.host);
            let complete = self
                .exposed_ports
                .iter()
                .all(|&p| ports.get(p, crate::ports::PortProtocol::Tcp).is_some());
            if complete || tokio::time::Instant::now() >= deadline {
                return Ok(ports);
            }
            tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
        }
    }

    async fn cleanup_after_failed_start(&self) {
        if let Err(e) = self.client.remove(&self.id, true).await {
            tracing::warn!(container = %self.id.short(), error = %e, "failed to remove container after startup failure");
        }
    }

    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    /// Hostname clients should dial to reach this container's ports.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn status(&self) -> ContainerStatus {
        self.status
    }

    /// Resolved port bindings as of the last (re)start.
    pub fn ports(&self) -> &BoundPorts {
        &self.ports
    }

    /// Host port published for a container TCP port.
    pub fn host_port(&self, container_port: u16) -> BerthResult<u16> {
        self.ports.host_port(container_port)
    }

    pub async fn logs(&self, tail: LogTail) -> BerthResult<Vec<String>> {
        self.client.logs(&self.id, tail).await
    }

    pub async fn exec(
        &self,
        cmd: impl IntoIterator<Item = impl Into<String>>,
    ) -> BerthResult<ExecOutput> {
        let cmd: Vec<String> = cmd.into_iter().map(Into::into).collect();
        self.client.exec(&self.id, &cmd).await
    }

    /// Graceful stop. A second stop (or stopping an already-gone
    /// container) is a no-op.
    pub async fn stop(&mut self) -> BerthResult<()> {
        if matches!(
            self.status,
            ContainerStatus::Stopped | ContainerStatus::Exited | ContainerStatus::Removed
        ) {
            return Ok(());
        }
        self.client.stop(&self.id, self.stop_timeout).await?;
        self.status.advance(ContainerStatus::Stopped)?;
        tracing::info!(container = %self.id.short(), "container stopped");
        Ok(())
    }

    /// Restart and wait for readiness again. Port bindings are
    /// re-resolved; anything cached from before is invalid.
    pub async fn restart(&mut self) -> BerthResult<()> {
        if self.status.is_terminal() {
            return Err(BerthError::InvalidState(
                "cannot restart a removed container".to_string(),
            ));
        }
        tracing::info!(container = %self.id.short(), "restarting container");
        self.status.advance(ContainerStatus::Starting)?;
        self.ports = BoundPorts::default();

        self.client
            .restart(&self.id)
            .await
            .map_err(|e| e.at_stage("start"))?;
        self.settle().await
    }

    /// Force-remove. Idempotent; the handle is unusable afterwards.
    pub async fn remove(&mut self) -> BerthResult<()> {
        if self.status.is_terminal() {
            return Ok(());
        }
        self.client.remove(&self.id, true).await?;
        self.status.advance(ContainerStatus::Removed)?;
        tracing::info!(container = %self.id.short(), "container removed");
        Ok(())
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("status", &self.status)
            .field("ports", &self.ports.len())
            .finish_non_exhaustive()
    }
}
