//! Host-port tunnel sidecar.
//!
//! Lets code inside containers reach ports bound on the host machine via
//! the `host.berth.internal` alias. A tunnel container is started lazily;
//! its control channel accepts `FORWARD <port> <alias>\n` lines and
//! answers `OK\n` per accepted forward. The tunnel joins each container
//! network under the alias so in-network DNS resolves it.

use crate::constants::{
    self, HOST_ALIAS, SIDECAR_CONNECT_TIMEOUT, TUNNEL_CONTROL_PORT, envs, labels,
};
use crate::errors::{BerthError, BerthResult};
use crate::runtime::{ContainerId, ContainerSpec, RuntimeClient};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct TunnelState {
    container: ContainerId,
    /// Tunnel address on the default bridge, for extra-host entries.
    ip: Option<String>,
    stream: BufStream<TcpStream>,
    exposed: HashSet<u16>,
    networks: HashSet<String>,
}

/// Lazily started host-port tunnel for one session.
pub struct PortForwarder {
    session_id: String,
    image: String,
    state: Mutex<Option<TunnelState>>,
}

impl PortForwarder {
    pub(crate) fn new(session_id: String, image: Option<String>) -> Self {
        let image = image
            .or_else(|| std::env::var(envs::TUNNEL_IMAGE).ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| constants::DEFAULT_TUNNEL_IMAGE.to_string());
        Self {
            session_id,
            image,
            state: Mutex::new(None),
        }
    }

    /// Whether the tunnel container is running.
    pub async fn is_active(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// `hostname:ip` entry pointing [`HOST_ALIAS`] at the tunnel, for
    /// containers on the default network where no alias DNS exists.
    /// `None` while the tunnel is not running.
    pub async fn host_alias_entry(&self) -> Option<String> {
        let state = self.state.lock().await;
        let tunnel = state.as_ref()?;
        tunnel.ip.as_ref().map(|ip| format!("{HOST_ALIAS}:{ip}"))
    }

    /// Make the given host ports reachable from containers under
    /// [`HOST_ALIAS`]. Starts the tunnel on first use; ports already
    /// forwarded are skipped.
    pub async fn expose_host_ports(
        &self,
        client: &Arc<dyn RuntimeClient>,
        host: &str,
        ports: &[u16],
    ) -> BerthResult<()> {
        let mut state = self.state.lock().await;
        if state.is_none() {
            *state = Some(self.start_tunnel(client, host).await?);
        }
        let tunnel = state
            .as_mut()
            .ok_or_else(|| BerthError::Forwarder("tunnel connection missing".to_string()))?;

        for &port in ports {
            if tunnel.exposed.contains(&port) {
                continue;
            }

            let line = format!("FORWARD {port} {HOST_ALIAS}\n");
            tunnel
                .stream
                .write_all(line.as_bytes())
                .await
                .map_err(|e| BerthError::Forwarder(format!("writing forward request: {e}")))?;
            tunnel
                .stream
                .flush()
                .await
                .map_err(|e| BerthError::Forwarder(format!("flushing forward request: {e}")))?;

            let mut reply = String::new();
            tunnel
                .stream
                .read_line(&mut reply)
                .await
                .map_err(|e| BerthError::Forwarder(format!("reading forward reply: {e}")))?;
            if reply.trim() != "OK" {
                return Err(BerthError::Forwarder(format!(
                    "tunnel rejected forward of port {port}: {reply:?}"
                )));
            }

            tracing::debug!(port, "host port exposed to containers");
            tunnel.exposed.insert(port);
        }
        Ok(())
    }

    /// Join the tunnel container to a network under the host alias so
    /// containers on that network can resolve it. Idempotent per network;
    /// a no-op while the tunnel is not running.
    pub async fn join_network(
        &self,
        client: &Arc<dyn RuntimeClient>,
        network: &str,
    ) -> BerthResult<()> {
        let mut state = self.state.lock().await;
        let Some(tunnel) = state.as_mut() else {
            return Ok(());
        };
        if tunnel.networks.contains(network) {
            return Ok(());
        }

        client
            .connect_network(
                &tunnel.container,
                network,
                &[HOST_ALIAS.to_string()],
            )
            .await?;
        tracing::debug!(network, "tunnel joined network");
        tunnel.networks.insert(network.to_string());
        Ok(())
    }

    async fn start_tunnel(
        &self,
        client: &Arc<dyn RuntimeClient>,
        host: &str,
    ) -> BerthResult<TunnelState> {
        tracing::info!(image = %self.image, "starting host-port tunnel");

        let image: crate::image::ImageName = self.image.parse()?;
        if !client.inspect_image(&image).await? {
            client.pull(&image).await?;
        }

        let mut tunnel_labels = HashMap::new();
        tunnel_labels.insert(labels::TUNNEL.to_string(), "true".to_string());
        tunnel_labels.insert(labels::SESSION_ID.to_string(), self.session_id.clone());
        tunnel_labels.insert(labels::MANAGED.to_string(), "true".to_string());

        let spec = ContainerSpec {
            image: self.image.clone(),
            labels: tunnel_labels,
            exposed_ports: vec![TUNNEL_CONTROL_PORT],
            ..Default::default()
        };

        let id = client.create(&spec).await?;
        if let Err(e) = client.start(&id).await {
            let _ = client.remove(&id, true).await;
            return Err(e);
        }

        let (control_port, ip) = match resolve_tunnel_endpoint(client, &id).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                let _ = client.remove(&id, true).await;
                return Err(e);
            }
        };

        match connect_with_retry(host, control_port, SIDECAR_CONNECT_TIMEOUT).await {
            Ok(stream) => {
                tracing::debug!(container = %id.short(), port = control_port, "tunnel control channel up");
                Ok(TunnelState {
                    container: id,
                    ip,
                    stream: BufStream::new(stream),
                    exposed: HashSet::new(),
                    networks: HashSet::new(),
                })
            }
            Err(e) => {
                let _ = client.remove(&id, true).await;
                Err(e)
            }
        }
    }
}

/// Host-side control port and container-side address of the tunnel.
async fn resolve_tunnel_endpoint(
    client: &Arc<dyn RuntimeClient>,
    id: &ContainerId,
) -> BerthResult<(u16, Option<String>)> {
    let inspect = client.inspect(id).await?;
    let control_port = inspect
        .ports
        .get(&format!("{TUNNEL_CONTROL_PORT}/tcp"))
        .and_then(|live| live.first())
        .map(|b| b.host_port)
        .ok_or(BerthError::PortNotBound(TUNNEL_CONTROL_PORT))?;
    Ok((control_port, inspect.ip_address))
}

async fn connect_with_retry(host: &str, port: u16, budget: Duration) -> BerthResult<TcpStream> {
    let deadline = Instant::now() + budget;
    loop {
        match TcpStream::connect((host, port)).await {
            Ok(stream) => return Ok(stream),
            Err(e) if Instant::now() < deadline => {
                tracing::trace!(host, port, error = %e, "tunnel not accepting yet");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(e) => {
                return Err(BerthError::Forwarder(format!(
                    "tunnel control channel unreachable at {host}:{port}: {e}"
                )));
            }
        }
    }
}
