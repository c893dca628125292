//! Resource reaper sidecar.
//!
//! A ryuk-compatible container that deletes everything matching the
//! registered label filters once this process's connection to it drops.
//! That covers hard kills of the test process, which in-process cleanup
//! cannot.
//!
//! Wire protocol, line-oriented over TCP: send `label=<k>=<v>\n`, the
//! sidecar answers `ACK\n`.

use crate::constants::{
    self, REAPER_PORT, SIDECAR_CONNECT_TIMEOUT, envs, labels,
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

struct ReaperConnection {
    stream: BufStream<TcpStream>,
    registered: HashSet<(String, String)>,
}

/// Lazily started cleanup sidecar for one session.
pub struct Reaper {
    session_id: String,
    image: String,
    disabled: bool,
    state: Mutex<Option<ReaperConnection>>,
}

impl Reaper {
    pub(crate) fn new(session_id: String, image: Option<String>, disabled: bool) -> Self {
        let image = image
            .or_else(|| std::env::var(envs::REAPER_IMAGE).ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| constants::DEFAULT_REAPER_IMAGE.to_string());
        let disabled = disabled
            || std::env::var(envs::REAPER_DISABLED).is_ok_and(|v| v == "1" || v == "true");
        Self {
            session_id,
            image,
            disabled,
            state: Mutex::new(None),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Register a label filter, starting the sidecar on first use.
    ///
    /// Idempotent per filter; duplicate registrations are collapsed so
    /// each filter is sent to the sidecar exactly once.
    pub async fn register(
        &self,
        client: &Arc<dyn RuntimeClient>,
        host: &str,
        key: &str,
        value: &str,
    ) -> BerthResult<()> {
        if self.disabled {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        if state.is_none() {
            *state = Some(self.start_sidecar(client, host).await?);
        }
        let conn = state
            .as_mut()
            .ok_or_else(|| BerthError::Reaper("sidecar connection missing".to_string()))?;

        let filter = (key.to_string(), value.to_string());
        if conn.registered.contains(&filter) {
            return Ok(());
        }

        let line = format!("label={key}={value}\n");
        conn.stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| BerthError::Reaper(format!("writing filter: {e}")))?;
        conn.stream
            .flush()
            .await
            .map_err(|e| BerthError::Reaper(format!("flushing filter: {e}")))?;

        let mut reply = String::new();
        conn.stream
            .read_line(&mut reply)
            .await
            .map_err(|e| BerthError::Reaper(format!("reading ack: {e}")))?;
        if reply.trim() != "ACK" {
            return Err(BerthError::Reaper(format!(
                "unexpected reply to filter registration: {reply:?}"
            )));
        }

        tracing::debug!(key, value, "reaper filter registered");
        conn.registered.insert(filter);
        Ok(())
    }

    /// Register the whole-session filter. Called once at session setup so
    /// everything stamped with the session id is reaped on disconnect.
    pub async fn register_session(
        &self,
        client: &Arc<dyn RuntimeClient>,
        host: &str,
    ) -> BerthResult<()> {
        self.register(client, host, labels::SESSION_ID, &self.session_id)
            .await
    }

    /// Drop the control connection, triggering cleanup sidecar-side.
    pub async fn disconnect(&self) {
        if self.state.lock().await.take().is_some() {
            tracing::debug!("reaper connection closed, sidecar will sweep");
        }
    }

    async fn start_sidecar(
        &self,
        client: &Arc<dyn RuntimeClient>,
        host: &str,
    ) -> BerthResult<ReaperConnection> {
        tracing::info!(image = %self.image, "starting reaper sidecar");

        let image: crate::image::ImageName = self.image.parse()?;
        if !client.inspect_image(&image).await? {
            client.pull(&image).await?;
        }

        // The sidecar carries its own marker label but never the session
        // label: it must outlive the things it sweeps.
        let mut sidecar_labels = HashMap::new();
        sidecar_labels.insert(labels::REAPER.to_string(), "true".to_string());

        let spec = ContainerSpec {
            image: self.image.clone(),
            labels: sidecar_labels,
            exposed_ports: vec![REAPER_PORT],
            binds: vec!["/var/run/docker.sock:/var/run/docker.sock".to_string()],
            ..Default::default()
        };

        let id = client.create(&spec).await?;
        if let Err(e) = client.start(&id).await {
            let _ = client.remove(&id, true).await;
            return Err(e);
        }

        let control_port = match resolve_control_port(client, &id).await {
            Ok(port) => port,
            Err(e) => {
                let _ = client.remove(&id, true).await;
                return Err(e);
            }
        };

        match connect_with_retry(host, control_port, SIDECAR_CONNECT_TIMEOUT).await {
            Ok(stream) => {
                tracing::debug!(container = %id.short(), port = control_port, "reaper control channel up");
                Ok(ReaperConnection {
                    stream: BufStream::new(stream),
                    registered: HashSet::new(),
                })
            }
            Err(e) => {
                let _ = client.remove(&id, true).await;
                Err(e)
            }
        }
    }
}

async fn resolve_control_port(
    client: &Arc<dyn RuntimeClient>,
    id: &ContainerId,
) -> BerthResult<u16> {
    let inspect = client.inspect(id).await?;
    inspect
        .ports
        .get(&format!("{REAPER_PORT}/tcp"))
        .and_then(|live| live.first())
        .map(|b| b.host_port)
        .ok_or(BerthError::PortNotBound(REAPER_PORT))
}

/// Dial until the sidecar accepts or the budget runs out. The sidecar
/// needs a moment after start before it listens.
async fn connect_with_retry(host: &str, port: u16, budget: Duration) -> BerthResult<TcpStream> {
    let deadline = Instant::now() + budget;
    loop {
        match TcpStream::connect((host, port)).await {
            Ok(stream) => return Ok(stream),
            Err(e) if Instant::now() < deadline => {
                tracing::trace!(host, port, error = %e, "reaper not accepting yet");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(e) => {
                return Err(BerthError::Reaper(format!(
                    "sidecar control channel unreachable at {host}:{port}: {e}"
                )));
            }
        }
    }
}
