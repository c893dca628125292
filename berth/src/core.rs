//! Session entry point.
//!
//! A [`Berth`] is one test-process session: a shared runtime client, an
//! image existence cache, a session id stamped on every created resource,
//! and the two lazy sidecars (reaper, host-port tunnel).

use crate::constants::labels;
use crate::container::{Container, ContainerRequest};
use crate::errors::BerthResult;
use crate::forwarder::PortForwarder;
use crate::image::ImageExistsCache;
use crate::reaper::Reaper;
use crate::runtime::{ContainerId, RuntimeClient, RuntimeSession};
use std::collections::HashMap;
use std::sync::Arc;

/// Session-level knobs. `Default` reads the environment overrides.
#[derive(Debug, Clone, Default)]
pub struct BerthOptions {
    /// Skip the reaper sidecar entirely. Cleanup then relies on explicit
    /// `stop`/`remove` calls surviving the test process.
    pub reaper_disabled: bool,
    /// Override the reaper sidecar image.
    pub reaper_image: Option<String>,
    /// Override the host-port tunnel image.
    pub tunnel_image: Option<String>,
}

/// One session against one container runtime.
pub struct Berth {
    session: Arc<RuntimeSession>,
    session_id: String,
    image_cache: ImageExistsCache,
    reaper: Reaper,
    forwarder: PortForwarder,
}

impl Berth {
    /// Connect using the process-wide shared runtime session.
    pub async fn connect() -> BerthResult<Self> {
        let session = RuntimeSession::default_session().await?;
        Self::with_session(session, BerthOptions::default()).await
    }

    pub async fn with_options(options: BerthOptions) -> BerthResult<Self> {
        let session = RuntimeSession::default_session().await?;
        Self::with_session(session, options).await
    }

    /// Build a session around an already-resolved runtime session.
    pub async fn with_session(
        session: Arc<RuntimeSession>,
        options: BerthOptions,
    ) -> BerthResult<Self> {
        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(session_id = %session_id, endpoint = %session.info().description, "session created");

        let reaper = Reaper::new(
            session_id.clone(),
            options.reaper_image,
            options.reaper_disabled,
        );
        let forwarder = PortForwarder::new(session_id.clone(), options.tunnel_image);

        Ok(Self {
            session,
            session_id,
            image_cache: ImageExistsCache::new(),
            reaper,
            forwarder,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn client(&self) -> &Arc<dyn RuntimeClient> {
        self.session.client()
    }

    /// Hostname clients should dial to reach published container ports.
    pub fn host(&self) -> &str {
        self.session.host()
    }

    /// Create, start, and wait out a container per the request.
    ///
    /// The returned handle is ready per the request's wait strategy. The
    /// container carries the session labels, so the reaper sweeps it if
    /// this process dies.
    pub async fn start(&self, mut request: ContainerRequest) -> BerthResult<Container> {
        let session_labels = [
            (labels::SESSION_ID.to_string(), self.session_id.clone()),
            (labels::MANAGED.to_string(), "true".to_string()),
        ];

        // If host ports are being forwarded, the tunnel must be resolvable
        // from inside this container before its readiness wait runs. On a
        // named network that means joining it under the alias; on the
        // default network, an extra-hosts entry pointing at the tunnel.
        if self.forwarder.is_active().await {
            match &request.network {
                Some(network) => {
                    self.forwarder
                        .join_network(self.session.client(), network)
                        .await?;
                }
                None => {
                    if let Some(entry) = self.forwarder.host_alias_entry().await {
                        request.extra_hosts.push(entry);
                    }
                }
            }
        }

        Container::launch(
            self.session.client().clone(),
            self.session.host().to_string(),
            &self.image_cache,
            async |_: &ContainerId| {
                self.reaper
                    .register_session(self.session.client(), self.session.host())
                    .await
            },
            request,
            session_labels,
        )
        .await
    }

    /// Make host-bound ports reachable from containers under the
    /// `host.berth.internal` alias.
    pub async fn expose_host_ports(&self, ports: &[u16]) -> BerthResult<()> {
        self.forwarder
            .expose_host_ports(self.session.client(), self.session.host(), ports)
            .await
    }

    /// Create a labeled network owned by this session.
    pub async fn create_network(&self, name: impl Into<String>) -> BerthResult<Network> {
        let name = name.into();
        let mut net_labels = HashMap::new();
        net_labels.insert(labels::SESSION_ID.to_string(), self.session_id.clone());
        net_labels.insert(labels::MANAGED.to_string(), "true".to_string());

        let id = self
            .session
            .client()
            .create_network(&name, &net_labels)
            .await?;
        tracing::info!(network = %name, "network created");

        // Networks match the session reaper filter through their labels.
        self.reaper
            .register_session(self.session.client(), self.session.host())
            .await?;

        Ok(Network {
            name,
            id,
            client: self.session.client().clone(),
            removed: false,
        })
    }

    /// Close the reaper control channel, letting the sidecar sweep
    /// everything labeled with this session.
    pub async fn shutdown(&self) {
        self.reaper.disconnect().await;
    }
}

/// A network created by [`Berth::create_network`].
pub struct Network {
    name: String,
    id: String,
    client: Arc<dyn RuntimeClient>,
    removed: bool,
}

impl Network {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Remove the network. Idempotent.
    pub async fn remove(&mut self) -> BerthResult<()> {
        if self.removed {
            return Ok(());
        }
        self.client.remove_network(&self.name).await?;
        self.removed = true;
        tracing::info!(network = %self.name, "network removed");
        Ok(())
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("removed", &self.removed)
            .finish()
    }
}
