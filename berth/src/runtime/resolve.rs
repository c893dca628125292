//! Daemon endpoint resolution.
//!
//! Candidate endpoints are probed in a fixed order and the first one that
//! answers a ping within a short budget wins. The resolved session is
//! memoized process-wide so every handle in a test run shares one client.

use crate::constants::{self, envs};
use crate::errors::{BerthError, BerthResult};
use crate::runtime::client::RuntimeClient;
use crate::runtime::docker::DockerClient;
use bollard::Docker;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Facts about the resolved endpoint that callers need after connect.
#[derive(Debug, Clone)]
pub struct RuntimeInfo {
    /// Human-readable endpoint description for logs.
    pub description: String,
    /// Hostname clients should dial to reach published container ports.
    pub host: String,
    /// Whether the daemon runs rootless (affects socket mounting).
    pub rootless: bool,
}

/// A resolved connection to a container daemon.
pub struct RuntimeSession {
    client: Arc<dyn RuntimeClient>,
    info: RuntimeInfo,
}

static DEFAULT_SESSION: Mutex<Option<Arc<RuntimeSession>>> = Mutex::const_new(None);

impl RuntimeSession {
    /// Probe the candidate endpoints and connect to the first live one.
    pub async fn resolve() -> BerthResult<Self> {
        let mut tried = Vec::new();
        for candidate in candidates() {
            let label = candidate.describe();
            tracing::debug!(endpoint = %label, "probing runtime endpoint");
            match candidate.connect() {
                Ok(docker) => {
                    let client: Arc<dyn RuntimeClient> = Arc::new(DockerClient::new(docker));
                    let ping = tokio::time::timeout(
                        constants::ENDPOINT_PROBE_TIMEOUT,
                        client.ping(),
                    )
                    .await;
                    match ping {
                        Ok(Ok(())) => {
                            let info = candidate.info();
                            tracing::info!(endpoint = %label, host = %info.host, "runtime endpoint resolved");
                            return Ok(Self { client, info });
                        }
                        Ok(Err(e)) => tracing::debug!(endpoint = %label, error = %e, "ping failed"),
                        Err(_) => tracing::debug!(endpoint = %label, "ping timed out"),
                    }
                }
                Err(e) => tracing::debug!(endpoint = %label, error = %e, "connect failed"),
            }
            tried.push(label);
        }
        Err(BerthError::RuntimeUnreachable(format!(
            "no live container runtime endpoint (tried: {})",
            tried.join(", ")
        )))
    }

    /// Build a session around an injected client. Test seam.
    pub fn with_client(client: Arc<dyn RuntimeClient>, info: RuntimeInfo) -> Self {
        Self { client, info }
    }

    /// The process-wide shared session, resolving it on first use.
    pub async fn default_session() -> BerthResult<Arc<RuntimeSession>> {
        let mut slot = DEFAULT_SESSION.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }
        let session = Arc::new(Self::resolve().await?);
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Drop the memoized session so the next call re-resolves.
    pub async fn reset() {
        *DEFAULT_SESSION.lock().await = None;
    }

    pub fn client(&self) -> &Arc<dyn RuntimeClient> {
        &self.client
    }

    pub fn info(&self) -> &RuntimeInfo {
        &self.info
    }

    /// Hostname to dial for ports this daemon publishes.
    pub fn host(&self) -> &str {
        &self.info.host
    }
}

enum Candidate {
    /// `DOCKER_HOST` style URI, `unix://` or `tcp://`.
    Uri(String),
    UnixSocket { path: PathBuf, rootless: bool },
}

impl Candidate {
    fn describe(&self) -> String {
        match self {
            Candidate::Uri(uri) => uri.clone(),
            Candidate::UnixSocket { path, .. } => path.display().to_string(),
        }
    }

    fn connect(&self) -> Result<Docker, bollard::errors::Error> {
        match self {
            Candidate::Uri(uri) => {
                if let Some(path) = uri.strip_prefix("unix://") {
                    Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION)
                } else {
                    Docker::connect_with_http(uri, 120, bollard::API_DEFAULT_VERSION)
                }
            }
            Candidate::UnixSocket { path, .. } => Docker::connect_with_unix(
                &path.display().to_string(),
                120,
                bollard::API_DEFAULT_VERSION,
            ),
        }
    }

    fn info(&self) -> RuntimeInfo {
        let host = std::env::var(envs::HOST_OVERRIDE)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| match self {
                Candidate::Uri(uri) => tcp_host(uri).unwrap_or_else(|| "localhost".to_string()),
                Candidate::UnixSocket { .. } => "localhost".to_string(),
            });
        RuntimeInfo {
            description: self.describe(),
            host,
            rootless: matches!(self, Candidate::UnixSocket { rootless: true, .. }),
        }
    }
}

/// Extract the hostname from a `tcp://host:port` URI.
fn tcp_host(uri: &str) -> Option<String> {
    let rest = uri.strip_prefix("tcp://").or_else(|| uri.strip_prefix("http://"))?;
    let authority = rest.split('/').next()?;
    let host = authority.rsplit_once(':').map_or(authority, |(h, _)| h);
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

fn candidates() -> Vec<Candidate> {
    let mut out = Vec::new();

    if let Ok(uri) = std::env::var(envs::DOCKER_HOST)
        && !uri.is_empty()
    {
        out.push(Candidate::Uri(uri));
    }

    out.push(Candidate::UnixSocket {
        path: PathBuf::from("/var/run/docker.sock"),
        rootless: false,
    });

    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR")
        && !dir.is_empty()
    {
        out.push(Candidate::UnixSocket {
            path: PathBuf::from(&dir).join("docker.sock"),
            rootless: true,
        });
        out.push(Candidate::UnixSocket {
            path: PathBuf::from(&dir).join("podman/podman.sock"),
            rootless: true,
        });
    }

    if let Some(home) = dirs::home_dir() {
        out.push(Candidate::UnixSocket {
            path: home.join(".docker/run/docker.sock"),
            rootless: true,
        });
    }

    out.push(Candidate::UnixSocket {
        path: PathBuf::from("/run/podman/podman.sock"),
        rootless: false,
    });

    out
}
