//! The daemon contract.

use crate::errors::BerthResult;
use crate::image::ImageName;
use crate::runtime::types::{ContainerId, ContainerInspect, ContainerSpec, ExecOutput, LogTail};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Everything this library needs from a Docker-API-compatible daemon.
///
/// The production implementation is [`crate::runtime::DockerClient`]; tests
/// inject scripted implementations. The transport behind these calls
/// (socket, TLS, API version negotiation) is not this crate's concern.
///
/// Idempotency notes:
/// - `stop` on an already-stopped container is `Ok(())`.
/// - `remove` on an already-removed container is `Ok(())`.
/// - `inspect_image` returns `Ok(false)` only for an authoritative
///   not-found; every other failure is an `Err`.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Liveness probe against the daemon.
    async fn ping(&self) -> BerthResult<()>;

    async fn create(&self, spec: &ContainerSpec) -> BerthResult<ContainerId>;

    async fn start(&self, id: &ContainerId) -> BerthResult<()>;

    async fn stop(&self, id: &ContainerId, timeout: Duration) -> BerthResult<()>;

    async fn restart(&self, id: &ContainerId) -> BerthResult<()>;

    async fn remove(&self, id: &ContainerId, force: bool) -> BerthResult<()>;

    async fn inspect(&self, id: &ContainerId) -> BerthResult<ContainerInspect>;

    /// Fetch log lines (stdout and stderr interleaved), bounded by `tail`.
    async fn logs(&self, id: &ContainerId, tail: LogTail) -> BerthResult<Vec<String>>;

    /// Run a command inside the container and collect its output.
    async fn exec(&self, id: &ContainerId, cmd: &[String]) -> BerthResult<ExecOutput>;

    /// Whether the image is present locally. `Ok(false)` means the daemon
    /// authoritatively reported not-found.
    async fn inspect_image(&self, image: &ImageName) -> BerthResult<bool>;

    async fn pull(&self, image: &ImageName) -> BerthResult<()>;

    /// Create a network, returning its daemon-side id.
    async fn create_network(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> BerthResult<String>;

    async fn remove_network(&self, name: &str) -> BerthResult<()>;

    /// Join a running container to a network under the given aliases.
    async fn connect_network(
        &self,
        id: &ContainerId,
        network: &str,
        aliases: &[String],
    ) -> BerthResult<()>;
}
