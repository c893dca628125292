//! Container runtime client: the narrow contract this library needs from a
//! Docker-API-compatible daemon, its bollard-backed implementation, and
//! process-wide endpoint resolution.

mod client;
mod docker;
mod resolve;
mod types;

pub use client::RuntimeClient;
pub use docker::DockerClient;
pub use resolve::{RuntimeInfo, RuntimeSession};
pub use types::{
    ContainerId, ContainerInspect, ContainerSpec, ExecOutput, HealthStatus, HostBinding, LogTail,
    RuntimeStatus,
};
