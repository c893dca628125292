//! Throwaway containers for integration tests.
//!
//! `berth` starts real services in containers, waits until they are
//! actually ready, hands back their mapped ports, and guarantees cleanup
//! even when the test process is killed.
//!
//! ```no_run
//! use berth::{Berth, ContainerRequest, HttpWaitStrategy};
//!
//! # async fn demo() -> berth::BerthResult<()> {
//! let berth = Berth::connect().await?;
//! let container = berth
//!     .start(
//!         ContainerRequest::new("nginx:alpine".parse()?)
//!             .with_exposed_port(80)
//!             .with_wait(HttpWaitStrategy::new("/", 80)),
//!     )
//!     .await?;
//!
//! let port = container.host_port(80)?;
//! let url = format!("http://{}:{port}/", container.host());
//! # let _ = url;
//! # Ok(())
//! # }
//! ```

pub mod constants;
mod container;
mod core;
mod errors;
mod forwarder;
mod image;
mod ports;
mod reaper;
mod runtime;
pub mod wait;

pub use container::{Container, ContainerRequest, ContainerStatus};
pub use crate::core::{Berth, BerthOptions, Network};
pub use errors::{BerthError, BerthResult};
pub use image::{ImageExistsCache, ImageName, ImageTag};
pub use ports::{BoundPorts, PortBinding, PortProtocol};
pub use runtime::{
    ContainerId, ContainerInspect, ContainerSpec, DockerClient, ExecOutput, HealthStatus,
    HostBinding, LogTail, RuntimeClient, RuntimeInfo, RuntimeSession, RuntimeStatus,
};
pub use wait::{
    CommandWaitStrategy, CompositeWaitStrategy, HealthWaitStrategy, HttpWaitStrategy,
    LogWaitStrategy, TcpWaitStrategy, WaitStrategy, WaitTarget,
};
