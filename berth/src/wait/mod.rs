//! Readiness wait strategies.
//!
//! A strategy polls some observable signal of a started container until it
//! holds or the startup deadline expires. The shared poll loop lives in
//! [`engine`]; each strategy supplies the per-attempt probe.

mod command;
mod composite;
pub(crate) mod engine;
mod health;
mod http;
mod log;
mod tcp;

pub use command::CommandWaitStrategy;
pub use composite::CompositeWaitStrategy;
pub use health::HealthWaitStrategy;
pub use http::HttpWaitStrategy;
pub use log::LogWaitStrategy;
pub use tcp::TcpWaitStrategy;

use crate::errors::BerthResult;
use crate::ports::BoundPorts;
use crate::runtime::{ContainerId, RuntimeClient};
use async_trait::async_trait;
use std::sync::Arc;

/// Everything a strategy may observe about the container it waits on.
#[derive(Clone)]
pub struct WaitTarget {
    pub client: Arc<dyn RuntimeClient>,
    pub id: ContainerId,
    /// Hostname for dialing published ports.
    pub host: String,
    pub ports: BoundPorts,
}

/// One readiness condition over a started container.
///
/// Implementations poll; they never block past their configured deadline.
/// A strategy failing with [`crate::BerthError::WaitTimeout`] or
/// [`crate::BerthError::ContainerExited`] means the container never became
/// ready, not that the probe itself misbehaved.
#[async_trait]
pub trait WaitStrategy: Send + Sync {
    /// Stable name used in errors and logs.
    fn name(&self) -> &'static str;

    async fn wait_until_ready(&self, target: &WaitTarget) -> BerthResult<()>;
}
