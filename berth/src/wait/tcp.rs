//! TCP-connect readiness probe. The default strategy.

use crate::constants::{DEFAULT_POLL_INTERVAL, DEFAULT_STARTUP_TIMEOUT};
use crate::errors::{BerthError, BerthResult};
use crate::ports::PortProtocol;
use crate::wait::engine::{self, PollConfig};
use crate::wait::{WaitStrategy, WaitTarget};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// Waits until the container's published TCP ports accept connections.
///
/// With no ports configured it checks every bound TCP port; a container
/// with none is considered ready immediately.
#[derive(Debug)]
pub struct TcpWaitStrategy {
    /// Container ports to check; empty means all bound TCP ports.
    ports: Vec<u16>,
    connect_timeout: Duration,
    poll_interval: Duration,
    startup_timeout: Duration,
}

impl TcpWaitStrategy {
    pub fn new() -> Self {
        Self {
            ports: Vec::new(),
            connect_timeout: Duration::from_secs(1),
            poll_interval: DEFAULT_POLL_INTERVAL,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }

    /// Check only these container ports.
    pub fn for_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.ports = ports.into_iter().collect();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    fn endpoints(&self, target: &WaitTarget) -> BerthResult<Vec<(String, u16)>> {
        if self.ports.is_empty() {
            return Ok(target
                .ports
                .iter()
                .filter(|b| b.protocol == PortProtocol::Tcp)
                .map(|b| (b.host_address.clone(), b.host_port))
                .collect());
        }
        self.ports
            .iter()
            .map(|&port| {
                target
                    .ports
                    .get(port, PortProtocol::Tcp)
                    .map(|b| (b.host_address.clone(), b.host_port))
                    .ok_or(BerthError::PortNotBound(port))
            })
            .collect()
    }

    async fn attempt(&self, endpoints: &[(String, u16)]) -> BerthResult<bool> {
        for (host, port) in endpoints {
            let connect = TcpStream::connect((host.as_str(), *port));
            match tokio::time::timeout(self.connect_timeout, connect).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::trace!(host, port, error = %e, "tcp probe refused");
                    return Ok(false);
                }
                Err(_) => {
                    tracing::trace!(host, port, "tcp probe timed out");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

impl Default for TcpWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WaitStrategy for TcpWaitStrategy {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn wait_until_ready(&self, target: &WaitTarget) -> BerthResult<()> {
        let endpoints = self.endpoints(target)?;
        if endpoints.is_empty() {
            tracing::debug!(container = %target.id.short(), "no tcp ports bound, nothing to wait for");
            return Ok(());
        }
        tracing::debug!(container = %target.id.short(), endpoints = ?endpoints, "waiting for tcp connectivity");

        let config = PollConfig {
            interval: self.poll_interval,
            timeout: self.startup_timeout,
            abort_on_exit: false,
        };
        engine::run_poll_loop(self.name(), target, config, || self.attempt(&endpoints)).await
    }
}
