//! Healthcheck-based readiness probe.

use crate::constants::{DEFAULT_POLL_INTERVAL, DEFAULT_STARTUP_TIMEOUT};
use crate::errors::{BerthError, BerthResult};
use crate::runtime::HealthStatus;
use crate::wait::engine::{self, PollConfig};
use crate::wait::{WaitStrategy, WaitTarget};
use async_trait::async_trait;
use std::time::Duration;

/// Waits until the image's own healthcheck reports healthy.
///
/// Requires the image to define a `HEALTHCHECK`; a container without one
/// never reports healthy, so the wait fails at the deadline.
#[derive(Debug)]
pub struct HealthWaitStrategy {
    poll_interval: Duration,
    startup_timeout: Duration,
}

impl HealthWaitStrategy {
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }
}

impl Default for HealthWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WaitStrategy for HealthWaitStrategy {
    fn name(&self) -> &'static str {
        "health"
    }

    async fn wait_until_ready(&self, target: &WaitTarget) -> BerthResult<()> {
        tracing::debug!(container = %target.id.short(), "waiting for healthy status");
        let config = PollConfig {
            interval: self.poll_interval,
            timeout: self.startup_timeout,
            // Exit detection comes for free: an exited container can never
            // turn healthy, so surface it with logs instead of timing out.
            abort_on_exit: true,
        };
        engine::run_poll_loop(self.name(), target, config, || async {
            let inspect = target.client.inspect(&target.id).await?;
            match inspect.health {
                Some(HealthStatus::Healthy) => Ok(true),
                Some(HealthStatus::Unhealthy) => Err(BerthError::Runtime(
                    "container healthcheck reported unhealthy".to_string(),
                )),
                _ => Ok(false),
            }
        })
        .await
    }
}
