//! Exec-command readiness probe.

use crate::constants::{DEFAULT_POLL_INTERVAL, DEFAULT_STARTUP_TIMEOUT};
use crate::errors::BerthResult;
use crate::wait::engine::{self, PollConfig};
use crate::wait::{WaitStrategy, WaitTarget};
use async_trait::async_trait;
use std::time::Duration;

/// Waits until a command executed inside the container exits with the
/// expected code. Exec failures (daemon hiccup, container still settling)
/// count as "not ready yet".
#[derive(Debug)]
pub struct CommandWaitStrategy {
    cmd: Vec<String>,
    expected_exit_code: i64,
    poll_interval: Duration,
    startup_timeout: Duration,
}

impl CommandWaitStrategy {
    pub fn new(cmd: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
            expected_exit_code: 0,
            poll_interval: DEFAULT_POLL_INTERVAL,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }

    pub fn with_expected_exit_code(mut self, code: i64) -> Self {
        self.expected_exit_code = code;
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
}

#[async_trait]
impl WaitStrategy for CommandWaitStrategy {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn wait_until_ready(&self, target: &WaitTarget) -> BerthResult<()> {
        tracing::debug!(container = %target.id.short(), cmd = ?self.cmd, "waiting for command success");
        let config = PollConfig {
            interval: self.poll_interval,
            timeout: self.startup_timeout,
            abort_on_exit: false,
        };
        engine::run_poll_loop(self.name(), target, config, || async {
            let output = target.client.exec(&target.id, &self.cmd).await?;
            Ok(output.exit_code == self.expected_exit_code)
        })
        .await
    }
}
