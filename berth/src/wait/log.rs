//! Log-pattern readiness probe.

use crate::constants::{DEFAULT_POLL_INTERVAL, DEFAULT_STARTUP_TIMEOUT};
use crate::errors::BerthResult;
use crate::runtime::LogTail;
use crate::wait::engine::{self, PollConfig};
use crate::wait::{WaitStrategy, WaitTarget};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
enum LogPattern {
    Literal(String),
    Regex(regex::Regex),
}

impl LogPattern {
    fn count_in(&self, line: &str) -> usize {
        match self {
            LogPattern::Literal(text) => line.matches(text.as_str()).count(),
            LogPattern::Regex(pattern) => pattern.find_iter(line).count(),
        }
    }
}

impl fmt::Display for LogPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogPattern::Literal(text) => f.write_str(text),
            LogPattern::Regex(pattern) => f.write_str(pattern.as_str()),
        }
    }
}

/// Waits until the container's log stream matches a pattern a given
/// number of times.
#[derive(Debug)]
pub struct LogWaitStrategy {
    pattern: LogPattern,
    times: usize,
    poll_interval: Duration,
    startup_timeout: Duration,
    abort_on_exit: bool,
}

impl LogWaitStrategy {
    /// Wait for a literal substring in the logs.
    pub fn contains(message: impl Into<String>) -> Self {
        Self::from_pattern(LogPattern::Literal(message.into()))
    }

    /// Wait for a regular expression match in the logs.
    pub fn matching(pattern: regex::Regex) -> Self {
        Self::from_pattern(LogPattern::Regex(pattern))
    }

    fn from_pattern(pattern: LogPattern) -> Self {
        Self {
            pattern,
            times: 1,
            poll_interval: DEFAULT_POLL_INTERVAL,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            abort_on_exit: false,
        }
    }

    /// Require the pattern to appear at least this many times.
    pub fn times(mut self, times: usize) -> Self {
        self.times = times.max(1);
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

    pub fn with_abort_on_container_exit(mut self) -> Self {
        self.abort_on_exit = true;
        self
    }

    async fn attempt(&self, target: &WaitTarget) -> BerthResult<bool> {
        let lines = target.client.logs(&target.id, LogTail::All).await?;
        let hits: usize = lines.iter().map(|line| self.pattern.count_in(line)).sum();
        Ok(hits >= self.times)
    }
}

#[async_trait]
impl WaitStrategy for LogWaitStrategy {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn wait_until_ready(&self, target: &WaitTarget) -> BerthResult<()> {
        tracing::debug!(
            container = %target.id.short(),
            pattern = %self.pattern,
            times = self.times,
            "waiting for log pattern"
        );
        let config = PollConfig {
            interval: self.poll_interval,
            timeout: self.startup_timeout,
            abort_on_exit: self.abort_on_exit,
        };
        engine::run_poll_loop(self.name(), target, config, || self.attempt(target)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern_counts_occurrences() {
        let pattern = LogPattern::Literal("up".to_string());
        assert_eq!(pattern.count_in("worker up, backup up"), 3);
        assert_eq!(pattern.count_in("starting"), 0);
    }

    #[test]
    fn test_times_never_below_one() {
        let strategy = LogWaitStrategy::contains("ready").times(0);
        assert_eq!(strategy.times, 1);
    }
}
