//! Shared poll loop behind every wait strategy.

use crate::constants::EXIT_LOG_TAIL;
use crate::errors::{BerthError, BerthResult};
use crate::runtime::LogTail;
use crate::wait::WaitTarget;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Knobs common to all strategies.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
    /// Fail fast with container logs if the container exits mid-wait.
    pub abort_on_exit: bool,
}

/// Drive `poll` until it reports ready, the deadline expires, or the
/// container exits (when configured to care).
///
/// `poll` returning `Ok(true)` ends the wait. `Ok(false)` and `Err(_)`
/// both mean "not yet": probe failures are expected while the service
/// inside the container is still coming up, so they are logged at trace
/// and retried. The outer deadline always wins over a slow attempt.
pub(crate) async fn run_poll_loop<F, Fut>(
    strategy: &'static str,
    target: &WaitTarget,
    config: PollConfig,
    mut poll: F,
) -> BerthResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BerthResult<bool>>,
{
    let started = Instant::now();
    let looped = async {
        loop {
            if config.abort_on_exit
                && let Some(err) = check_exit(strategy, target).await
            {
                return Err(err);
            }

            match poll().await {
                Ok(true) => {
                    tracing::debug!(
                        strategy,
                        container = %target.id.short(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "wait condition met"
                    );
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::trace!(strategy, container = %target.id.short(), error = %e, "poll attempt failed");
                }
            }

            tokio::time::sleep(config.interval).await;
        }
    };

    match tokio::time::timeout(config.timeout, looped).await {
        Ok(result) => result,
        Err(_) => Err(BerthError::WaitTimeout {
            strategy,
            elapsed: started.elapsed(),
            limit: config.timeout,
        }),
    }
}

/// If the container has exited, build the diagnostic error with its last
/// log lines attached. Inspect failures are swallowed; a broken inspect
/// should not mask the wait outcome.
async fn check_exit(strategy: &'static str, target: &WaitTarget) -> Option<BerthError> {
    let inspect = match target.client.inspect(&target.id).await {
        Ok(inspect) => inspect,
        Err(e) => {
            tracing::trace!(container = %target.id.short(), error = %e, "exit check inspect failed");
            return None;
        }
    };
    if !inspect.status.has_exited() {
        return None;
    }

    let logs = match target
        .client
        .logs(&target.id, LogTail::Last(EXIT_LOG_TAIL))
        .await
    {
        Ok(lines) => lines.join("\n"),
        Err(_) => "<failed to fetch container logs>".to_string(),
    };
    Some(BerthError::ContainerExited { strategy, logs })
}
