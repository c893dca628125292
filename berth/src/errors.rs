//! Error types for the whole crate.
//!
//! The taxonomy separates terminal readiness failures (`WaitTimeout`,
//! `ContainerExited`) from lifecycle failures (`StartupFailed`) and daemon
//! plumbing (`Runtime`, `RuntimeUnreachable`). Transient per-attempt errors
//! inside polling loops are swallowed by the wait engine and never surface
//! through this enum.

use std::io;
use std::time::Duration;
use thiserror::Error;

pub type BerthResult<T> = Result<T, BerthError>;

#[derive(Debug, Error)]
pub enum BerthError {
    /// No candidate daemon endpoint answered. Fatal, surfaced immediately.
    #[error("no reachable container runtime: {0}")]
    RuntimeUnreachable(String),

    /// An image existence probe failed for a reason other than not-found.
    /// Never cached, so the next call re-probes.
    #[error("inspecting image {image}: {message}")]
    ImageInspect { image: String, message: String },

    /// The image is not present locally and pulling was disabled.
    #[error("image {0} not present locally and auto-pull is disabled")]
    ImageAbsent(String),

    /// The overall readiness deadline elapsed before the strategy succeeded.
    #[error("{strategy} wait strategy timed out after {elapsed:?} (limit {limit:?})")]
    WaitTimeout {
        strategy: &'static str,
        elapsed: Duration,
        limit: Duration,
    },

    /// The container exited while a strategy armed to watch for it was
    /// polling. Carries the tail of the container logs for diagnostics.
    #[error("container exited during {strategy} wait; last logs:\n{logs}")]
    ContainerExited {
        strategy: &'static str,
        logs: String,
    },

    /// A lifecycle stage failed after the container had been (partially)
    /// created. The partial container was removed before this propagated.
    #[error("container startup failed at {stage}: {source}")]
    StartupFailed {
        stage: &'static str,
        #[source]
        source: Box<BerthError>,
    },

    /// A daemon call failed outside any polling loop.
    #[error("runtime: {0}")]
    Runtime(String),

    /// A container port the caller asked about has no live host binding.
    #[error("container port {0}/tcp is not bound on the host")]
    PortNotBound(u16),

    /// A lifecycle operation was attempted from a state that forbids it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An image reference could not be parsed.
    #[error("invalid image reference '{0}'")]
    InvalidImageName(String),

    /// Reaper sidecar start or control-channel failure.
    #[error("reaper: {0}")]
    Reaper(String),

    /// Port-forwarder tunnel start or control-channel failure.
    #[error("port forwarder: {0}")]
    Forwarder(String),

    #[error("io: {0}")]
    Io(#[from] io::Error),
}

impl BerthError {
    /// Wrap a lifecycle-stage failure, keeping readiness errors intact.
    ///
    /// `WaitTimeout` and `ContainerExited` are already self-describing
    /// terminal failures; wrapping them would bury the diagnosis.
    pub(crate) fn at_stage(self, stage: &'static str) -> BerthError {
        match self {
            e @ (BerthError::WaitTimeout { .. } | BerthError::ContainerExited { .. }) => e,
            other => BerthError::StartupFailed {
                stage,
                source: Box::new(other),
            },
        }
    }
}
