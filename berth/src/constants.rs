//! Crate-wide constants: label keys, environment variables, defaults.

use std::time::Duration;

/// Labels stamped on every resource this library creates.
///
/// The reaper sidecar deletes by label filter, so these double as the
/// cleanup contract: anything carrying the session label is fair game.
pub mod labels {
    /// Unique id of the current test process session.
    pub const SESSION_ID: &str = "berth.session-id";

    /// Marks a container as created by this library.
    pub const MANAGED: &str = "berth.managed";

    /// Marks the reaper sidecar itself (never carries the session label,
    /// so the sidecar does not delete itself mid-session).
    pub const REAPER: &str = "berth.reaper";

    /// Marks the host-port tunnel container.
    pub const TUNNEL: &str = "berth.tunnel";
}

/// Environment variables read at session setup.
pub mod envs {
    /// Standard daemon endpoint override, highest-priority candidate.
    pub const DOCKER_HOST: &str = "DOCKER_HOST";

    /// Image used for the reaper sidecar.
    pub const REAPER_IMAGE: &str = "BERTH_REAPER_IMAGE";

    /// Set to `1` to skip starting the reaper sidecar entirely.
    pub const REAPER_DISABLED: &str = "BERTH_REAPER_DISABLED";

    /// Image used for the host-port tunnel container.
    pub const TUNNEL_IMAGE: &str = "BERTH_TUNNEL_IMAGE";

    /// Overrides the host address used to reach mapped ports.
    pub const HOST_OVERRIDE: &str = "BERTH_HOST_OVERRIDE";
}

/// Default reaper sidecar image (ryuk control protocol).
pub const DEFAULT_REAPER_IMAGE: &str = "testcontainers/ryuk:0.11.0";

/// Port the reaper sidecar listens on inside the container.
pub const REAPER_PORT: u16 = 8080;

/// Default tunnel image (speaks the `FORWARD <port> <alias>` protocol).
pub const DEFAULT_TUNNEL_IMAGE: &str = "berth/port-tunnel:0.1";

/// Port the tunnel's control channel listens on inside the container.
pub const TUNNEL_CONTROL_PORT: u16 = 4774;

/// DNS alias under which containers reach host-bound ports.
pub const HOST_ALIAS: &str = "host.berth.internal";

/// Overall readiness deadline when a request does not set one.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Fixed interval between wait-strategy poll attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Per-attempt read timeout for HTTP probes.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Graceful stop window handed to the daemon before it kills the container.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// How long endpoint resolution waits for a single candidate to answer a ping.
pub const ENDPOINT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// How long we retry connecting to a freshly started sidecar control channel.
pub const SIDECAR_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Log lines fetched for diagnostics when a container dies during a wait.
pub const EXIT_LOG_TAIL: u32 = 50;
