//! HTTP readiness probe.

use crate::constants::{DEFAULT_POLL_INTERVAL, DEFAULT_READ_TIMEOUT, DEFAULT_STARTUP_TIMEOUT};
use crate::errors::{BerthError, BerthResult};
use crate::ports::PortProtocol;
use crate::wait::engine::{self, PollConfig};
use crate::wait::{WaitStrategy, WaitTarget};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Method;
use std::fmt;
use std::time::Duration;

type StatusPredicate = Box<dyn Fn(u16) -> bool + Send + Sync>;
type BodyPredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Waits until an HTTP endpoint inside the container answers acceptably.
///
/// With no predicates configured, any 2xx status counts as ready. All
/// configured predicates are evaluated against the same response and must
/// all hold. Transport-level failures (refused, reset, per-attempt read
/// timeout) are treated as "not ready yet" and retried until the startup
/// deadline.
pub struct HttpWaitStrategy {
    path: String,
    container_port: u16,
    method: Method,
    headers: Vec<(String, String)>,
    tls: bool,
    insecure_tls: bool,
    read_timeout: Duration,
    poll_interval: Duration,
    startup_timeout: Duration,
    abort_on_exit: bool,
    status_predicates: Vec<StatusPredicate>,
    body_predicates: Vec<BodyPredicate>,
}

impl HttpWaitStrategy {
    pub fn new(path: impl Into<String>, container_port: u16) -> Self {
        Self {
            path: path.into(),
            container_port,
            method: Method::GET,
            headers: Vec::new(),
            tls: false,
            insecure_tls: false,
            read_timeout: DEFAULT_READ_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            abort_on_exit: false,
            status_predicates: Vec::new(),
            body_predicates: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send `Authorization: Basic` credentials with every probe.
    pub fn with_basic_credentials(self, user: &str, password: &str) -> Self {
        let token = BASE64.encode(format!("{user}:{password}"));
        self.with_header("Authorization", format!("Basic {token}"))
    }

    pub fn using_tls(mut self) -> Self {
        self.tls = true;
        self
    }

    /// Accept self-signed certificates. Probes only; never for real traffic.
    pub fn allow_insecure(mut self) -> Self {
        self.insecure_tls = true;
        self
    }

    /// Per-attempt budget; an attempt exceeding it is retried.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
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

    /// Fail immediately (with container logs) if the container exits
    /// while the wait is in progress.
    pub fn with_abort_on_container_exit(mut self) -> Self {
        self.abort_on_exit = true;
        self
    }

    /// Require this exact status code.
    pub fn for_status_code(self, code: u16) -> Self {
        self.for_status_code_matching(move |s| s == code)
    }

    pub fn for_status_code_matching(
        mut self,
        predicate: impl Fn(u16) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.status_predicates.push(Box::new(predicate));
        self
    }

    /// Require the response body to satisfy the predicate. The body is
    /// only fetched when at least one body predicate is configured.
    pub fn for_response_predicate(
        mut self,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.body_predicates.push(Box::new(predicate));
        self
    }

    /// Probes always dial the runtime host; the binding only contributes
    /// the published port.
    fn probe_url(&self, target: &WaitTarget) -> BerthResult<String> {
        let binding = target
            .ports
            .get(self.container_port, PortProtocol::Tcp)
            .ok_or(BerthError::PortNotBound(self.container_port))?;
        let scheme = if self.tls { "https" } else { "http" };
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        Ok(format!(
            "{scheme}://{}:{}{path}",
            target.host, binding.host_port
        ))
    }

    fn build_client(&self) -> BerthResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.read_timeout)
            .danger_accept_invalid_certs(self.insecure_tls)
            .build()
            .map_err(|e| BerthError::Runtime(format!("building http probe client: {e}")))
    }

    async fn attempt(&self, client: &reqwest::Client, url: &str) -> BerthResult<bool> {
        let mut request = client.request(self.method.clone(), url);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = match request.send().await {
            Ok(response) => response,
            // Connection refused, reset, read timeout: the service is not
            // up yet. Retry.
            Err(e) => {
                tracing::trace!(url, error = %e, "http probe transport failure");
                return Ok(false);
            }
        };

        let status = response.status().as_u16();
        let status_ok = if self.status_predicates.is_empty() {
            response.status().is_success()
        } else {
            self.status_predicates.iter().all(|p| p(status))
        };
        if !status_ok {
            tracing::trace!(url, status, "http probe status not acceptable");
            return Ok(false);
        }

        if !self.body_predicates.is_empty() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::trace!(url, error = %e, "http probe body read failure");
                    return Ok(false);
                }
            };
            if !self.body_predicates.iter().all(|p| p(&body)) {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

#[async_trait]
impl WaitStrategy for HttpWaitStrategy {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn wait_until_ready(&self, target: &WaitTarget) -> BerthResult<()> {
        let url = self.probe_url(target)?;
        let client = self.build_client()?;
        tracing::debug!(container = %target.id.short(), url = %url, "waiting for http readiness");

        let config = PollConfig {
            interval: self.poll_interval,
            timeout: self.startup_timeout,
            abort_on_exit: self.abort_on_exit,
        };
        engine::run_poll_loop(self.name(), target, config, || self.attempt(&client, &url)).await
    }
}

impl fmt::Debug for HttpWaitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpWaitStrategy")
            .field("path", &self.path)
            .field("container_port", &self.container_port)
            .field("method", &self.method)
            .field("tls", &self.tls)
            .field("status_predicates", &self.status_predicates.len())
            .field("body_predicates", &self.body_predicates.len())
            .finish_non_exhaustive()
    }
}
