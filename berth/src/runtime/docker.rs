//! Bollard-backed [`RuntimeClient`] implementation.
//!
//! All bollard types stay inside this module; the rest of the crate sees
//! only the contract in [`crate::runtime::RuntimeClient`]. Docker and
//! Podman both work, since Podman serves the Docker-compatible API.

use crate::errors::{BerthError, BerthResult};
use crate::image::ImageName;
use crate::runtime::client::RuntimeClient;
use crate::runtime::types::{
    ContainerId, ContainerInspect, ContainerSpec, ExecOutput, HealthStatus, HostBinding, LogTail,
    RuntimeStatus,
};
use async_trait::async_trait;
use bollard::Docker;
use bollard::exec::{StartExecOptions, StartExecResults};
use bollard::models::{
    ContainerCreateBody, ContainerStateStatusEnum, EndpointSettings, HealthStatusEnum, HostConfig,
    NetworkConnectRequest, NetworkCreateRequest,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, LogsOptions,
    RemoveContainerOptions, RestartContainerOptions, StartContainerOptions, StopContainerOptions,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;

/// Runtime client talking to one resolved daemon endpoint.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Wrap an already-connected bollard handle.
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn is_not_modified(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 304,
            ..
        }
    )
}

fn runtime_err(context: &str, err: bollard::errors::Error) -> BerthError {
    BerthError::Runtime(format!("{context}: {err}"))
}

fn map_status(status: ContainerStateStatusEnum) -> RuntimeStatus {
    match status {
        ContainerStateStatusEnum::CREATED => RuntimeStatus::Created,
        ContainerStateStatusEnum::RUNNING => RuntimeStatus::Running,
        ContainerStateStatusEnum::PAUSED => RuntimeStatus::Paused,
        ContainerStateStatusEnum::RESTARTING => RuntimeStatus::Restarting,
        ContainerStateStatusEnum::REMOVING => RuntimeStatus::Removing,
        ContainerStateStatusEnum::DEAD => RuntimeStatus::Dead,
        _ => RuntimeStatus::Exited,
    }
}

fn map_health(status: HealthStatusEnum) -> HealthStatus {
    match status {
        HealthStatusEnum::STARTING => HealthStatus::Starting,
        HealthStatusEnum::HEALTHY => HealthStatus::Healthy,
        HealthStatusEnum::UNHEALTHY => HealthStatus::Unhealthy,
        _ => HealthStatus::None,
    }
}

/// Exposed-ports map in the shape the create API wants: `"80/tcp"` keys,
/// empty objects for values.
fn exposed_ports_map(ports: &[u16]) -> Option<HashMap<String, HashMap<(), ()>>> {
    if ports.is_empty() {
        return None;
    }
    Some(
        ports
            .iter()
            .map(|p| (format!("{p}/tcp"), HashMap::new()))
            .collect(),
    )
}

#[async_trait]
impl RuntimeClient for DockerClient {
    async fn ping(&self) -> BerthResult<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| runtime_err("ping", e))
    }

    async fn create(&self, spec: &ContainerSpec) -> BerthResult<ContainerId> {
        let mut host_config = HostConfig {
            // Exposed ports get ephemeral host ports; the live bindings are
            // read back from inspect after start.
            publish_all_ports: Some(true),
            ..Default::default()
        };
        if !spec.binds.is_empty() {
            host_config.binds = Some(spec.binds.clone());
        }
        if !spec.extra_hosts.is_empty() {
            host_config.extra_hosts = Some(spec.extra_hosts.clone());
        }
        if let Some(network) = &spec.network {
            host_config.network_mode = Some(network.clone());
        }

        let networking_config = match (&spec.network, spec.network_aliases.is_empty()) {
            (Some(network), false) => {
                let mut endpoints: HashMap<String, EndpointSettings> = HashMap::new();
                endpoints.insert(
                    network.clone(),
                    EndpointSettings {
                        aliases: Some(spec.network_aliases.clone()),
                        ..Default::default()
                    },
                );
                Some(bollard::models::NetworkingConfig {
                    endpoints_config: Some(endpoints),
                })
            }
            _ => None,
        };

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: spec.cmd.clone(),
            entrypoint: spec.entrypoint.clone(),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            labels: if spec.labels.is_empty() {
                None
            } else {
                Some(spec.labels.clone())
            },
            exposed_ports: exposed_ports_map(&spec.exposed_ports),
            host_config: Some(host_config),
            networking_config,
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), body)
            .await
            .map_err(|e| runtime_err("create container", e))?;

        Ok(ContainerId::new(response.id))
    }

    async fn start(&self, id: &ContainerId) -> BerthResult<()> {
        self.docker
            .start_container(id.as_str(), None::<StartContainerOptions>)
            .await
            .map_err(|e| runtime_err("start container", e))
    }

    async fn stop(&self, id: &ContainerId, timeout: Duration) -> BerthResult<()> {
        let options = StopContainerOptions {
            t: Some(timeout.as_secs() as i32),
            signal: None,
        };
        match self.docker.stop_container(id.as_str(), Some(options)).await {
            Ok(()) => Ok(()),
            // 304: already stopped. 404: already removed. Both are fine.
            Err(e) if is_not_modified(&e) || is_not_found(&e) => Ok(()),
            Err(e) => Err(runtime_err("stop container", e)),
        }
    }

    async fn restart(&self, id: &ContainerId) -> BerthResult<()> {
        self.docker
            .restart_container(id.as_str(), None::<RestartContainerOptions>)
            .await
            .map_err(|e| runtime_err("restart container", e))
    }

    async fn remove(&self, id: &ContainerId, force: bool) -> BerthResult<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        match self
            .docker
            .remove_container(id.as_str(), Some(options))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(runtime_err("remove container", e)),
        }
    }

    async fn inspect(&self, id: &ContainerId) -> BerthResult<ContainerInspect> {
        let details = self
            .docker
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(|e| runtime_err("inspect container", e))?;

        let status = details
            .state
            .as_ref()
            .and_then(|s| s.status)
            .map(map_status)
            .unwrap_or(RuntimeStatus::Exited);

        let exit_code = details.state.as_ref().and_then(|s| s.exit_code);

        let health = details
            .state
            .as_ref()
            .and_then(|s| s.health.as_ref())
            .and_then(|h| h.status)
            .map(map_health);

        let ip_address = details
            .network_settings
            .as_ref()
            .and_then(|ns| ns.networks.as_ref())
            .and_then(|nets| nets.values().find_map(|ep| ep.ip_address.clone()))
            .filter(|ip| !ip.is_empty());

        let mut ports: HashMap<String, Vec<HostBinding>> = HashMap::new();
        if let Some(port_map) = details.network_settings.and_then(|ns| ns.ports) {
            for (key, bindings) in port_map {
                let live: Vec<HostBinding> = bindings
                    .into_iter()
                    .flatten()
                    .filter_map(|b| {
                        let host_port = b.host_port.as_deref()?.parse().ok()?;
                        Some(HostBinding {
                            host_ip: b.host_ip.unwrap_or_default(),
                            host_port,
                        })
                    })
                    .collect();
                ports.insert(key, live);
            }
        }

        Ok(ContainerInspect {
            status,
            exit_code,
            health,
            ip_address,
            ports,
        })
    }

    async fn logs(&self, id: &ContainerId, tail: LogTail) -> BerthResult<Vec<String>> {
        let options = LogsOptions {
            stdout: true,
            stderr: true,
            follow: false,
            timestamps: false,
            tail: match tail {
                LogTail::All => "all".to_string(),
                LogTail::Last(n) => n.to_string(),
            },
            ..Default::default()
        };

        let mut stream = self.docker.logs(id.as_str(), Some(options));
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let output = chunk.map_err(|e| runtime_err("container logs", e))?;
            buffer.push_str(&String::from_utf8_lossy(&output.into_bytes()));
        }

        Ok(buffer.lines().map(|l| l.to_string()).collect())
    }

    async fn exec(&self, id: &ContainerId, cmd: &[String]) -> BerthResult<ExecOutput> {
        let config = bollard::models::ExecConfig {
            cmd: Some(cmd.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let created = self
            .docker
            .create_exec(id.as_str(), config)
            .await
            .map_err(|e| runtime_err("create exec", e))?;

        let options = StartExecOptions {
            detach: false,
            ..Default::default()
        };
        let results = self
            .docker
            .start_exec(&created.id, Some(options))
            .await
            .map_err(|e| runtime_err("start exec", e))?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let StartExecResults::Attached { mut output, .. } = results {
            while let Some(item) = output.next().await {
                match item.map_err(|e| runtime_err("exec output", e))? {
                    bollard::container::LogOutput::StdOut { message } => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    bollard::container::LogOutput::StdErr { message } => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    _ => {}
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&created.id)
            .await
            .map_err(|e| runtime_err("inspect exec", e))?;

        Ok(ExecOutput {
            exit_code: inspect.exit_code.unwrap_or(0),
            stdout,
            stderr,
        })
    }

    async fn inspect_image(&self, image: &ImageName) -> BerthResult<bool> {
        match self.docker.inspect_image(&image.canonical()).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(BerthError::ImageInspect {
                image: image.canonical(),
                message: e.to_string(),
            }),
        }
    }

    async fn pull(&self, image: &ImageName) -> BerthResult<()> {
        let options = CreateImageOptions {
            from_image: Some(image.canonical()),
            ..Default::default()
        };

        // Pull reports progress as a stream; drain it fully so a partial
        // pull never counts as success.
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            progress.map_err(|e| runtime_err("pull image", e))?;
        }
        Ok(())
    }

    async fn create_network(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> BerthResult<String> {
        let request = NetworkCreateRequest {
            name: name.to_string(),
            driver: Some("bridge".to_string()),
            labels: if labels.is_empty() {
                None
            } else {
                Some(labels.clone())
            },
            ..Default::default()
        };

        let response = self
            .docker
            .create_network(request)
            .await
            .map_err(|e| runtime_err("create network", e))?;
        Ok(response.id)
    }

    async fn remove_network(&self, name: &str) -> BerthResult<()> {
        match self.docker.remove_network(name).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(runtime_err("remove network", e)),
        }
    }

    async fn connect_network(
        &self,
        id: &ContainerId,
        network: &str,
        aliases: &[String],
    ) -> BerthResult<()> {
        let request = NetworkConnectRequest {
            container: Some(id.to_string()),
            endpoint_config: Some(EndpointSettings {
                aliases: if aliases.is_empty() {
                    None
                } else {
                    Some(aliases.to_vec())
                },
                ..Default::default()
            }),
        };

        self.docker
            .connect_network(network, request)
            .await
            .map_err(|e| runtime_err("connect network", e))
    }
}
