//! Bound-port resolution.
//!
//! The daemon's inspect output maps `"<port>/<proto>"` keys to host-side
//! bindings whose host ip may be a wildcard. [`BoundPorts`] folds that map
//! into a lookup keyed by container port and protocol, substituting the
//! session's reachable host for wildcard addresses.

use crate::errors::{BerthError, BerthResult};
use crate::runtime::ContainerInspect;
use std::collections::BTreeMap;
use std::fmt;

/// Transport protocol of a published port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PortProtocol {
    Tcp,
    Udp,
}

impl PortProtocol {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "tcp" => Some(PortProtocol::Tcp),
            "udp" => Some(PortProtocol::Udp),
            _ => None,
        }
    }
}

impl fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortProtocol::Tcp => f.write_str("tcp"),
            PortProtocol::Udp => f.write_str("udp"),
        }
    }
}

/// One resolved container-to-host port mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub container_port: u16,
    pub protocol: PortProtocol,
    pub host_port: u16,
    /// Address clients should dial. Never a wildcard.
    pub host_address: String,
}

/// Resolved port mappings of a running container.
///
/// Built once after start (and again after restart); lookups are pure.
#[derive(Debug, Clone, Default)]
pub struct BoundPorts {
    bindings: BTreeMap<(u16, PortProtocol), PortBinding>,
}

impl BoundPorts {
    /// Fold an inspect snapshot into resolved bindings.
    ///
    /// Ports with no live host binding (exposed but unpublished) are
    /// skipped. Wildcard and empty host addresses resolve to `host`.
    pub fn from_inspect(inspect: &ContainerInspect, host: &str) -> Self {
        let mut bindings = BTreeMap::new();
        for (key, live) in &inspect.ports {
            let Some((port, protocol)) = parse_port_key(key) else {
                tracing::trace!(key = %key, "skipping unparseable port key");
                continue;
            };
            let Some(first) = live.first() else {
                continue;
            };
            let host_address = if is_wildcard(&first.host_ip) {
                host.to_string()
            } else {
                first.host_ip.clone()
            };
            bindings.insert(
                (port, protocol),
                PortBinding {
                    container_port: port,
                    protocol,
                    host_port: first.host_port,
                    host_address,
                },
            );
        }
        Self { bindings }
    }

    pub fn get(&self, container_port: u16, protocol: PortProtocol) -> Option<&PortBinding> {
        self.bindings.get(&(container_port, protocol))
    }

    /// Host port published for a container TCP port.
    pub fn host_port(&self, container_port: u16) -> BerthResult<u16> {
        self.get(container_port, PortProtocol::Tcp)
            .map(|b| b.host_port)
            .ok_or(BerthError::PortNotBound(container_port))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortBinding> {
        self.bindings.values()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

fn parse_port_key(key: &str) -> Option<(u16, PortProtocol)> {
    let (port, proto) = key.split_once('/')?;
    Some((port.parse().ok()?, PortProtocol::parse(proto)?))
}

fn is_wildcard(ip: &str) -> bool {
    matches!(ip, "" | "0.0.0.0" | "::")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{HealthStatus, HostBinding, RuntimeStatus};
    use std::collections::HashMap;

    fn inspect_with_ports(ports: HashMap<String, Vec<HostBinding>>) -> ContainerInspect {
        ContainerInspect {
            status: RuntimeStatus::Running,
            exit_code: None,
            health: Some(HealthStatus::None),
            ip_address: Some("172.17.0.2".to_string()),
            ports,
        }
    }

    #[test]
    fn test_wildcard_host_resolves_to_session_host() {
        let mut ports = HashMap::new();
        ports.insert(
            "80/tcp".to_string(),
            vec![HostBinding {
                host_ip: "0.0.0.0".to_string(),
                host_port: 32768,
            }],
        );
        let bound = BoundPorts::from_inspect(&inspect_with_ports(ports), "localhost");
        let binding = bound.get(80, PortProtocol::Tcp).unwrap();
        assert_eq!(binding.host_address, "localhost");
        assert_eq!(binding.host_port, 32768);
        assert_eq!(bound.host_port(80).unwrap(), 32768);
    }

    #[test]
    fn test_explicit_host_ip_preserved() {
        let mut ports = HashMap::new();
        ports.insert(
            "5432/tcp".to_string(),
            vec![HostBinding {
                host_ip: "127.0.0.1".to_string(),
                host_port: 49153,
            }],
        );
        let bound = BoundPorts::from_inspect(&inspect_with_ports(ports), "remote-docker");
        assert_eq!(
            bound.get(5432, PortProtocol::Tcp).unwrap().host_address,
            "127.0.0.1"
        );
    }

    #[test]
    fn test_unpublished_port_skipped() {
        let mut ports = HashMap::new();
        ports.insert("9000/tcp".to_string(), vec![]);
        let bound = BoundPorts::from_inspect(&inspect_with_ports(ports), "localhost");
        assert!(bound.is_empty());
        assert!(matches!(
            bound.host_port(9000),
            Err(BerthError::PortNotBound(9000))
        ));
    }

    #[test]
    fn test_udp_and_tcp_same_port_distinct() {
        let mut ports = HashMap::new();
        ports.insert(
            "53/tcp".to_string(),
            vec![HostBinding {
                host_ip: "::".to_string(),
                host_port: 40000,
            }],
        );
        ports.insert(
            "53/udp".to_string(),
            vec![HostBinding {
                host_ip: "::".to_string(),
                host_port: 40001,
            }],
        );
        let bound = BoundPorts::from_inspect(&inspect_with_ports(ports), "localhost");
        assert_eq!(bound.len(), 2);
        assert_eq!(bound.get(53, PortProtocol::Tcp).unwrap().host_port, 40000);
        assert_eq!(bound.get(53, PortProtocol::Udp).unwrap().host_port, 40001);
    }
}
