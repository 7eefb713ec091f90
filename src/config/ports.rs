//! `{port}/{protocol}` pairs used by load balancer ports.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use super::error::ConfigurationError;

/// Load balancer protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Http,
    Https,
    Tcp,
    Udp,
    TcpUdp,
    Tls,
}

/// Application-layer (L7) protocols need an application load balancer,
/// network-layer (L4) protocols need a network load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolFamily {
    Application,
    Network,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::TcpUdp => "tcp_udp",
            Protocol::Tls => "tls",
        }
    }

    pub fn family(&self) -> ProtocolFamily {
        match self {
            Protocol::Http | Protocol::Https => ProtocolFamily::Application,
            _ => ProtocolFamily::Network,
        }
    }

    /// Protocol name as the load balancer API spells it.
    pub fn listener_protocol(&self) -> &'static str {
        match self {
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::TcpUdp => "TCP_UDP",
            Protocol::Tls => "TLS",
        }
    }

    /// Whether listeners on this protocol terminate TLS and need a certificate.
    pub fn is_secure(&self) -> bool {
        matches!(self, Protocol::Https | Protocol::Tls)
    }

    /// Transport protocols used in container port mappings.
    pub fn transport_protocols(&self) -> &'static [&'static str] {
        match self {
            Protocol::Udp => &["udp"],
            Protocol::TcpUdp => &["tcp", "udp"],
            _ => &["tcp"],
        }
    }
}

impl FromStr for Protocol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "tcp_udp" => Ok(Protocol::TcpUdp),
            "tls" => Ok(Protocol::Tls),
            _ => Err(()),
        }
    }
}

/// A parsed `"80/http"` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortProtocol {
    pub port: u16,
    pub protocol: Protocol,
}

impl PortProtocol {
    pub fn new(port: u16, protocol: Protocol) -> Self {
        Self { port, protocol }
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigurationError> {
        let invalid = || ConfigurationError::InvalidPort(raw.to_string());
        let (port, protocol) = raw.trim().split_once('/').ok_or_else(invalid)?;
        let port: u16 = port.parse().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }
        let protocol = protocol.parse().map_err(|_| invalid())?;
        Ok(Self { port, protocol })
    }

    pub fn family(&self) -> ProtocolFamily {
        self.protocol.family()
    }
}

impl fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol.as_str())
    }
}

impl Serialize for PortProtocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Return the shared protocol family, or `MixedProtocolFamily` if the list mixes them.
pub fn uniform_family<'a>(
    ports: impl IntoIterator<Item = &'a PortProtocol>,
) -> Result<Option<ProtocolFamily>, ConfigurationError> {
    let mut family = None;
    for port in ports {
        match family {
            None => family = Some(port.family()),
            Some(existing) if existing != port.family() => {
                return Err(ConfigurationError::MixedProtocolFamily)
            }
            Some(_) => {}
        }
    }
    Ok(family)
}
