use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Transport protocol a proxy module attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            6 => Some(Self::Tcp),
            17 => Some(Self::Udp),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Tcp => 6,
            Self::Udp => 17,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flow direction relative to the binding that owns the session.
///
/// `Outbound` traffic originates from the host owning the binding's
/// inside address; `Inbound` is the reverse path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outbound,
    Inbound,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Self::Outbound => Self::Inbound,
            Self::Inbound => Self::Outbound,
        }
    }

    /// Stable array index for per-direction state.
    pub fn index(self) -> usize {
        match self {
            Self::Outbound => 0,
            Self::Inbound => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Outbound => "outbound",
            Self::Inbound => "inbound",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry key for a proxy module, unique per transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleName(pub String);

impl ModuleName {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.0.is_empty() {
            return Err("module name must not be empty");
        }
        if self.0.len() > 32 {
            return Err("module name must be at most 32 characters");
        }
        if !self
            .0
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err("module name must be alphanumeric with '-' or '_'");
        }
        Ok(())
    }
}

impl std::fmt::Display for ModuleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a NAT binding. Assigned by the embedding engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingId(pub u64);

impl std::fmt::Display for BindingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address/port pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub addr: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(addr: IpAddr, port: u16) -> Self {
        Self { addr, port }
    }

    /// Network-order octets when the address is IPv4.
    pub fn v4_octets(&self) -> Option<[u8; 4]> {
        match self.addr {
            IpAddr::V4(v4) => Some(v4.octets()),
            IpAddr::V6(_) => None,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// The slice of a NAT binding the proxy layer depends on.
///
/// The binding itself lives in the embedding engine's translation table
/// and strictly outlives (or co-terminates with) any proxy session
/// attached to it; sessions refer to it by `id` only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub id: BindingId,
    /// Translated inside address/port of the connection.
    pub inside: Endpoint,
    /// Outside (external) address/port of the connection.
    pub outside: Endpoint,
    pub transport: Transport,
    /// Module the matching proxy rule configured for this binding.
    pub module: ModuleName,
    /// Listening port the proxy rule was configured with.
    pub proxy_port: u16,
}

/// Request for an auxiliary binding ("pinhole") observed in a primary
/// connection's payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinholeSpec {
    /// Binding whose session requested the pinhole.
    pub owner: BindingId,
    /// Endpoint traffic should be redirected for.
    pub target: Endpoint,
    /// Companion module the secondary flow routes through, if any.
    pub module: Option<ModuleName>,
}
