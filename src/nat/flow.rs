//! Flow identity types.
//!
//! A flow's map identity is derived from immutable header fields only.
//! Mutable bookkeeping (access time, the allocated translation id) lives on
//! the table record, never on the key, so a record stays findable while its
//! timestamps move.

use std::fmt;
use std::net::IpAddr;

const PROTO_ICMP: u8 = 1;
const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;
const PROTO_ICMPV6: u8 = 58;

/// Transport protocols the table distinguishes for identity and timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    /// Any other IP protocol; shares its timeout class with UDP.
    Other(u8),
}

impl Protocol {
    /// Create protocol from an IP protocol number. ICMPv6 echo traffic is
    /// keyed by identifier just like ICMPv4, so both map to `Icmp`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            PROTO_ICMP | PROTO_ICMPV6 => Protocol::Icmp,
            PROTO_TCP => Protocol::Tcp,
            PROTO_UDP => Protocol::Udp,
            other => Protocol::Other(other),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Icmp => write!(f, "icmp"),
            Protocol::Other(n) => write!(f, "proto-{}", n),
        }
    }
}

/// IP version half of a bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpVersion {
    V4,
    V6,
}

impl From<&IpAddr> for IpVersion {
    fn from(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => write!(f, "v4"),
            IpVersion::V6 => write!(f, "v6"),
        }
    }
}

/// Partition of the translation id space. Ids are unique per bucket, not
/// globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bucket {
    pub version: IpVersion,
    pub protocol: Protocol,
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.version, self.protocol)
    }
}

/// Identity granularity, fixed when the table is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityMode {
    /// Source endpoint only: one mapping per local endpoint.
    #[default]
    SourceOnly,
    /// Destination participates in identity: one mapping per peer pairing.
    /// Needed for UDP/ICMP fan-out where one local endpoint talks to many
    /// remote peers.
    SourceAndDestination,
}

/// Parsed header fields for one packet, supplied by the capture layer.
///
/// For ICMP echo traffic `src_port` carries the echo identifier and
/// `dst_port` is 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flow {
    pub protocol: Protocol,
    pub src_addr: IpAddr,
    pub src_port: u16,
    pub dst_addr: IpAddr,
    pub dst_port: u16,
}

impl Flow {
    pub fn new(
        protocol: Protocol,
        src_addr: IpAddr,
        src_port: u16,
        dst_addr: IpAddr,
        dst_port: u16,
    ) -> Self {
        Self {
            protocol,
            src_addr,
            src_port,
            dst_addr,
            dst_port,
        }
    }
}

/// Immutable map key derived from a [`Flow`] under the table's identity mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub protocol: Protocol,
    pub src_addr: IpAddr,
    pub src_port: u16,
    /// Present only under [`IdentityMode::SourceAndDestination`].
    pub dst: Option<(IpAddr, u16)>,
}

impl FlowKey {
    /// Derive the key for a packet's flow. `SourceOnly` drops the
    /// destination pair so all traffic from one local endpoint shares a
    /// mapping.
    pub fn from_flow(flow: &Flow, mode: IdentityMode) -> Self {
        let dst = match mode {
            IdentityMode::SourceOnly => None,
            IdentityMode::SourceAndDestination => Some((flow.dst_addr, flow.dst_port)),
        };
        Self {
            protocol: flow.protocol,
            src_addr: flow.src_addr,
            src_port: flow.src_port,
            dst,
        }
    }

    pub fn version(&self) -> IpVersion {
        IpVersion::from(&self.src_addr)
    }

    pub fn bucket(&self) -> Bucket {
        Bucket {
            version: self.version(),
            protocol: self.protocol,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.protocol, self.src_addr, self.src_port)?;
        if let Some((addr, port)) = &self.dst {
            write!(f, " -> {}:{}", addr, port)?;
        }
        Ok(())
    }
}
