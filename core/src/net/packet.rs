//! IP packet model carried between routing engines
//!
//! Packets are values: forwarding produces a modified copy (see
//! [`IpPacket::decremented`]) so every node that overhears the original
//! through `peek` sees it unchanged.

use super::address::NetAddress;
use crate::aodv::AodvMessage;
use crate::dsr::DsrPacket;
use crate::zrp::ZrpMessage;

/// Network protocol number (IP next-header value)
pub type Protocol = u16;

/// Protocol numbers known to the routing layer
pub mod protocol {
    use super::Protocol;

    pub const UDP: Protocol = 17;
    pub const DSR: Protocol = 48;
    pub const NO_NEXT_HEADER: Protocol = 59;
    pub const AODV: Protocol = 123;
    pub const ZRP: Protocol = 133;
}

/// Queueing priority (lower is more urgent)
pub type Priority = u8;

pub mod priority {
    use super::Priority;

    pub const CRITICAL: Priority = 0;
    pub const HIGH: Priority = 1;
    pub const NORMAL: Priority = 2;
}

/// Default IP time-to-live
pub const TTL_DEFAULT: u8 = 64;

/// Network interface identifier
pub type InterfaceId = u8;

pub const INTERFACE_DEFAULT: InterfaceId = 0;
pub const INTERFACE_LOOPBACK: InterfaceId = 1;

/// IP-level loose source route (used by inter-zone routing)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRoute {
    /// Remaining hops, destination last
    pub route: Vec<NetAddress>,
    /// Index of the next unvisited hop
    pub ptr: usize,
}

impl SourceRoute {
    pub fn new(route: Vec<NetAddress>) -> Self {
        Self { route, ptr: 0 }
    }

    pub fn with_ptr(route: Vec<NetAddress>, ptr: usize) -> Self {
        Self { route, ptr }
    }

    /// Option size on the wire: 3 bytes of header plus 4 per address
    pub fn size(&self) -> usize {
        3 + NetAddress::SIZE * self.route.len()
    }
}

/// Packet contents, one variant per protocol that rides on IP
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Opaque application data
    Data(Vec<u8>),
    Aodv(AodvMessage),
    Dsr(DsrPacket),
    Zrp(ZrpMessage),
}

impl Payload {
    /// Wire size in bytes
    pub fn size(&self) -> usize {
        match self {
            Payload::Data(bytes) => bytes.len(),
            Payload::Aodv(msg) => msg.size(),
            Payload::Dsr(pkt) => pkt.size(),
            Payload::Zrp(msg) => msg.size(),
        }
    }
}

/// Network-layer packet
#[derive(Debug, Clone, PartialEq)]
pub struct IpPacket {
    pub src: NetAddress,
    pub dst: NetAddress,
    pub protocol: Protocol,
    pub priority: Priority,
    pub ttl: u8,
    /// Identification, unique per source
    pub id: u16,
    pub frag_offset: u16,
    pub payload: Payload,
    pub source_route: Option<SourceRoute>,
}

impl IpPacket {
    /// Fixed header size in bytes
    pub const BASE_SIZE: usize = 20;

    pub fn new(
        payload: Payload,
        src: NetAddress,
        dst: NetAddress,
        protocol: Protocol,
        priority: Priority,
        ttl: u8,
    ) -> Self {
        Self {
            src,
            dst,
            protocol,
            priority,
            ttl,
            id: 0,
            frag_offset: 0,
            payload,
            source_route: None,
        }
    }

    pub fn with_id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    pub fn with_source_route(mut self, route: SourceRoute) -> Self {
        self.source_route = Some(route);
        self
    }

    /// Total wire size
    pub fn size(&self) -> usize {
        let route = self.source_route.as_ref().map_or(0, SourceRoute::size);
        Self::BASE_SIZE + route + self.payload.size()
    }

    /// Copy with ttl reduced by one (saturating)
    pub fn decremented(&self) -> Self {
        let mut copy = self.clone();
        copy.ttl = copy.ttl.saturating_sub(1);
        copy
    }

    /// True if addressed to `local` (directly, by loopback or by broadcast)
    pub fn is_for(&self, local: NetAddress) -> bool {
        self.dst == local || self.dst == NetAddress::ANY || self.dst == NetAddress::LOCAL
    }
}
