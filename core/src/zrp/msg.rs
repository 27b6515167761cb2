//! ZRP control messages
//!
//! Only wire sizes matter to the simulation: messages travel as typed
//! values and `size()` reports what they would occupy on the air.

use super::Compression;
use crate::net::{Link, NetAddress};
use std::collections::BTreeSet;

/// Per-kind statistics bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZrpKind {
    Ndp,
    Iarp,
    Brp,
    Ierp,
}

/// Every message ZRP puts in an IP packet
#[derive(Debug, Clone, PartialEq)]
pub enum ZrpMessage {
    /// Neighbour heartbeat
    Ndp,
    Zone(ZoneUpdate),
    Bordercast(BordercastMessage),
    Ierp(IerpMessage),
}

impl ZrpMessage {
    pub fn kind(&self) -> ZrpKind {
        match self {
            ZrpMessage::Ndp => ZrpKind::Ndp,
            ZrpMessage::Zone(_) => ZrpKind::Iarp,
            ZrpMessage::Bordercast(_) => ZrpKind::Brp,
            ZrpMessage::Ierp(_) => ZrpKind::Ierp,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            ZrpMessage::Ndp => 0,
            ZrpMessage::Zone(update) => update.size(),
            ZrpMessage::Bordercast(msg) => msg.size(),
            ZrpMessage::Ierp(msg) => msg.size(),
        }
    }
}

/// Intra-zone link-state update, one variant per zone protocol
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneUpdate {
    Iarp(IarpMessage),
    Zdp(ZdpMessage),
}

impl ZoneUpdate {
    pub fn size(&self) -> usize {
        match self {
            ZoneUpdate::Iarp(msg) => msg.size(),
            ZoneUpdate::Zdp(msg) => msg.size(),
        }
    }
}

/// IARP link-state advertisement: `src` lists its neighbours
#[derive(Debug, Clone, PartialEq)]
pub struct IarpMessage {
    pub src: NetAddress,
    pub seq: i16,
    /// Remaining flood radius
    pub ttl: u8,
    pub dsts: Vec<NetAddress>,
    pub compression: Compression,
}

impl IarpMessage {
    const FIXED_SIZE: usize = 8;

    /// Copy for re-flooding, if any radius is left
    pub fn decremented(&self) -> Option<Self> {
        (self.ttl > 1).then(|| Self {
            ttl: self.ttl - 1,
            ..self.clone()
        })
    }

    pub fn size(&self) -> usize {
        match self.compression {
            Compression::Infinite => 0,
            _ => Self::FIXED_SIZE + NetAddress::SIZE * self.dsts.len(),
        }
    }
}

/// One link record carried by ZDP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZdpLink {
    pub link: Link,
    pub id: i16,
    pub drop: bool,
}

/// ZDP incremental link-state update
#[derive(Debug, Clone, PartialEq)]
pub struct ZdpMessage {
    pub links: Vec<ZdpLink>,
    pub compression: Compression,
}

impl ZdpMessage {
    fn unique_dsts(&self) -> usize {
        self.links
            .iter()
            .map(|l| l.link.dst)
            .collect::<BTreeSet<_>>()
            .len()
    }

    fn unique_addrs(&self) -> usize {
        self.links
            .iter()
            .flat_map(|l| [l.link.src, l.link.dst])
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn size(&self) -> usize {
        let n = self.links.len();
        match self.compression {
            Compression::None => 2 + 9 * n,
            Compression::Node => 1 + 7 * self.unique_dsts() + 4 * n,
            // one-byte indices into a packet-local address table
            Compression::Zone => 1 + 5 * self.unique_addrs() + self.unique_dsts() + 2 * n,
            Compression::Infinite => 0,
        }
    }
}

/// Query carried toward the zone periphery
#[derive(Debug, Clone, PartialEq)]
pub enum BordercastMessage {
    /// Directed bordercast: only `targets` relay it further
    Brp {
        query: IerpMessage,
        targets: Vec<NetAddress>,
    },
    /// Plain flood, relayed once by everybody
    Flood { query: IerpMessage },
}

impl BordercastMessage {
    pub fn query(&self) -> &IerpMessage {
        match self {
            BordercastMessage::Brp { query, .. } | BordercastMessage::Flood { query } => query,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            BordercastMessage::Brp { query, targets } => {
                5 + NetAddress::SIZE * targets.len() + query.size()
            }
            BordercastMessage::Flood { query } => query.size(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IerpKind {
    Request = 1,
    Reply = 2,
}

/// Inter-zone route request or reply.
///
/// `route` runs originator first and destination last; a request grows by
/// inserting each relay before the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct IerpMessage {
    pub kind: IerpKind,
    pub id: i16,
    pub route: Vec<NetAddress>,
}

impl IerpMessage {
    const FIXED_SIZE: usize = 8;

    pub fn request(id: i16, src: NetAddress, dst: NetAddress) -> Self {
        Self {
            kind: IerpKind::Request,
            id,
            route: vec![src, dst],
        }
    }

    pub fn reply(id: i16, route: Vec<NetAddress>) -> Self {
        Self {
            kind: IerpKind::Reply,
            id,
            route,
        }
    }

    /// Query originator
    pub fn src(&self) -> Option<NetAddress> {
        self.route.first().copied()
    }

    /// Route destination
    pub fn dst(&self) -> Option<NetAddress> {
        self.route.last().copied()
    }

    /// Copy with `hop` inserted just before the destination
    pub fn append_hop(&self, hop: NetAddress) -> Self {
        let mut route = self.route.clone();
        let at = route.len().saturating_sub(1);
        route.insert(at, hop);
        Self {
            kind: self.kind,
            id: self.id,
            route,
        }
    }

    pub fn size(&self) -> usize {
        Self::FIXED_SIZE + NetAddress::SIZE * self.route.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u32) -> NetAddress {
        NetAddress::from_index(n)
    }

    #[test]
    fn test_ierp_append_hop_keeps_destination_last() {
        let query = IerpMessage::request(1, addr(1), addr(9));
        let grown = query.append_hop(addr(2)).append_hop(addr(3));
        assert_eq!(grown.route, vec![addr(1), addr(2), addr(3), addr(9)]);
        assert_eq!(grown.src(), Some(addr(1)));
        assert_eq!(grown.dst(), Some(addr(9)));
        assert_eq!(grown.size(), 8 + 16);
        assert_eq!(query.route.len(), 2);
    }

    #[test]
    fn test_iarp_sizes_and_ttl() {
        let msg = IarpMessage {
            src: addr(1),
            seq: 3,
            ttl: 2,
            dsts: vec![addr(2), addr(3)],
            compression: Compression::None,
        };
        assert_eq!(msg.size(), 16);
        let fwd = msg.decremented().unwrap();
        assert_eq!(fwd.ttl, 1);
        assert!(fwd.decremented().is_none());

        let free = IarpMessage {
            compression: Compression::Infinite,
            ..msg
        };
        assert_eq!(free.size(), 0);
    }

    #[test]
    fn test_zdp_sizes_by_compression() {
        let links = vec![
            ZdpLink {
                link: Link::new(addr(1), addr(2)),
                id: 0,
                drop: false,
            },
            ZdpLink {
                link: Link::new(addr(3), addr(2)),
                id: 0,
                drop: false,
            },
            ZdpLink {
                link: Link::new(addr(2), addr(1)),
                id: 0,
                drop: true,
            },
        ];
        let sized = |compression| {
            ZdpMessage {
                links: links.clone(),
                compression,
            }
            .size()
        };
        // 3 links, 2 unique destinations, 3 unique addresses
        assert_eq!(sized(Compression::None), 2 + 27);
        assert_eq!(sized(Compression::Node), 1 + 14 + 12);
        assert_eq!(sized(Compression::Zone), 1 + 15 + 2 + 6);
        assert_eq!(sized(Compression::Infinite), 0);
    }

    #[test]
    fn test_bordercast_sizes() {
        let query = IerpMessage::request(1, addr(1), addr(9));
        let brp = BordercastMessage::Brp {
            query: query.clone(),
            targets: vec![addr(2), addr(3)],
        };
        assert_eq!(brp.size(), 5 + 8 + 16);
        let flood = BordercastMessage::Flood { query };
        assert_eq!(flood.size(), 16);
        assert_eq!(ZrpMessage::Bordercast(flood).kind(), ZrpKind::Brp);
        assert_eq!(ZrpMessage::Ndp.size(), 0);
    }
}
