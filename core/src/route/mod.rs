//! Network-layer routing contract
//!
//! Every engine (AODV, DSR, ZRP) implements [`RouteInterface`]. The host
//! network layer:
//! - calls `peek` for every packet the node hears, before anything else
//! - calls `receive` for packets addressed to this node carrying the
//!   engine's own protocol number
//! - calls `send` for outbound packets it cannot deliver by itself
//!   (neither broadcast nor loopback), including packets being forwarded
//! - calls `timeout` when a timer the engine armed through
//!   [`NodeContext::schedule`] comes due
//!
//! Timers are never cancelled. Callbacks re-check their state when they
//! fire and do nothing if the work they were armed for is already done.

pub mod seq;

pub use seq::{next_seq, seq_after, SEQ_WINDOW};

use crate::net::{InterfaceId, IpPacket, MacAddress, NetAddress, Protocol};
use crate::sim::NodeContext;
use std::fmt::Debug;

/// A pluggable multihop routing engine
pub trait RouteInterface {
    /// Tagged timer event dispatched back through [`RouteInterface::timeout`]
    type Timer: Clone + Debug;

    /// Protocol number the engine's control traffic is carried under
    const PROTOCOL: Protocol;

    fn local_addr(&self) -> NetAddress;

    /// Arm periodic timers
    fn start(&mut self, ctx: &mut NodeContext<'_, Self::Timer>);

    /// Observe a packet heard on the link, before it is handled.
    /// Must not alter what other observers see.
    fn peek(&mut self, ctx: &mut NodeContext<'_, Self::Timer>, packet: &IpPacket, last_hop: MacAddress);

    /// Route an outbound packet
    fn send(&mut self, ctx: &mut NodeContext<'_, Self::Timer>, packet: IpPacket);

    /// Handle a packet of this engine's protocol addressed to this node.
    /// The packet carries payload, source, destination, priority and ttl.
    fn receive(
        &mut self,
        ctx: &mut NodeContext<'_, Self::Timer>,
        packet: &IpPacket,
        last_hop: MacAddress,
        interface: InterfaceId,
    );

    fn timeout(&mut self, ctx: &mut NodeContext<'_, Self::Timer>, timer: Self::Timer);
}

/// Replace the destination (last element) of `route` with `finder`, then
/// append `remainder`.
///
/// Used to stitch a discovered path onto the segment that reached the node
/// which answered.
pub fn replace_dest(
    route: &[NetAddress],
    finder: NetAddress,
    remainder: &[NetAddress],
) -> Vec<NetAddress> {
    let keep = route.len().saturating_sub(1);
    let mut out = Vec::with_capacity(keep + 1 + remainder.len());
    out.extend_from_slice(&route[..keep]);
    out.push(finder);
    out.extend_from_slice(remainder);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u32) -> NetAddress {
        NetAddress::from_index(n)
    }

    #[test]
    fn test_replace_dest() {
        let route = vec![addr(1), addr(2), addr(9)];
        let stitched = replace_dest(&route, addr(3), &[addr(4), addr(9)]);
        assert_eq!(stitched, vec![addr(1), addr(2), addr(3), addr(4), addr(9)]);
    }

    #[test]
    fn test_replace_dest_empty_route() {
        let stitched = replace_dest(&[], addr(3), &[addr(4)]);
        assert_eq!(stitched, vec![addr(3), addr(4)]);
    }
}
