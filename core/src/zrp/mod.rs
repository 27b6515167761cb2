//! ZRP: hybrid zone routing
//!
//! The coordinator owns four independent sub-protocols, chosen at
//! construction time:
//! - [`NeighborDiscovery`]: heartbeat-driven neighbour set ([`Ndp`])
//! - [`ZoneRouting`]: proactive link state within the zone radius
//!   ([`Iarp`], or the incremental [`Zdp`])
//! - [`BordercastResolver`]: delivers queries to the zone periphery
//!   ([`Brp`], or the flooding [`BrpFlood`])
//! - [`InterzoneRouting`]: reactive discovery beyond the zone ([`Ierp`])
//!
//! Sub-protocols never call each other. Anything that crosses a
//! sub-protocol boundary (a link going down, a query to bordercast, a
//! message to put on the air) comes back to the coordinator as a
//! [`ZrpAction`], which it dispatches in order.

pub mod brp;
pub mod brp_flood;
pub mod ierp;
pub mod iarp;
pub mod msg;
pub mod ndp;
pub mod zdp;
pub mod zone;

pub use brp::Brp;
pub use brp_flood::BrpFlood;
pub use iarp::Iarp;
pub use ierp::Ierp;
pub use msg::{
    BordercastMessage, IarpMessage, IerpKind, IerpMessage, ZdpLink, ZdpMessage, ZoneUpdate,
    ZrpKind, ZrpMessage,
};
pub use ndp::Ndp;
pub use zdp::Zdp;
pub use zone::ZoneTable;

use crate::net::{
    priority, protocol, InterfaceId, IpPacket, Link, MacAddress, NetAddress, Payload,
    SourceRoute,
};
use crate::route::RouteInterface;
use crate::sim::{DropReason, NodeContext};
use crate::ManetError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Largest zone radius accepted
pub const MAX_RADIUS: u8 = 127;

/// Intra-zone protocol flavour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneProtocol {
    #[default]
    Iarp,
    Zdp,
}

/// Bordercast flavour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BordercastProtocol {
    #[default]
    Brp,
    Flood,
}

/// How link-state updates are sized on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    #[default]
    None,
    /// Links grouped by destination (ZDP only)
    Node,
    /// Addresses replaced by packet-local indices (ZDP only)
    Zone,
    /// Zero-size updates, for idealized-cost runs
    Infinite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZrpConfig {
    /// Zone radius in hops, 1..=127
    pub radius: u8,
    pub zone: ZoneProtocol,
    pub bordercast: BordercastProtocol,
    pub compression: Compression,
}

impl Default for ZrpConfig {
    fn default() -> Self {
        Self {
            radius: 2,
            zone: ZoneProtocol::Iarp,
            bordercast: BordercastProtocol::Brp,
            compression: Compression::None,
        }
    }
}

impl ZrpConfig {
    pub fn with_radius(radius: u8) -> Self {
        Self {
            radius,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ManetError> {
        if self.radius < 1 || self.radius > MAX_RADIUS {
            return Err(ManetError::InvalidRadius(self.radius));
        }
        if self.zone == ZoneProtocol::Iarp
            && matches!(self.compression, Compression::Node | Compression::Zone)
        {
            return Err(ManetError::UnsupportedCompression {
                protocol: "iarp",
                compression: self.compression,
            });
        }
        Ok(())
    }
}

// ============================================================================
// TIMERS, ACTIONS, STATISTICS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneTimer {
    /// Periodic link-state refresh (IARP) or flush sweep (ZDP)
    Refresh,
    /// Batched link-state send (ZDP)
    Send,
}

/// ZRP timer events
#[derive(Debug, Clone, PartialEq)]
pub enum ZrpTimer {
    NdpBeat,
    Zone(ZoneTimer),
    BordercastRefresh,
    /// Bordercast query held back by jitter on its way up to IERP
    DeliverQuery { query: IerpMessage, from: NetAddress },
    IerpFlush,
}

/// Work a sub-protocol hands back to the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum ZrpAction {
    /// Put a control message on the air to every neighbour
    Broadcast { msg: ZrpMessage, delay: Duration },
    /// Send a packet straight to a neighbour
    Unicast { packet: IpPacket, next_hop: NetAddress },
    /// Route a data packet as if freshly sent
    Forward(IpPacket),
    /// A neighbour link came up or went down
    LinkInfo { link: Link, drop: bool },
    /// Zone routes were recomputed
    ZoneChanged,
    /// Carry an inter-zone query to the zone periphery
    Bordercast(IerpMessage),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub packets: u64,
    pub bytes: u64,
}

impl Counter {
    fn add(&mut self, bytes: usize) {
        self.packets += 1;
        self.bytes += bytes as u64;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZrpPacketStats {
    pub ndp: Counter,
    pub iarp: Counter,
    pub brp: Counter,
    pub ierp: Counter,
    pub data: Counter,
}

impl ZrpPacketStats {
    fn record(&mut self, kind: ZrpKind, bytes: usize) {
        match kind {
            ZrpKind::Ndp => self.ndp.add(bytes),
            ZrpKind::Iarp => self.iarp.add(bytes),
            ZrpKind::Brp => self.brp.add(bytes),
            ZrpKind::Ierp => self.ierp.add(bytes),
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZrpStats {
    pub sent: ZrpPacketStats,
    pub received: ZrpPacketStats,
}

// ============================================================================
// SUB-PROTOCOL TRAITS
// ============================================================================

/// Neighbour liveness
pub trait NeighborDiscovery {
    fn start(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>);

    /// Heartbeat heard from `src` via link-layer `mac`
    fn receive(&mut self, src: NetAddress, mac: MacAddress) -> Vec<ZrpAction>;

    /// Periodic beat: advertise, age, evict
    fn timeout(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>) -> Vec<ZrpAction>;

    fn mac_address(&self, addr: &NetAddress) -> Option<MacAddress>;

    fn neighbours(&self) -> Vec<NetAddress>;

    fn is_neighbour(&self, addr: &NetAddress) -> bool {
        self.mac_address(addr).is_some()
    }

    fn neighbour_count(&self) -> usize {
        self.neighbours().len()
    }
}

/// Proactive routing within the zone
pub trait ZoneRouting {
    fn start(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>);

    fn receive(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        update: &ZoneUpdate,
        from: NetAddress,
    ) -> Vec<ZrpAction>;

    /// Neighbour link `link` came up, or went down if `drop`
    fn link_info(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        link: Link,
        drop: bool,
        neighbours: &[NetAddress],
    ) -> Vec<ZrpAction>;

    fn timeout(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        timer: ZoneTimer,
        neighbours: &[NetAddress],
    ) -> Vec<ZrpAction>;

    /// Live links known
    fn link_count(&self) -> usize;

    /// Nodes `src` has a live link to
    fn links_from(&self, src: &NetAddress) -> Vec<NetAddress>;

    /// Memoized zone routes, recomputed after any link-state change
    fn zone(&self) -> &ZoneTable;

    fn has_route(&self, dst: &NetAddress) -> bool {
        self.zone().contains(dst)
    }

    /// Hops to `dst`, destination last
    fn route(&self, dst: &NetAddress) -> Option<&[NetAddress]> {
        self.zone().route(dst)
    }

    fn route_count(&self) -> usize {
        self.zone().len()
    }

    fn periphery(&self) -> Vec<NetAddress> {
        self.zone().periphery()
    }

    /// Nodes within `depth` hops of `src` according to local link state
    fn coverage(&self, src: NetAddress, depth: u8) -> BTreeSet<NetAddress> {
        zone::coverage(src, depth, |n| self.links_from(n))
    }
}

/// Query dissemination to the zone periphery
pub trait BordercastResolver {
    fn start(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>);

    /// Bordercast heard from `from`; the query goes up to IERP at most once
    fn receive(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        msg: &BordercastMessage,
        from: NetAddress,
    );

    /// Relay `query` onward, if this node is due to
    fn send(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        query: IerpMessage,
        zone: &dyn ZoneRouting,
    ) -> Vec<ZrpAction>;

    /// Periodic coverage table sweep
    fn timeout(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>);

    /// Queries currently tracked
    fn query_count(&self) -> usize;
}

/// Reactive routing beyond the zone
pub trait InterzoneRouting {
    fn start(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>);

    /// Queue `packet` and start a query for its destination
    fn send(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        packet: IpPacket,
        zone: &dyn ZoneRouting,
        ndp: &dyn NeighborDiscovery,
    ) -> Vec<ZrpAction>;

    fn receive(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        msg: &IerpMessage,
        zone: &dyn ZoneRouting,
        ndp: &dyn NeighborDiscovery,
    ) -> Vec<ZrpAction>;

    /// Zone routes changed: release what can now be routed inside the zone
    fn zone_changed(&mut self, zone: &dyn ZoneRouting) -> Vec<ZrpAction>;

    /// Periodic queue flush
    fn timeout(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>);

    /// Packets waiting for a route
    fn queued(&self) -> usize;
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// ZRP engine for one node
pub struct Zrp {
    local: NetAddress,
    config: ZrpConfig,
    ndp: Box<dyn NeighborDiscovery>,
    zone: Box<dyn ZoneRouting>,
    brp: Box<dyn BordercastResolver>,
    ierp: Box<dyn InterzoneRouting>,
    stats: ZrpStats,
}

impl Zrp {
    /// Engine with the sub-protocols `config` selects
    pub fn new(local: NetAddress, config: ZrpConfig) -> Result<Self, ManetError> {
        config.validate()?;
        let zone: Box<dyn ZoneRouting> = match config.zone {
            ZoneProtocol::Iarp => Box::new(Iarp::new(local, config.radius, config.compression)),
            ZoneProtocol::Zdp => Box::new(Zdp::new(local, config.radius, config.compression)),
        };
        let brp: Box<dyn BordercastResolver> = match config.bordercast {
            BordercastProtocol::Brp => Box::new(Brp::new(local, config.radius)),
            BordercastProtocol::Flood => Box::new(BrpFlood::new()),
        };
        Self::with_protocols(
            local,
            config,
            Box::new(Ndp::new(local)),
            zone,
            brp,
            Box::new(Ierp::new(local)),
        )
    }

    /// Engine with caller-supplied sub-protocols
    pub fn with_protocols(
        local: NetAddress,
        config: ZrpConfig,
        ndp: Box<dyn NeighborDiscovery>,
        zone: Box<dyn ZoneRouting>,
        brp: Box<dyn BordercastResolver>,
        ierp: Box<dyn InterzoneRouting>,
    ) -> Result<Self, ManetError> {
        if config.radius < 1 || config.radius > MAX_RADIUS {
            return Err(ManetError::InvalidRadius(config.radius));
        }
        Ok(Self {
            local,
            config,
            ndp,
            zone,
            brp,
            ierp,
            stats: ZrpStats::default(),
        })
    }

    pub fn config(&self) -> &ZrpConfig {
        &self.config
    }

    pub fn radius(&self) -> u8 {
        self.config.radius
    }

    pub fn stats(&self) -> &ZrpStats {
        &self.stats
    }

    pub fn clear_stats(&mut self) {
        self.stats = ZrpStats::default();
    }

    pub fn ndp(&self) -> &dyn NeighborDiscovery {
        self.ndp.as_ref()
    }

    pub fn zone(&self) -> &dyn ZoneRouting {
        self.zone.as_ref()
    }

    pub fn bordercast(&self) -> &dyn BordercastResolver {
        self.brp.as_ref()
    }

    pub fn ierp(&self) -> &dyn InterzoneRouting {
        self.ierp.as_ref()
    }

    /// Whether `dst` is reachable inside the zone
    pub fn has_zone_route(&self, dst: &NetAddress) -> bool {
        self.zone.has_route(dst)
    }

    /// Dispatch actions until none are left. Actions raised while handling
    /// one are queued behind those already pending.
    fn run(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>, actions: Vec<ZrpAction>) {
        let mut pending = VecDeque::from(actions);
        while let Some(action) = pending.pop_front() {
            let more = match action {
                ZrpAction::Broadcast { msg, delay } => {
                    self.broadcast(ctx, msg, delay);
                    Vec::new()
                }
                ZrpAction::Unicast { packet, next_hop } => {
                    self.unicast(ctx, packet, next_hop);
                    Vec::new()
                }
                ZrpAction::Forward(packet) => self.route_data(ctx, packet),
                ZrpAction::LinkInfo { link, drop } => {
                    let neighbours = self.ndp.neighbours();
                    self.zone.link_info(ctx, link, drop, &neighbours)
                }
                ZrpAction::ZoneChanged => self.ierp.zone_changed(self.zone.as_ref()),
                ZrpAction::Bordercast(query) => self.brp.send(ctx, query, self.zone.as_ref()),
            };
            pending.extend(more);
        }
    }

    fn broadcast(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>, msg: ZrpMessage, delay: Duration) {
        self.stats.sent.record(msg.kind(), msg.size());
        debug!("zrp broadcast at={} kind={:?} size={}", self.local, msg.kind(), msg.size());
        let packet = IpPacket::new(
            Payload::Zrp(msg),
            self.local,
            NetAddress::ANY,
            protocol::ZRP,
            priority::NORMAL,
            1,
        )
        .with_id(ctx.next_packet_id());
        ctx.transmit(packet, MacAddress::ANY, delay);
    }

    fn unicast(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>, packet: IpPacket, next_hop: NetAddress) {
        let Some(mac) = self.ndp.mac_address(&next_hop) else {
            debug!("zrp at={} next hop {} is not a neighbour", self.local, next_hop);
            ctx.drop_packet(packet, DropReason::LinkBroken);
            return;
        };
        match &packet.payload {
            Payload::Zrp(msg) => self.stats.sent.record(msg.kind(), msg.size()),
            other => self.stats.sent.data.add(other.size()),
        }
        ctx.transmit(packet, mac, Duration::ZERO);
    }

    /// Next hop for a data packet: zone route first, then the farthest
    /// in-zone node on its IP source route, otherwise inter-zone discovery
    fn route_data(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>, mut packet: IpPacket) -> Vec<ZrpAction> {
        let dst = packet.dst;
        if let Some(&next) = self.zone.route(&dst).and_then(<[NetAddress]>::first) {
            self.unicast(ctx, packet, next);
            return Vec::new();
        }

        if let Some(sr) = packet.source_route.clone() {
            let hop = (sr.ptr..sr.route.len()).rev().find_map(|i| {
                let first = self.zone.route(&sr.route[i])?.first().copied()?;
                Some((i, first))
            });
            let Some((i, next)) = hop else {
                warn!(
                    "zrp at={} no zone route along source route to {}",
                    self.local, dst
                );
                ctx.drop_packet(packet, DropReason::BadSourceRoute);
                return Vec::new();
            };
            let ptr = if next == sr.route[i] { i + 1 } else { i };
            if ptr != sr.ptr {
                packet.source_route = Some(SourceRoute::with_ptr(sr.route, ptr));
            }
            self.unicast(ctx, packet, next);
            return Vec::new();
        }

        self.ierp.send(ctx, packet, self.zone.as_ref(), self.ndp.as_ref())
    }
}

impl RouteInterface for Zrp {
    type Timer = ZrpTimer;

    const PROTOCOL: crate::net::Protocol = protocol::ZRP;

    fn local_addr(&self) -> NetAddress {
        self.local
    }

    fn start(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>) {
        info!("zrp started at={} radius={}", self.local, self.config.radius);
        self.ndp.start(ctx);
        self.zone.start(ctx);
        self.brp.start(ctx);
        self.ierp.start(ctx);
    }

    fn peek(&mut self, _ctx: &mut NodeContext<'_, ZrpTimer>, packet: &IpPacket, _last_hop: MacAddress) {
        if packet.protocol != protocol::ZRP {
            self.stats.received.data.add(packet.payload.size());
        }
    }

    fn send(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>, packet: IpPacket) {
        debug!("zrp route at={} src={} dst={} id={}", self.local, packet.src, packet.dst, packet.id);
        let actions = self.route_data(ctx, packet);
        self.run(ctx, actions);
    }

    fn receive(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        packet: &IpPacket,
        last_hop: MacAddress,
        _interface: InterfaceId,
    ) {
        let Payload::Zrp(msg) = &packet.payload else {
            debug!("zrp at={} ignoring non-zrp payload from {}", self.local, packet.src);
            return;
        };
        self.stats.received.record(msg.kind(), msg.size());

        let actions = match msg {
            ZrpMessage::Ndp => self.ndp.receive(packet.src, last_hop),
            ZrpMessage::Zone(update) => self.zone.receive(ctx, update, packet.src),
            ZrpMessage::Bordercast(bordercast) => {
                self.brp.receive(ctx, bordercast, packet.src);
                Vec::new()
            }
            ZrpMessage::Ierp(ierp) => {
                self.ierp
                    .receive(ctx, ierp, self.zone.as_ref(), self.ndp.as_ref())
            }
        };
        self.run(ctx, actions);
    }

    fn timeout(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>, timer: ZrpTimer) {
        let actions = match timer {
            ZrpTimer::NdpBeat => self.ndp.timeout(ctx),
            ZrpTimer::Zone(zone_timer) => {
                let neighbours = self.ndp.neighbours();
                self.zone.timeout(ctx, zone_timer, &neighbours)
            }
            ZrpTimer::BordercastRefresh => {
                self.brp.timeout(ctx);
                Vec::new()
            }
            ZrpTimer::DeliverQuery { query, .. } => {
                self.stats.received.record(ZrpKind::Ierp, query.size());
                self.ierp
                    .receive(ctx, &query, self.zone.as_ref(), self.ndp.as_ref())
            }
            ZrpTimer::IerpFlush => {
                self.ierp.timeout(ctx);
                Vec::new()
            }
        };
        self.run(ctx, actions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::Effect;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn addr(n: u32) -> NetAddress {
        NetAddress::from_index(n)
    }

    fn heartbeat(from: u32) -> IpPacket {
        IpPacket::new(
            Payload::Zrp(ZrpMessage::Ndp),
            addr(from),
            NetAddress::ANY,
            protocol::ZRP,
            priority::NORMAL,
            1,
        )
    }

    fn data_to(dst: u32) -> IpPacket {
        IpPacket::new(
            Payload::Data(vec![0; 16]),
            addr(1),
            addr(dst),
            protocol::UDP,
            priority::NORMAL,
            64,
        )
    }

    /// Node 1 having heard a heartbeat from node 2
    fn with_neighbour(zrp: &mut Zrp, rng: &mut StdRng, ids: &mut u16) {
        let mut ctx = NodeContext::new(addr(1), Duration::ZERO, rng, ids);
        zrp.receive(&mut ctx, &heartbeat(2), MacAddress::new(2), 0);
    }

    fn transmits(effects: &[Effect<ZrpTimer>]) -> Vec<(&IpPacket, MacAddress)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Transmit {
                    packet, next_hop, ..
                } => Some((packet, *next_hop)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_config_validation() {
        assert!(ZrpConfig::default().validate().is_ok());
        assert!(matches!(
            ZrpConfig::with_radius(0).validate(),
            Err(ManetError::InvalidRadius(0))
        ));
        assert!(matches!(
            ZrpConfig::with_radius(128).validate(),
            Err(ManetError::InvalidRadius(128))
        ));
        assert!(Zrp::new(addr(1), ZrpConfig::with_radius(0)).is_err());

        let iarp_node = ZrpConfig {
            compression: Compression::Node,
            ..ZrpConfig::default()
        };
        assert!(matches!(
            iarp_node.validate(),
            Err(ManetError::UnsupportedCompression { protocol: "iarp", .. })
        ));
        let zdp_zone = ZrpConfig {
            zone: ZoneProtocol::Zdp,
            compression: Compression::Zone,
            ..ZrpConfig::default()
        };
        assert!(zdp_zone.validate().is_ok());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = ZrpConfig {
            radius: 3,
            zone: ZoneProtocol::Zdp,
            bordercast: BordercastProtocol::Flood,
            compression: Compression::Infinite,
        };
        let json = crate::config_to_json(&config).unwrap();
        let back: ZrpConfig = crate::config_from_json(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_start_arms_every_sub_protocol() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut ids = 0;
        let mut ctx = NodeContext::new(addr(1), Duration::ZERO, &mut rng, &mut ids);
        let mut zrp = Zrp::new(addr(1), ZrpConfig::default()).unwrap();
        zrp.start(&mut ctx);

        let timers: Vec<ZrpTimer> = ctx
            .effects()
            .iter()
            .filter_map(|e| match e {
                Effect::Schedule { delay, timer } if delay.is_zero() => Some(timer.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            timers,
            vec![
                ZrpTimer::NdpBeat,
                ZrpTimer::Zone(ZoneTimer::Refresh),
                ZrpTimer::BordercastRefresh,
                ZrpTimer::IerpFlush,
            ]
        );
    }

    #[test]
    fn test_beat_broadcasts_heartbeat() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut ids = 0;
        let mut ctx = NodeContext::new(addr(1), Duration::ZERO, &mut rng, &mut ids);
        let mut zrp = Zrp::new(addr(1), ZrpConfig::default()).unwrap();
        zrp.timeout(&mut ctx, ZrpTimer::NdpBeat);

        let sent = transmits(ctx.effects());
        assert_eq!(sent.len(), 1);
        let (packet, mac) = sent[0];
        assert_eq!(mac, MacAddress::ANY);
        assert_eq!(packet.dst, NetAddress::ANY);
        assert_eq!(packet.ttl, 1);
        assert_eq!(packet.payload, Payload::Zrp(ZrpMessage::Ndp));
        assert_eq!(zrp.stats().sent.ndp.packets, 1);
    }

    #[test]
    fn test_heartbeat_puts_neighbour_in_zone() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut ids = 0;
        let mut zrp = Zrp::new(addr(1), ZrpConfig::default()).unwrap();
        let mut ctx = NodeContext::new(addr(1), Duration::ZERO, &mut rng, &mut ids);
        zrp.receive(&mut ctx, &heartbeat(2), MacAddress::new(2), 0);

        assert!(zrp.has_zone_route(&addr(2)));
        assert!(zrp.ndp().is_neighbour(&addr(2)));
        assert_eq!(zrp.stats().received.ndp.packets, 1);
        // Own advertisement goes out one hop further
        let sent = transmits(ctx.effects());
        assert!(matches!(
            &sent[..],
            [(p, MacAddress::ANY)] if matches!(
                &p.payload,
                Payload::Zrp(ZrpMessage::Zone(ZoneUpdate::Iarp(m))) if m.ttl == 1
            )
        ));
        assert_eq!(zrp.stats().sent.iarp.packets, 1);
    }

    #[test]
    fn test_zone_route_used_for_data() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut ids = 0;
        let mut zrp = Zrp::new(addr(1), ZrpConfig::default()).unwrap();
        with_neighbour(&mut zrp, &mut rng, &mut ids);

        let mut ctx = NodeContext::new(addr(1), Duration::ZERO, &mut rng, &mut ids);
        zrp.send(&mut ctx, data_to(2));
        let sent = transmits(ctx.effects());
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, MacAddress::new(2));
        assert_eq!(zrp.stats().sent.data.packets, 1);
        assert_eq!(zrp.stats().sent.data.bytes, 16);
    }

    #[test]
    fn test_source_route_advances_past_reached_hop() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut ids = 0;
        let mut zrp = Zrp::new(addr(1), ZrpConfig::default()).unwrap();
        with_neighbour(&mut zrp, &mut rng, &mut ids);

        let mut ctx = NodeContext::new(addr(1), Duration::ZERO, &mut rng, &mut ids);
        let packet = data_to(4).with_source_route(SourceRoute::new(vec![addr(2), addr(3), addr(4)]));
        zrp.send(&mut ctx, packet);

        let sent = transmits(ctx.effects());
        assert_eq!(sent.len(), 1);
        let (packet, mac) = sent[0];
        assert_eq!(mac, MacAddress::new(2));
        assert_eq!(
            packet.source_route,
            Some(SourceRoute::with_ptr(vec![addr(2), addr(3), addr(4)], 1))
        );
    }

    #[test]
    fn test_source_route_outside_zone_dropped() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut ids = 0;
        let mut zrp = Zrp::new(addr(1), ZrpConfig::default()).unwrap();
        with_neighbour(&mut zrp, &mut rng, &mut ids);

        let mut ctx = NodeContext::new(addr(1), Duration::ZERO, &mut rng, &mut ids);
        let packet = data_to(6).with_source_route(SourceRoute::new(vec![addr(5), addr(6)]));
        zrp.send(&mut ctx, packet);
        assert!(matches!(
            ctx.effects(),
            [Effect::Drop {
                reason: DropReason::BadSourceRoute,
                ..
            }]
        ));
    }

    #[test]
    fn test_destination_outside_zone_is_queued_and_bordercast() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut ids = 0;
        let mut zrp = Zrp::new(addr(1), ZrpConfig::with_radius(1)).unwrap();
        with_neighbour(&mut zrp, &mut rng, &mut ids);

        let mut ctx = NodeContext::new(addr(1), Duration::ZERO, &mut rng, &mut ids);
        zrp.send(&mut ctx, data_to(9));
        assert_eq!(zrp.ierp().queued(), 1);

        let sent = transmits(ctx.effects());
        match &sent[..] {
            [(packet, MacAddress::ANY)] => match &packet.payload {
                Payload::Zrp(ZrpMessage::Bordercast(BordercastMessage::Brp { query, targets })) => {
                    assert_eq!(targets, &vec![addr(2)]);
                    assert_eq!(query.route, vec![addr(1), addr(9)]);
                }
                other => panic!("unexpected payload {other:?}"),
            },
            other => panic!("unexpected transmits {other:?}"),
        }
        assert_eq!(zrp.stats().sent.brp.packets, 1);
        assert_eq!(zrp.bordercast().query_count(), 1);
    }

    #[test]
    fn test_reply_toward_unknown_neighbour_not_relayed() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut ids = 0;
        let mut ctx = NodeContext::new(addr(1), Duration::ZERO, &mut rng, &mut ids);
        let mut zrp = Zrp::new(addr(1), ZrpConfig::default()).unwrap();
        let reply = IerpMessage::reply(1, vec![addr(3), addr(1), addr(4)]);
        let packet = IpPacket::new(
            Payload::Zrp(ZrpMessage::Ierp(reply)),
            addr(2),
            addr(1),
            protocol::ZRP,
            priority::NORMAL,
            1,
        );
        // Reply hop back toward 3, which node 1 has never heard
        zrp.receive(&mut ctx, &packet, MacAddress::new(2), 0);
        assert!(transmits(ctx.effects()).is_empty());
        assert_eq!(zrp.stats().received.ierp.packets, 1);
    }
}
