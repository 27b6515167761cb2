//! AODV: reactive distance-vector routing
//!
//! Routes are discovered on demand and held hop by hop:
//! - Discovery: expanding-ring Route-Request flood (ttl 1, +2 per retry, cap 19),
//!   fresh request id per attempt, answered by the target or by any node with a
//!   strictly fresher route
//! - Freshness: per-node sequence numbers compared as plain integers (no wraparound)
//! - Dedupe: bounded, age-limited (request id, originator) buffer
//! - Liveness: precursors get HELLOs when quiet, outgoing next hops are
//!   declared lost after too many silent periods, and a Route-Error is sent
//!   to precursors for every destination lost with them

pub mod msg;
pub mod table;

pub use msg::{
    AodvMessage, AodvStats, HelloMsg, PacketCounts, RouteErrorMsg, RouteReplyMsg,
    RouteRequestMsg,
};
pub use table::{OutgoingSet, PrecursorSet, RouteEntry, RouteTable, RreqBuffer};

use crate::net::{
    priority, protocol, InterfaceId, IpPacket, MacAddress, NetAddress, Payload, Protocol,
    TTL_DEFAULT,
};
use crate::route::RouteInterface;
use crate::sim::{DropReason, NodeContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// AODV timing and sizing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AodvConfig {
    /// Period of the maintenance timer
    pub periodic_interval: Duration,
    /// Silence toward a precursor before it is sent a HELLO
    pub hello_interval: Duration,
    /// Silent periods tolerated before an outgoing next hop is declared lost
    pub hello_allowed_loss: u32,
    pub ttl_start: u8,
    pub ttl_increment: u8,
    /// Largest discovery ttl; discovery gives up after waiting on this one
    pub ttl_threshold: u8,
    /// Retry wait is `rreq_timeout_base + rreq_timeout_per_hop * ttl`
    pub rreq_timeout_base: Duration,
    pub rreq_timeout_per_hop: Duration,
    pub rreq_buffer_size: usize,
    pub rreq_buffer_lifetime: Duration,
    /// Upper bound of the random delay added to every transmission
    pub transmission_jitter: Duration,
}

impl Default for AodvConfig {
    fn default() -> Self {
        Self {
            periodic_interval: Duration::from_secs(30),
            hello_interval: Duration::from_secs(30),
            hello_allowed_loss: 3,
            ttl_start: 1,
            ttl_increment: 2,
            ttl_threshold: 19,
            rreq_timeout_base: Duration::from_secs(2),
            rreq_timeout_per_hop: Duration::from_secs(1),
            rreq_buffer_size: 10,
            rreq_buffer_lifetime: Duration::from_secs(5),
            transmission_jitter: Duration::from_millis(1),
        }
    }
}

impl AodvConfig {
    /// How long to wait for a reply to a request sent with `ttl`
    pub fn rreq_timeout(&self, ttl: u8) -> Duration {
        self.rreq_timeout_base + self.rreq_timeout_per_hop * ttl as u32
    }
}

/// AODV timer events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AodvTimer {
    /// Buffer expiry, HELLOs and link-loss detection
    Periodic,
    /// Discovery attempt `rreq_id` toward `dest` went unanswered
    RequestRetry { dest: NetAddress, rreq_id: u32 },
}

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    rreq_id: u32,
    ttl: u8,
}

/// AODV engine for one node
pub struct Aodv {
    local: NetAddress,
    config: AodvConfig,
    seq: u32,
    next_rreq_id: u32,
    table: RouteTable,
    rreq_buffer: RreqBuffer,
    precursors: PrecursorSet,
    outgoing: OutgoingSet,
    /// Packets waiting for a route
    queue: Vec<IpPacket>,
    /// Discoveries in progress, by destination
    pending: BTreeMap<NetAddress, PendingRequest>,
    stats: AodvStats,
}

impl Aodv {
    pub fn new(local: NetAddress) -> Self {
        Self::with_config(local, AodvConfig::default())
    }

    pub fn with_config(local: NetAddress, config: AodvConfig) -> Self {
        let mut table = RouteTable::new();
        table.add(local, RouteEntry::new(MacAddress::NULL, 0, 0));
        Self {
            local,
            rreq_buffer: RreqBuffer::new(config.rreq_buffer_size, config.rreq_buffer_lifetime),
            config,
            seq: 0,
            next_rreq_id: 0,
            table,
            precursors: PrecursorSet::default(),
            outgoing: OutgoingSet::default(),
            queue: Vec::new(),
            pending: BTreeMap::new(),
            stats: AodvStats::default(),
        }
    }

    /// Own sequence number
    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn route_table(&self) -> &RouteTable {
        &self.table
    }

    pub fn precursors(&self) -> &PrecursorSet {
        &self.precursors
    }

    pub fn outgoing(&self) -> &OutgoingSet {
        &self.outgoing
    }

    pub fn stats(&self) -> &AodvStats {
        &self.stats
    }

    /// Number of packets waiting for a route
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_discovering(&self, dest: &NetAddress) -> bool {
        self.pending.contains_key(dest)
    }

    pub fn has_route(&self, dest: &NetAddress) -> bool {
        self.table.next_hop(dest).is_some()
    }

    fn new_rreq_id(&mut self) -> u32 {
        let id = self.next_rreq_id;
        self.next_rreq_id = self.next_rreq_id.wrapping_add(1);
        id
    }

    fn set_seq(&mut self, seq: u32) {
        self.seq = seq;
        match self.table.lookup_mut(&self.local) {
            Some(entry) => entry.dest_seq = seq,
            None => self
                .table
                .add(self.local, RouteEntry::new(MacAddress::NULL, seq, 0)),
        }
    }

    /// Hand a packet to the link layer with jitter, renewing precursor contact
    fn send_ip_msg(&mut self, ctx: &mut NodeContext<'_, AodvTimer>, packet: IpPacket, next_hop: MacAddress) {
        let delay = ctx.random_delay(self.config.transmission_jitter);
        ctx.transmit(packet, next_hop, delay);
        if next_hop == MacAddress::ANY {
            self.precursors.renew_all(ctx.now());
        } else {
            self.precursors.renew(&next_hop, ctx.now());
        }
    }

    fn send_control(
        &mut self,
        ctx: &mut NodeContext<'_, AodvTimer>,
        msg: AodvMessage,
        src: NetAddress,
        dst: NetAddress,
        ttl: u8,
        next_hop: MacAddress,
    ) {
        self.stats.send.count(&msg);
        let packet = IpPacket::new(
            Payload::Aodv(msg),
            src,
            dst,
            protocol::AODV,
            priority::NORMAL,
            ttl,
        )
        .with_id(ctx.next_packet_id());
        self.send_ip_msg(ctx, packet, next_hop);
    }

    //////////////////////////////////////////////////
    // discovery

    fn broadcast_request(
        &mut self,
        ctx: &mut NodeContext<'_, AodvTimer>,
        dest: NetAddress,
        rreq_id: u32,
        ttl: u8,
    ) {
        self.rreq_buffer.add(rreq_id, self.local, ctx.now());

        let (dest_seq, unknown_dest_seq) = match self.table.lookup(&dest) {
            Some(entry) => (entry.dest_seq, false),
            None => (0, true),
        };
        self.set_seq(self.seq + 1);

        let rreq = RouteRequestMsg {
            rreq_id,
            dest,
            orig: self.local,
            dest_seq,
            orig_seq: self.seq,
            unknown_dest_seq,
            hop_count: 0,
        };
        debug!("rreq at={} dest={} id={} ttl={}", self.local, dest, rreq_id, ttl);
        self.send_control(
            ctx,
            AodvMessage::Rreq(rreq),
            self.local,
            NetAddress::ANY,
            ttl,
            MacAddress::ANY,
        );
    }

    fn request_timeout(&mut self, ctx: &mut NodeContext<'_, AodvTimer>, dest: NetAddress, rreq_id: u32) {
        let Some(pending) = self.pending.get(&dest).copied() else {
            return;
        };
        if pending.rreq_id != rreq_id {
            return;
        }

        if let Some(next_hop) = self.table.next_hop(&dest) {
            // Route learned some other way in the meantime
            self.pending.remove(&dest);
            self.dequeue_and_send(ctx, dest, next_hop);
            return;
        }

        if pending.ttl < self.config.ttl_threshold {
            let ttl = pending
                .ttl
                .saturating_add(self.config.ttl_increment)
                .min(self.config.ttl_threshold);
            let rreq_id = self.new_rreq_id();
            self.pending.insert(dest, PendingRequest { rreq_id, ttl });
            self.broadcast_request(ctx, dest, rreq_id, ttl);
            ctx.schedule(
                self.config.rreq_timeout(ttl),
                AodvTimer::RequestRetry { dest, rreq_id },
            );
        } else {
            info!("discovery abandoned at={} dest={}", self.local, dest);
            self.pending.remove(&dest);
            let (dropped, kept): (Vec<_>, Vec<_>) =
                self.queue.drain(..).partition(|p| p.dst == dest);
            self.queue = kept;
            for packet in dropped {
                ctx.drop_packet(packet, DropReason::NoRoute);
            }
        }
    }

    fn dequeue_and_send(&mut self, ctx: &mut NodeContext<'_, AodvTimer>, dest: NetAddress, next_hop: MacAddress) {
        let (ready, kept): (Vec<_>, Vec<_>) = self.queue.drain(..).partition(|p| p.dst == dest);
        self.queue = kept;
        for packet in ready {
            self.send_ip_msg(ctx, packet, next_hop);
        }
    }

    //////////////////////////////////////////////////
    // control message handling

    fn receive_request(
        &mut self,
        ctx: &mut NodeContext<'_, AodvTimer>,
        rreq: &RouteRequestMsg,
        last_hop: MacAddress,
        ttl: u8,
    ) {
        if rreq.orig == self.local {
            return;
        }

        // Reverse route toward the originator
        let update = match self.table.lookup(&rreq.orig) {
            None => true,
            Some(entry) => {
                rreq.orig_seq > entry.dest_seq
                    || (rreq.orig_seq == entry.dest_seq && rreq.hop_count + 1 < entry.hop_count)
            }
        };
        if update {
            self.table.add(
                rreq.orig,
                RouteEntry::new(last_hop, rreq.orig_seq, rreq.hop_count + 1),
            );
        }

        let is_dest = rreq.dest == self.local;
        let dest_entry = self.table.lookup(&rreq.dest).copied();
        let fresh_route = dest_entry.is_some_and(|e| {
            e.is_usable() && !rreq.unknown_dest_seq && e.dest_seq > rreq.dest_seq
        });
        let in_buffer = self.rreq_buffer.contains(rreq.rreq_id, rreq.orig);

        if is_dest || fresh_route {
            if !in_buffer || update {
                self.generate_reply(ctx, rreq, is_dest, dest_entry);
            }
        } else if !in_buffer && ttl > 1 {
            self.forward_request(ctx, rreq, ttl - 1, dest_entry);
        }
    }

    fn forward_request(
        &mut self,
        ctx: &mut NodeContext<'_, AodvTimer>,
        rreq: &RouteRequestMsg,
        ttl: u8,
        dest_entry: Option<RouteEntry>,
    ) {
        self.rreq_buffer.add(rreq.rreq_id, rreq.orig, ctx.now());

        let mut fwd = rreq.clone();
        fwd.hop_count += 1;
        if let Some(entry) = dest_entry {
            if fwd.unknown_dest_seq || entry.dest_seq > fwd.dest_seq {
                fwd.dest_seq = entry.dest_seq;
                fwd.unknown_dest_seq = false;
            }
        }
        debug!("rreq forward at={} orig={} id={} ttl={}", self.local, rreq.orig, rreq.rreq_id, ttl);
        self.send_control(
            ctx,
            AodvMessage::Rreq(fwd),
            self.local,
            NetAddress::ANY,
            ttl,
            MacAddress::ANY,
        );
    }

    fn generate_reply(
        &mut self,
        ctx: &mut NodeContext<'_, AodvTimer>,
        rreq: &RouteRequestMsg,
        is_dest: bool,
        dest_entry: Option<RouteEntry>,
    ) {
        if !self.rreq_buffer.contains(rreq.rreq_id, rreq.orig) {
            self.rreq_buffer.add(rreq.rreq_id, rreq.orig, ctx.now());
        }

        if !rreq.unknown_dest_seq && rreq.dest_seq > self.seq {
            self.set_seq(rreq.dest_seq);
        }

        let (hop_count, dest_seq) = match (is_dest, dest_entry) {
            (false, Some(entry)) => (entry.hop_count, entry.dest_seq),
            _ => (0, self.seq),
        };

        let Some(next_hop) = self.table.next_hop(&rreq.orig) else {
            debug!("rrep at={} has no reverse route to {}", self.local, rreq.orig);
            return;
        };

        let rrep = RouteReplyMsg {
            dest: rreq.dest,
            dest_seq,
            orig: rreq.orig,
            hop_count,
        };
        debug!("rrep at={} dest={} orig={} hops={}", self.local, rreq.dest, rreq.orig, hop_count);
        self.stats.rrep_originated += 1;
        self.send_control(
            ctx,
            AodvMessage::Rrep(rrep),
            self.local,
            NetAddress::ANY,
            TTL_DEFAULT,
            next_hop,
        );
        self.precursors.add(next_hop, ctx.now());
        self.outgoing.add(next_hop);
    }

    fn receive_reply(
        &mut self,
        ctx: &mut NodeContext<'_, AodvTimer>,
        rrep: &RouteReplyMsg,
        packet: &IpPacket,
        last_hop: MacAddress,
    ) {
        if rrep.dest == self.local {
            return;
        }

        let update = match self.table.lookup(&rrep.dest) {
            None => true,
            Some(entry) => {
                rrep.dest_seq > entry.dest_seq
                    || (rrep.dest_seq == entry.dest_seq && rrep.hop_count < entry.hop_count)
            }
        };
        if update {
            info!(
                "route at={} dest={} via={} hops={}",
                self.local,
                rrep.dest,
                last_hop,
                rrep.hop_count + 1
            );
            self.table.add(
                rrep.dest,
                RouteEntry::new(last_hop, rrep.dest_seq, rrep.hop_count + 1),
            );
            self.outgoing.add(last_hop);
            self.precursors.add(last_hop, ctx.now());
        }

        if rrep.orig == self.local {
            if self.pending.remove(&rrep.dest).is_some() {
                self.stats.rreq_succeeded += 1;
            }
            self.dequeue_and_send(ctx, rrep.dest, last_hop);
        } else if let Some(next_hop) = self.table.next_hop(&rrep.orig) {
            if packet.ttl == 0 {
                return;
            }
            let mut fwd = rrep.clone();
            fwd.hop_count += 1;
            self.send_control(
                ctx,
                AodvMessage::Rrep(fwd),
                packet.src,
                packet.dst,
                packet.ttl - 1,
                next_hop,
            );
            self.precursors.add(next_hop, ctx.now());
            self.outgoing.add(next_hop);
        }
    }

    fn receive_error(&mut self, ctx: &mut NodeContext<'_, AodvTimer>, rerr: &RouteErrorMsg, ttl: u8) {
        let unreachable: Vec<NetAddress> = rerr
            .unreachable
            .iter()
            .copied()
            .filter(|d| *d != self.local)
            .collect();
        if self.table.remove_list(&unreachable) && ttl > 0 {
            self.send_error(ctx, unreachable, ttl - 1);
        }
    }

    /// Send a Route-Error to every precursor
    fn send_error(&mut self, ctx: &mut NodeContext<'_, AodvTimer>, unreachable: Vec<NetAddress>, ttl: u8) {
        if unreachable.is_empty() {
            return;
        }
        for mac in self.precursors.macs() {
            debug!("rerr at={} to={} lost={:?}", self.local, mac, unreachable);
            let rerr = RouteErrorMsg {
                unreachable: unreachable.clone(),
            };
            self.send_control(ctx, AodvMessage::Rerr(rerr), self.local, NetAddress::ANY, ttl, mac);
        }
    }

    //////////////////////////////////////////////////
    // maintenance

    fn periodic(&mut self, ctx: &mut NodeContext<'_, AodvTimer>) {
        self.rreq_buffer.clear_expired(ctx.now());
        self.send_hellos(ctx);
        self.check_outgoing(ctx);
        ctx.schedule(self.config.periodic_interval, AodvTimer::Periodic);
    }

    fn send_hellos(&mut self, ctx: &mut NodeContext<'_, AodvTimer>) {
        for mac in self.precursors.quiet_since(ctx.now(), self.config.hello_interval) {
            let hello = HelloMsg {
                addr: self.local,
                seq: self.seq,
            };
            self.send_control(ctx, AodvMessage::Hello(hello), self.local, NetAddress::ANY, 1, mac);
        }
    }

    fn check_outgoing(&mut self, ctx: &mut NodeContext<'_, AodvTimer>) {
        for mac in self.outgoing.tick(self.config.hello_allowed_loss) {
            let lost = self.table.remove_next_hop(mac);
            self.precursors.remove(&mac);
            info!("link lost at={} next_hop={} dests={:?}", self.local, mac, lost);
            self.send_error(ctx, lost, TTL_DEFAULT);
        }
    }
}

impl RouteInterface for Aodv {
    type Timer = AodvTimer;
    const PROTOCOL: Protocol = protocol::AODV;

    fn local_addr(&self) -> NetAddress {
        self.local
    }

    fn start(&mut self, ctx: &mut NodeContext<'_, AodvTimer>) {
        self.periodic(ctx);
    }

    fn peek(&mut self, _ctx: &mut NodeContext<'_, AodvTimer>, _packet: &IpPacket, last_hop: MacAddress) {
        self.outgoing.heard_from(&last_hop);
    }

    fn send(&mut self, ctx: &mut NodeContext<'_, AodvTimer>, packet: IpPacket) {
        let dest = packet.dst;
        if dest == self.local {
            ctx.deliver(packet);
            return;
        }

        if let Some(next_hop) = self.table.next_hop(&dest) {
            self.send_ip_msg(ctx, packet, next_hop);
            return;
        }

        self.queue.push(packet);
        if self.pending.contains_key(&dest) {
            return;
        }

        let ttl = self.config.ttl_start;
        let rreq_id = self.new_rreq_id();
        self.pending.insert(dest, PendingRequest { rreq_id, ttl });
        self.stats.rreq_originated += 1;
        self.broadcast_request(ctx, dest, rreq_id, ttl);
        ctx.schedule(
            self.config.rreq_timeout(ttl),
            AodvTimer::RequestRetry { dest, rreq_id },
        );
    }

    fn receive(
        &mut self,
        ctx: &mut NodeContext<'_, AodvTimer>,
        packet: &IpPacket,
        last_hop: MacAddress,
        _interface: InterfaceId,
    ) {
        let Payload::Aodv(msg) = &packet.payload else {
            debug!("aodv at={} ignoring non-aodv payload", self.local);
            return;
        };
        self.stats.recv.count(msg);
        match msg {
            AodvMessage::Rreq(rreq) => self.receive_request(ctx, rreq, last_hop, packet.ttl),
            AodvMessage::Rrep(rrep) => self.receive_reply(ctx, rrep, packet, last_hop),
            AodvMessage::Rerr(rerr) => self.receive_error(ctx, rerr, packet.ttl),
            AodvMessage::Hello(_) => {}
        }
    }

    fn timeout(&mut self, ctx: &mut NodeContext<'_, AodvTimer>, timer: AodvTimer) {
        match timer {
            AodvTimer::Periodic => self.periodic(ctx),
            AodvTimer::RequestRetry { dest, rreq_id } => self.request_timeout(ctx, dest, rreq_id),
        }
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

    fn mac(n: u32) -> MacAddress {
        MacAddress::new(n)
    }

    fn run<F>(aodv: &mut Aodv, now: Duration, f: F) -> Vec<Effect<AodvTimer>>
    where
        F: FnOnce(&mut Aodv, &mut NodeContext<'_, AodvTimer>),
    {
        let mut rng = StdRng::seed_from_u64(3);
        let mut id = 0;
        let mut ctx = NodeContext::new(aodv.local_addr(), now, &mut rng, &mut id);
        f(aodv, &mut ctx);
        ctx.into_effects()
    }

    fn data(src: u32, dst: u32) -> IpPacket {
        IpPacket::new(
            Payload::Data(vec![0; 8]),
            addr(src),
            addr(dst),
            protocol::UDP,
            priority::NORMAL,
            TTL_DEFAULT,
        )
    }

    fn control(msg: AodvMessage, src: u32, ttl: u8) -> IpPacket {
        IpPacket::new(
            Payload::Aodv(msg),
            addr(src),
            NetAddress::ANY,
            protocol::AODV,
            priority::NORMAL,
            ttl,
        )
    }

    fn rreq(id: u32, orig: u32, dest: u32, orig_seq: u32, hops: u32) -> RouteRequestMsg {
        RouteRequestMsg {
            rreq_id: id,
            dest: addr(dest),
            orig: addr(orig),
            dest_seq: 0,
            orig_seq,
            unknown_dest_seq: true,
            hop_count: hops,
        }
    }

    fn transmitted(effects: &[Effect<AodvTimer>]) -> Vec<(&AodvMessage, MacAddress, u8)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Transmit {
                    packet, next_hop, ..
                } => match &packet.payload {
                    Payload::Aodv(msg) => Some((msg, *next_hop, packet.ttl)),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    fn retry_timer(effects: &[Effect<AodvTimer>]) -> Option<(Duration, AodvTimer)> {
        effects.iter().find_map(|e| match e {
            Effect::Schedule {
                delay,
                timer: timer @ AodvTimer::RequestRetry { .. },
            } => Some((*delay, timer.clone())),
            _ => None,
        })
    }

    #[test]
    fn test_send_without_route_starts_discovery() {
        let mut aodv = Aodv::new(addr(1));
        let effects = run(&mut aodv, Duration::ZERO, |a, ctx| a.send(ctx, data(1, 4)));

        let sent = transmitted(&effects);
        assert_eq!(sent.len(), 1);
        let (msg, next_hop, ttl) = sent[0];
        assert!(matches!(msg, AodvMessage::Rreq(r) if r.dest == addr(4) && r.unknown_dest_seq));
        assert_eq!(next_hop, MacAddress::ANY);
        assert_eq!(ttl, 1);

        let (delay, _) = retry_timer(&effects).unwrap();
        assert_eq!(delay, Duration::from_secs(3));
        assert_eq!(aodv.queued(), 1);
        assert_eq!(aodv.seq(), 1);
        assert!(aodv.is_discovering(&addr(4)));
    }

    #[test]
    fn test_second_send_joins_pending_discovery() {
        let mut aodv = Aodv::new(addr(1));
        run(&mut aodv, Duration::ZERO, |a, ctx| a.send(ctx, data(1, 4)));
        let effects = run(&mut aodv, Duration::from_millis(5), |a, ctx| a.send(ctx, data(1, 4)));

        assert!(transmitted(&effects).is_empty());
        assert_eq!(aodv.queued(), 2);
        assert_eq!(aodv.stats().rreq_originated, 1);
    }

    #[test]
    fn test_expanding_ring_then_abandon() {
        let mut aodv = Aodv::new(addr(1));
        let mut effects = run(&mut aodv, Duration::ZERO, |a, ctx| a.send(ctx, data(1, 4)));
        let mut ttls = vec![1u8];
        let mut now = Duration::ZERO;

        while let Some((delay, timer)) = retry_timer(&effects) {
            now += delay;
            effects = run(&mut aodv, now, |a, ctx| a.timeout(ctx, timer));
            ttls.extend(transmitted(&effects).iter().map(|(_, _, ttl)| *ttl));
        }

        assert_eq!(ttls, vec![1, 3, 5, 7, 9, 11, 13, 15, 17, 19]);
        let drops: Vec<_> = effects
            .iter()
            .filter(|e| matches!(e, Effect::Drop { reason: DropReason::NoRoute, .. }))
            .collect();
        assert_eq!(drops.len(), 1);
        assert_eq!(aodv.queued(), 0);
        assert!(!aodv.is_discovering(&addr(4)));
    }

    #[test]
    fn test_stale_retry_timer_ignored() {
        let mut aodv = Aodv::new(addr(1));
        let effects = run(&mut aodv, Duration::ZERO, |a, ctx| a.send(ctx, data(1, 4)));
        let (_, timer) = retry_timer(&effects).unwrap();
        run(&mut aodv, Duration::from_secs(3), |a, ctx| a.timeout(ctx, timer.clone()));

        // The first attempt's timer firing again must not start another round
        let effects = run(&mut aodv, Duration::from_secs(4), |a, ctx| a.timeout(ctx, timer));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_destination_replies_along_reverse_route() {
        let mut aodv = Aodv::new(addr(4));
        let packet = control(AodvMessage::Rreq(rreq(0, 1, 4, 1, 2)), 3, 5);
        let effects = run(&mut aodv, Duration::ZERO, |a, ctx| {
            a.receive(ctx, &packet, mac(3), 0)
        });

        let sent = transmitted(&effects);
        assert_eq!(sent.len(), 1);
        let (msg, next_hop, _) = sent[0];
        match msg {
            AodvMessage::Rrep(rrep) => {
                assert_eq!(rrep.dest, addr(4));
                assert_eq!(rrep.orig, addr(1));
                assert_eq!(rrep.hop_count, 0);
            }
            other => panic!("expected rrep, got {:?}", other),
        }
        assert_eq!(next_hop, mac(3));

        let reverse = aodv.route_table().lookup(&addr(1)).unwrap();
        assert_eq!(reverse.next_hop, mac(3));
        assert_eq!(reverse.hop_count, 3);
        assert!(aodv.precursors().contains(&mac(3)));
        assert!(aodv.outgoing().contains(&mac(3)));
    }

    #[test]
    fn test_intermediate_forwards_once() {
        let mut aodv = Aodv::new(addr(2));
        let packet = control(AodvMessage::Rreq(rreq(7, 1, 4, 1, 0)), 1, 3);

        let effects = run(&mut aodv, Duration::ZERO, |a, ctx| a.receive(ctx, &packet, mac(1), 0));
        let sent = transmitted(&effects);
        assert_eq!(sent.len(), 1);
        let (msg, next_hop, ttl) = sent[0];
        assert!(matches!(msg, AodvMessage::Rreq(r) if r.hop_count == 1 && r.rreq_id == 7));
        assert_eq!(next_hop, MacAddress::ANY);
        assert_eq!(ttl, 2);

        let effects = run(&mut aodv, Duration::from_millis(1), |a, ctx| {
            a.receive(ctx, &packet, mac(3), 0)
        });
        assert!(transmitted(&effects).is_empty());
    }

    #[test]
    fn test_request_with_ttl_one_not_forwarded() {
        let mut aodv = Aodv::new(addr(2));
        let packet = control(AodvMessage::Rreq(rreq(0, 1, 4, 1, 0)), 1, 1);
        let effects = run(&mut aodv, Duration::ZERO, |a, ctx| a.receive(ctx, &packet, mac(1), 0));
        assert!(transmitted(&effects).is_empty());
        // Reverse route is still learned
        assert!(aodv.has_route(&addr(1)));
    }

    #[test]
    fn test_intermediate_with_fresher_route_replies() {
        let mut aodv = Aodv::new(addr(2));
        aodv.table.add(addr(4), RouteEntry::new(mac(3), 5, 2));

        let mut request = rreq(0, 1, 4, 1, 0);
        request.unknown_dest_seq = false;
        request.dest_seq = 4;
        let packet = control(AodvMessage::Rreq(request.clone()), 1, 3);
        let effects = run(&mut aodv, Duration::ZERO, |a, ctx| a.receive(ctx, &packet, mac(1), 0));
        let sent = transmitted(&effects);
        assert!(matches!(
            sent[0].0,
            AodvMessage::Rrep(r) if r.dest_seq == 5 && r.hop_count == 2
        ));

        // Same sequence number is not fresher: forward instead
        let mut aodv = Aodv::new(addr(2));
        aodv.table.add(addr(4), RouteEntry::new(mac(3), 5, 2));
        request.dest_seq = 5;
        let packet = control(AodvMessage::Rreq(request), 1, 3);
        let effects = run(&mut aodv, Duration::ZERO, |a, ctx| a.receive(ctx, &packet, mac(1), 0));
        assert!(matches!(transmitted(&effects)[0].0, AodvMessage::Rreq(_)));
    }

    #[test]
    fn test_reply_releases_queue_at_originator() {
        let mut aodv = Aodv::new(addr(1));
        run(&mut aodv, Duration::ZERO, |a, ctx| a.send(ctx, data(1, 4)));

        let rrep = RouteReplyMsg {
            dest: addr(4),
            dest_seq: 1,
            orig: addr(1),
            hop_count: 2,
        };
        let packet = control(AodvMessage::Rrep(rrep), 2, 62);
        let effects = run(&mut aodv, Duration::from_millis(10), |a, ctx| {
            a.receive(ctx, &packet, mac(2), 0)
        });

        let released: Vec<_> = effects
            .iter()
            .filter(|e| matches!(e, Effect::Transmit { packet, next_hop, .. }
                if matches!(packet.payload, Payload::Data(_)) && *next_hop == mac(2)))
            .collect();
        assert_eq!(released.len(), 1);
        assert_eq!(aodv.queued(), 0);
        assert!(!aodv.is_discovering(&addr(4)));
        assert_eq!(aodv.route_table().lookup(&addr(4)).unwrap().hop_count, 3);
        assert_eq!(aodv.stats().rreq_succeeded, 1);
    }

    #[test]
    fn test_older_reply_does_not_replace_route() {
        let mut aodv = Aodv::new(addr(2));
        aodv.table.add(addr(4), RouteEntry::new(mac(3), 8, 2));

        let rrep = RouteReplyMsg {
            dest: addr(4),
            dest_seq: 7,
            orig: addr(9),
            hop_count: 0,
        };
        let packet = control(AodvMessage::Rrep(rrep), 5, 10);
        run(&mut aodv, Duration::ZERO, |a, ctx| a.receive(ctx, &packet, mac(5), 0));

        let entry = aodv.route_table().lookup(&addr(4)).unwrap();
        assert_eq!(entry.next_hop, mac(3));
        assert_eq!(entry.dest_seq, 8);
    }

    #[test]
    fn test_silent_next_hop_triggers_route_error() {
        let mut aodv = Aodv::new(addr(2));
        aodv.table.add(addr(3), RouteEntry::new(mac(3), 1, 1));
        aodv.table.add(addr(4), RouteEntry::new(mac(3), 1, 2));
        aodv.outgoing.add(mac(3));
        aodv.precursors.add(mac(1), Duration::ZERO);

        let mut now = Duration::ZERO;
        let mut last = Vec::new();
        for _ in 0..5 {
            now += Duration::from_secs(30);
            last = run(&mut aodv, now, |a, ctx| a.timeout(ctx, AodvTimer::Periodic));
        }

        assert!(!aodv.has_route(&addr(3)));
        assert!(!aodv.has_route(&addr(4)));
        assert!(!aodv.outgoing().contains(&mac(3)));

        let errors: Vec<_> = transmitted(&last)
            .into_iter()
            .filter_map(|(msg, next_hop, _)| match msg {
                AodvMessage::Rerr(rerr) => Some((rerr.unreachable.clone(), next_hop)),
                _ => None,
            })
            .collect();
        assert_eq!(errors, vec![(vec![addr(3), addr(4)], mac(1))]);
    }

    #[test]
    fn test_peek_keeps_next_hop_alive() {
        let mut aodv = Aodv::new(addr(2));
        aodv.table.add(addr(3), RouteEntry::new(mac(3), 1, 1));
        aodv.outgoing.add(mac(3));

        let mut now = Duration::ZERO;
        for _ in 0..10 {
            now += Duration::from_secs(30);
            let heard = data(3, 2);
            run(&mut aodv, now, |a, ctx| {
                a.peek(ctx, &heard, mac(3));
                a.timeout(ctx, AodvTimer::Periodic)
            });
        }
        assert!(aodv.has_route(&addr(3)));
    }

    #[test]
    fn test_route_error_forwarded_only_if_something_removed() {
        let mut aodv = Aodv::new(addr(1));
        aodv.table.add(addr(4), RouteEntry::new(mac(2), 1, 3));
        aodv.precursors.add(mac(9), Duration::ZERO);

        let rerr = RouteErrorMsg {
            unreachable: vec![addr(4)],
        };
        let packet = control(AodvMessage::Rerr(rerr), 2, 5);
        let effects = run(&mut aodv, Duration::ZERO, |a, ctx| a.receive(ctx, &packet, mac(2), 0));
        assert!(!aodv.has_route(&addr(4)));
        assert_eq!(transmitted(&effects).len(), 1);

        let effects = run(&mut aodv, Duration::ZERO, |a, ctx| a.receive(ctx, &packet, mac(2), 0));
        assert!(transmitted(&effects).is_empty());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = AodvConfig {
            hello_allowed_loss: 5,
            ..AodvConfig::default()
        };
        let json = crate::config_to_json(&config).unwrap();
        let restored: AodvConfig = crate::config_from_json(&json).unwrap();
        assert_eq!(restored, config);
    }
}
