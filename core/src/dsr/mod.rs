//! DSR: on-demand source routing
//!
//! Every packet carries its full hop list. All DSR frames go out as link
//! broadcasts, so every neighbour sees them; option processing (forwarding,
//! replies, acks, errors, route shortening) happens in `peek`, and `receive`
//! only hands encapsulated content up once it reaches its destination.
//!
//! Hop-by-hop maintenance: intermediate hops wait for a passive ack (the
//! next hop overheard forwarding the packet), the last hop and packets that
//! missed their passive ack use explicit Ack-Request / Acknowledgement
//! options with bounded retransmission.

pub mod cache;
pub mod msg;
pub mod tables;

pub use cache::RouteCache;
pub use msg::{
    DsrOption, DsrPacket, RouteErrorOption, RouteErrorType, RouteReplyOption,
    RouteRequestOption, SourceRouteOption, UnrecognizedPolicy,
};
pub use tables::{
    Discovery, MaintenanceBuffer, MaintenanceKey, ReplyHoldoff, RequestTable, SendBuffer,
};

use crate::net::{
    priority, protocol, InterfaceId, IpPacket, MacAddress, NetAddress, Payload, TTL_DEFAULT,
};
use crate::route::RouteInterface;
use crate::sim::{DropReason, NodeContext};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DsrError {
    #[error("Buffer too short: need {need} bytes, got {got}")]
    BufferTooShort { need: usize, got: usize },

    #[error("Bad data length {len} for option type {ty}")]
    BadOptionLength { ty: u8, len: usize },

    #[error("Option type {ty} runs past the options header")]
    OptionOverrun { ty: u8 },

    #[error("Option type {ty} too long to encode: {len} bytes")]
    OptionTooLong { ty: u8, len: usize },

    #[error("Segments left {segments_left} out of range for {addrs} addresses")]
    SegmentsLeftOutOfRange { segments_left: u8, addrs: usize },

    #[error("Salvage count out of range: {0}")]
    SalvageOutOfRange(u8),

    #[error("Unknown route error type: {0}")]
    UnknownErrorType(u8),
}

/// DSR timing and sizing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DsrConfig {
    /// Wait before the first discovery retry; doubles per retry
    pub request_period: Duration,
    /// Discovery is abandoned once the retry wait reaches this
    pub max_request_period: Duration,
    /// First wait for a network-level ack; doubles per retransmission
    pub maint_period: Duration,
    /// Retransmissions allowed before the next hop is declared unreachable
    pub max_maint_rexmt: u32,
    pub passive_ack_timeout: Duration,
    /// Passive ack attempts before falling back to network-level acks
    pub try_passive_acks: u32,
    /// Quiet time after a gratuitous reply for the same originator and hop
    pub grat_reply_holdoff: Duration,
    pub send_buffer_timeout: Duration,
    /// Request ids remembered per originator
    pub max_request_table_ids: usize,
    pub broadcast_jitter: Duration,
}

impl Default for DsrConfig {
    fn default() -> Self {
        Self {
            request_period: Duration::from_millis(500),
            max_request_period: Duration::from_secs(10),
            maint_period: Duration::from_millis(500),
            max_maint_rexmt: 2,
            passive_ack_timeout: Duration::from_millis(100),
            try_passive_acks: 1,
            grat_reply_holdoff: Duration::from_secs(1),
            send_buffer_timeout: Duration::from_secs(30),
            max_request_table_ids: 16,
            broadcast_jitter: Duration::from_millis(10),
        }
    }
}

/// DSR timer events
#[derive(Debug, Clone, PartialEq)]
pub enum DsrTimer {
    /// Retry discovery of `target`; `attempt` guards against stale timers
    RequestRetry { target: NetAddress, attempt: u32 },
    /// No passive ack heard yet for `packet`
    PassiveAck { packet: IpPacket, attempt: u32 },
    /// No network-level ack `ack_id` heard yet for `packet`
    NetworkAck {
        packet: IpPacket,
        ack_id: u16,
        timeout: Duration,
        attempt: u32,
    },
    /// Buffered packet under `key` waited too long for a route
    BufferExpiry { key: u64 },
    HoldoffExpiry {
        originator: NetAddress,
        last_hop: NetAddress,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsrStats {
    pub requests_originated: u64,
    pub requests_forwarded: u64,
    pub replies_originated: u64,
    pub gratuitous_replies: u64,
    pub errors_originated: u64,
    pub acks_sent: u64,
    pub retransmissions: u64,
    pub data_sent: u64,
    pub data_received: u64,
}

/// Outcome of screening a header for options this node does not understand
enum Screened<'a> {
    Keep(Cow<'a, DsrPacket>),
    Drop(u8),
}

fn screen_unrecognized(dsr: &DsrPacket) -> Screened<'_> {
    if !dsr
        .options
        .iter()
        .any(|o| matches!(o, DsrOption::Unknown { .. }))
    {
        return Screened::Keep(Cow::Borrowed(dsr));
    }

    let mut out = DsrPacket {
        next_header: dsr.next_header,
        options: Vec::with_capacity(dsr.options.len()),
        content: dsr.content.clone(),
    };
    for opt in &dsr.options {
        let DsrOption::Unknown { ty, data } = opt else {
            out.options.push(opt.clone());
            continue;
        };
        match UnrecognizedPolicy::from_type(*ty) {
            UnrecognizedPolicy::Ignore => out.options.push(opt.clone()),
            UnrecognizedPolicy::Remove => {}
            UnrecognizedPolicy::Mark => {
                let mut data = data.clone();
                if let Some(first) = data.first_mut() {
                    *first |= 0x80;
                }
                out.options.push(DsrOption::Unknown { ty: *ty, data });
            }
            UnrecognizedPolicy::DropPacket => return Screened::Drop(*ty),
        }
    }
    Screened::Keep(Cow::Owned(out))
}

fn next_recipient(sr: Option<&SourceRouteOption>, dst: NetAddress) -> Option<NetAddress> {
    match sr {
        Some(sr) => sr.next_recipient(dst),
        None => Some(dst),
    }
}

fn prev_recipient(sr: Option<&SourceRouteOption>, src: NetAddress) -> Option<NetAddress> {
    match sr {
        Some(sr) => sr.prev_recipient(src),
        None => Some(src),
    }
}

/// Same packet identity with a new DSR header and ttl
fn repackage(ip: &IpPacket, dsr: DsrPacket, ttl: u8) -> IpPacket {
    IpPacket {
        src: ip.src,
        dst: ip.dst,
        protocol: ip.protocol,
        priority: ip.priority,
        ttl,
        id: ip.id,
        frag_offset: ip.frag_offset,
        payload: Payload::Dsr(dsr),
        source_route: ip.source_route.clone(),
    }
}

/// DSR engine for one node
pub struct Dsr {
    local: NetAddress,
    config: DsrConfig,
    cache: RouteCache,
    requests: RequestTable,
    send_buffer: SendBuffer,
    maintenance: MaintenanceBuffer,
    holdoff: ReplyHoldoff,
    /// Targets with a discovery in progress
    active_requests: BTreeSet<NetAddress>,
    /// Ack-Request ids still awaiting their Acknowledgement
    active_acks: HashSet<u16>,
    next_request_id: u16,
    next_ack_id: u16,
    stats: DsrStats,
}

impl Dsr {
    pub fn new(local: NetAddress) -> Self {
        Self::with_config(local, DsrConfig::default())
    }

    pub fn with_config(local: NetAddress, config: DsrConfig) -> Self {
        Self {
            local,
            requests: RequestTable::new(config.max_request_table_ids, config.request_period),
            config,
            cache: RouteCache::new(),
            send_buffer: SendBuffer::default(),
            maintenance: MaintenanceBuffer::default(),
            holdoff: ReplyHoldoff::default(),
            active_requests: BTreeSet::new(),
            active_acks: HashSet::new(),
            next_request_id: 0,
            next_ack_id: 0,
            stats: DsrStats::default(),
        }
    }

    pub fn config(&self) -> &DsrConfig {
        &self.config
    }

    pub fn route_cache(&self) -> &RouteCache {
        &self.cache
    }

    pub fn request_table(&self) -> &RequestTable {
        &self.requests
    }

    pub fn maintenance(&self) -> &MaintenanceBuffer {
        &self.maintenance
    }

    pub fn stats(&self) -> &DsrStats {
        &self.stats
    }

    /// Packets waiting for a route
    pub fn buffered(&self) -> usize {
        self.send_buffer.len()
    }

    pub fn is_discovering(&self, target: &NetAddress) -> bool {
        self.active_requests.contains(target)
    }

    pub fn awaiting_acks(&self) -> usize {
        self.active_acks.len()
    }

    fn control_packet(
        &self,
        ctx: &mut NodeContext<'_, DsrTimer>,
        dst: NetAddress,
        dsr: DsrPacket,
    ) -> IpPacket {
        IpPacket::new(
            Payload::Dsr(dsr),
            self.local,
            dst,
            protocol::DSR,
            priority::NORMAL,
            TTL_DEFAULT,
        )
        .with_id(ctx.next_packet_id())
    }

    //////////////////////////////////////////////////
    // route cache and send buffer

    fn insert_route(&mut self, ctx: &mut NodeContext<'_, DsrTimer>, dest: NetAddress, route: Vec<NetAddress>) {
        if dest == self.local || route.contains(&self.local) {
            return;
        }
        let hops = route.len();
        if self.cache.insert(dest, route) {
            debug!("dsr cache at={} dest={} hops={}", self.local, dest, hops);
            self.check_buffer(ctx, dest);
        }
    }

    /// Send everything buffered for `dest` along the shortest cached route
    fn check_buffer(&mut self, ctx: &mut NodeContext<'_, DsrTimer>, dest: NetAddress) {
        let Some(route) = self.cache.shortest(&dest).map(<[NetAddress]>::to_vec) else {
            return;
        };
        for packet in self.send_buffer.take_for(&dest) {
            self.send_with_route(ctx, packet, &route);
        }
    }

    fn send_with_route(&mut self, ctx: &mut NodeContext<'_, DsrTimer>, ip: IpPacket, route: &[NetAddress]) {
        let mut dsr = DsrPacket::encapsulate(ip.protocol, ip.payload);
        if !route.is_empty() {
            dsr.options
                .push(DsrOption::SourceRoute(SourceRouteOption::new(route.to_vec())));
        }
        debug!("dsr send at={} dst={} route_len={}", self.local, ip.dst, route.len());
        self.stats.data_sent += 1;

        let packet = IpPacket {
            src: ip.src,
            dst: ip.dst,
            protocol: protocol::DSR,
            priority: ip.priority,
            ttl: ip.ttl,
            id: ip.id,
            frag_offset: ip.frag_offset,
            payload: Payload::Dsr(dsr),
            source_route: None,
        };
        self.transmit(ctx, packet, Duration::ZERO);
    }

    //////////////////////////////////////////////////
    // discovery

    fn discover_route(&mut self, ctx: &mut NodeContext<'_, DsrTimer>, target: NetAddress) {
        if !self.active_requests.contains(&target) {
            return;
        }
        let now = ctx.now();
        if !self.requests.discovery_mut(target, now).may_request(now) {
            return;
        }

        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let request = DsrPacket::control(vec![DsrOption::RouteRequest(RouteRequestOption {
            id,
            target,
            addrs: Vec::new(),
        })]);
        let packet = self.control_packet(ctx, NetAddress::ANY, request);
        debug!("dsr rreq at={} target={} id={}", self.local, target, id);
        ctx.transmit(packet, MacAddress::ANY, Duration::ZERO);
        self.stats.requests_originated += 1;

        let d = self.requests.discovery_mut(target, now);
        d.last_request = now;
        if d.requests_since_reply > 0 {
            d.timeout *= 2;
        }
        d.requests_since_reply += 1;
        let (wait, attempt) = (d.timeout, d.requests_since_reply);

        if wait < self.config.max_request_period {
            ctx.schedule(wait, DsrTimer::RequestRetry { target, attempt });
        } else {
            info!("dsr discovery abandoned at={} target={}", self.local, target);
            self.active_requests.remove(&target);
            self.requests.forget_discovery(&target);
        }
    }

    fn request_retry(&mut self, ctx: &mut NodeContext<'_, DsrTimer>, target: NetAddress, attempt: u32) {
        let current = self
            .requests
            .discovery(&target)
            .map(|d| d.requests_since_reply);
        if current != Some(attempt) {
            return;
        }
        if self.cache.contains(&target) {
            self.active_requests.remove(&target);
            self.requests.reply_received(&target);
            self.check_buffer(ctx, target);
            return;
        }
        self.discover_route(ctx, target);
    }

    fn handle_request(
        &mut self,
        ctx: &mut NodeContext<'_, DsrTimer>,
        ip: &IpPacket,
        msg: &DsrPacket,
        rreq: &RouteRequestOption,
    ) {
        if ip.src == self.local || self.requests.seen_lately(ip.src, rreq.id) {
            return;
        }

        if rreq.target == self.local {
            self.send_route_reply(ctx, rreq, ip.src);
        } else {
            self.forward_request(ctx, ip, msg, rreq);
        }
        self.requests.add_id(ip.src, rreq.id);
    }

    fn forward_request(
        &mut self,
        ctx: &mut NodeContext<'_, DsrTimer>,
        ip: &IpPacket,
        msg: &DsrPacket,
        rreq: &RouteRequestOption,
    ) {
        if rreq.addrs.contains(&self.local) || ip.ttl <= 1 {
            return;
        }

        let mut fwd = msg.clone();
        for opt in fwd.options.iter_mut() {
            if let DsrOption::RouteRequest(r) = opt {
                if r.id == rreq.id && r.target == rreq.target {
                    r.addrs.push(self.local);
                }
            }
        }
        trace!("dsr rreq forward at={} src={} id={}", self.local, ip.src, rreq.id);
        self.stats.requests_forwarded += 1;
        let delay = ctx.random_delay(self.config.broadcast_jitter);
        ctx.transmit(repackage(ip, fwd, ip.ttl - 1), MacAddress::ANY, delay);
    }

    fn send_route_reply(&mut self, ctx: &mut NodeContext<'_, DsrTimer>, rreq: &RouteRequestOption, src: NetAddress) {
        let mut route_to_here = Vec::with_capacity(rreq.addrs.len() + 2);
        route_to_here.push(src);
        route_to_here.extend_from_slice(&rreq.addrs);
        route_to_here.push(self.local);
        let route_back: Vec<NetAddress> = rreq.addrs.iter().rev().copied().collect();

        let mut reply = DsrPacket::control(vec![DsrOption::RouteReply(RouteReplyOption {
            last_hop_external: false,
            addrs: route_to_here,
        })]);
        if !route_back.is_empty() {
            reply
                .options
                .push(DsrOption::SourceRoute(SourceRouteOption::new(route_back.clone())));
        }

        self.insert_route(ctx, src, route_back);

        debug!("dsr rrep at={} to={} id={}", self.local, src, rreq.id);
        self.stats.replies_originated += 1;
        let packet = self.control_packet(ctx, src, reply);
        let delay = ctx.random_delay(self.config.broadcast_jitter);
        self.transmit(ctx, packet, delay);
    }

    fn handle_reply(&mut self, ctx: &mut NodeContext<'_, DsrTimer>, rrep: &RouteReplyOption) {
        let Some((&dest, path)) = rrep.addrs.split_last() else {
            return;
        };
        let Some(pos) = path.iter().position(|a| *a == self.local) else {
            return;
        };

        self.requests.reply_received(&dest);
        self.active_requests.remove(&dest);
        self.insert_route(ctx, dest, path[pos + 1..].to_vec());
    }

    //////////////////////////////////////////////////
    // forwarding and route shortening

    fn forward_packet(
        &mut self,
        ctx: &mut NodeContext<'_, DsrTimer>,
        ip: &IpPacket,
        msg: &DsrPacket,
        sr: &SourceRouteOption,
    ) {
        if ip.dst == self.local {
            return;
        }
        let Some(ttl) = ip.ttl.checked_sub(1) else {
            ctx.drop_packet(ip.clone(), DropReason::TtlExpired);
            return;
        };

        let mut fwd = msg.without_ack_requests();
        for opt in fwd.options.iter_mut() {
            if let DsrOption::SourceRoute(s) = opt {
                s.segments_left = sr.segments_left.saturating_sub(1);
            }
        }
        trace!(
            "dsr forward at={} src={} dst={} segs_left={}",
            self.local,
            ip.src,
            ip.dst,
            sr.segments_left.saturating_sub(1)
        );
        self.transmit(ctx, repackage(ip, fwd, ttl), Duration::ZERO);
    }

    /// Heard a packet that will pass through this node later than it has
    /// to: tell the originator about the shortcut
    fn shorten_route(&mut self, ctx: &mut NodeContext<'_, DsrTimer>, ip: &IpPacket, sr: &SourceRouteOption) {
        let Some(cur) = sr.current() else {
            warn!("dsr at={} segments left past route from {}", self.local, ip.src);
            return;
        };

        // Hops from this node onward, destination excluded
        let suffix: &[NetAddress] = if self.local == ip.dst {
            &[]
        } else {
            match sr.addrs.iter().skip(cur + 1).position(|a| *a == self.local) {
                Some(offset) => &sr.addrs[cur + 1 + offset..],
                None => return,
            }
        };

        let Some(prev) = sr.prev_recipient(ip.src) else {
            return;
        };
        if self.holdoff.contains(ip.src, prev) {
            return;
        }

        let route_to_src: Vec<NetAddress> = sr.addrs[..cur].iter().rev().copied().collect();
        let mut route_from_src = Vec::with_capacity(cur + suffix.len() + 2);
        route_from_src.push(ip.src);
        route_from_src.extend_from_slice(&sr.addrs[..cur]);
        route_from_src.extend_from_slice(suffix);
        route_from_src.push(ip.dst);

        let mut reply = DsrPacket::control(vec![DsrOption::RouteReply(RouteReplyOption {
            last_hop_external: false,
            addrs: route_from_src,
        })]);
        if !route_to_src.is_empty() {
            reply
                .options
                .push(DsrOption::SourceRoute(SourceRouteOption::new(route_to_src)));
        }

        debug!(
            "dsr gratuitous rrep at={} to={} via={} dst={}",
            self.local, ip.src, prev, ip.dst
        );
        self.stats.gratuitous_replies += 1;
        let packet = self.control_packet(ctx, ip.src, reply);
        self.transmit(ctx, packet, Duration::ZERO);

        self.holdoff.insert(ip.src, prev);
        ctx.schedule(
            self.config.grat_reply_holdoff,
            DsrTimer::HoldoffExpiry {
                originator: ip.src,
                last_hop: prev,
            },
        );
    }

    //////////////////////////////////////////////////
    // acknowledgements and route maintenance

    /// Send a DSR packet with the acknowledgement scheme its position on
    /// the route calls for
    fn transmit(&mut self, ctx: &mut NodeContext<'_, DsrTimer>, ip: IpPacket, delay: Duration) {
        let segments_left = match &ip.payload {
            Payload::Dsr(dsr) => dsr.source_route().map_or(0, |sr| sr.segments_left),
            _ => {
                warn!("dsr at={} asked to transmit a non-dsr payload", self.local);
                return;
            }
        };

        if segments_left == 0 {
            self.request_network_ack(ctx, ip, delay);
        } else {
            self.maintenance
                .insert(MaintenanceKey::of(&ip), segments_left);
            self.transmit_with_passive_ack(ctx, ip, 0, delay);
        }
    }

    fn request_network_ack(&mut self, ctx: &mut NodeContext<'_, DsrTimer>, ip: IpPacket, delay: Duration) {
        let Payload::Dsr(dsr) = &ip.payload else {
            return;
        };
        let ack_id = self.next_ack_id;
        self.next_ack_id = self.next_ack_id.wrapping_add(1);
        self.active_acks.insert(ack_id);

        let with_request = dsr.clone().with_option(DsrOption::AckRequest { id: ack_id });
        let packet = repackage(&ip, with_request, ip.ttl);
        let timeout = self.config.maint_period;
        self.transmit_with_network_ack(ctx, packet, ack_id, timeout, 0, delay);
    }

    fn transmit_with_passive_ack(
        &mut self,
        ctx: &mut NodeContext<'_, DsrTimer>,
        ip: IpPacket,
        attempt: u32,
        delay: Duration,
    ) {
        let key = MaintenanceKey::of(&ip);
        if !self.maintenance.contains(&key) {
            // Acknowledged in the meantime
            return;
        }
        if attempt >= self.config.try_passive_acks {
            self.maintenance.remove(&key);
            self.request_network_ack(ctx, ip, delay);
            return;
        }

        ctx.transmit(ip.clone(), MacAddress::ANY, delay);
        let wait = delay
            + self.config.passive_ack_timeout
            + ctx.random_delay(self.config.broadcast_jitter);
        ctx.schedule(
            wait,
            DsrTimer::PassiveAck {
                packet: ip,
                attempt: attempt + 1,
            },
        );
    }

    fn transmit_with_network_ack(
        &mut self,
        ctx: &mut NodeContext<'_, DsrTimer>,
        ip: IpPacket,
        ack_id: u16,
        timeout: Duration,
        attempt: u32,
        delay: Duration,
    ) {
        if !self.active_acks.contains(&ack_id) {
            return;
        }
        if attempt > self.config.max_maint_rexmt {
            self.active_acks.remove(&ack_id);
            self.link_failed(ctx, ip);
            return;
        }
        if attempt > 0 {
            debug!(
                "dsr retransmit at={} src={} dst={} ack={}",
                self.local, ip.src, ip.dst, ack_id
            );
            self.stats.retransmissions += 1;
        }

        ctx.transmit(ip.clone(), MacAddress::ANY, delay);
        let wait = delay + timeout + ctx.random_delay(self.config.broadcast_jitter);
        ctx.schedule(
            wait,
            DsrTimer::NetworkAck {
                packet: ip,
                ack_id,
                timeout: timeout * 2,
                attempt: attempt + 1,
            },
        );
    }

    /// Retransmissions of `ip` went unacknowledged
    fn link_failed(&mut self, ctx: &mut NodeContext<'_, DsrTimer>, ip: IpPacket) {
        let Payload::Dsr(dsr) = &ip.payload else {
            return;
        };

        if ip.src == self.local {
            if let Some(unreachable) = next_recipient(dsr.source_route(), ip.dst) {
                let removed = self.cache.remove_link(self.local, self.local, unreachable);
                info!(
                    "dsr link lost at={} to={} routes_removed={}",
                    self.local, unreachable, removed
                );
            }
            let dst = ip.dst;
            if dsr.content.is_some() {
                ctx.drop_packet(ip, DropReason::LinkBroken);
            }
            if self.cache.contains(&dst) {
                self.check_buffer(ctx, dst);
            }
        } else {
            self.send_route_error(ctx, dsr, ip.src, ip.dst);
            if dsr.content.is_some() {
                ctx.drop_packet(ip, DropReason::LinkBroken);
            }
        }
    }

    fn send_route_error(&mut self, ctx: &mut NodeContext<'_, DsrTimer>, dsr: &DsrPacket, src: NetAddress, dst: NetAddress) {
        let Some(sr) = dsr.source_route() else {
            return;
        };
        let (Some(cur), Some(next)) = (sr.current(), sr.next_recipient(dst)) else {
            return;
        };

        let error = RouteErrorOption::node_unreachable(sr.salvage, self.local, src, next);
        let mut msg = DsrPacket::control(vec![DsrOption::RouteError(error)]);
        if cur > 1 {
            // Hops before this node, reversed
            let route: Vec<NetAddress> = sr.addrs[..cur - 1].iter().rev().copied().collect();
            msg.options
                .push(DsrOption::SourceRoute(SourceRouteOption::new(route.clone())));
            self.insert_route(ctx, src, route);
        }

        info!(
            "dsr route error at={} to={} unreachable={}",
            self.local, src, next
        );
        self.stats.errors_originated += 1;
        let packet = self.control_packet(ctx, src, msg);
        self.transmit(ctx, packet, Duration::ZERO);
    }

    fn handle_error(&mut self, err: &RouteErrorOption) {
        if err.err_type != RouteErrorType::NodeUnreachable {
            return;
        }
        if let Some(unreachable) = err.unreachable() {
            let removed = self.cache.remove_link(self.local, err.src, unreachable);
            if removed > 0 {
                debug!(
                    "dsr route error applied at={} link={}->{} routes_removed={}",
                    self.local, err.src, unreachable, removed
                );
            }
        }
    }

    fn handle_ack_request(
        &mut self,
        ctx: &mut NodeContext<'_, DsrTimer>,
        ip: &IpPacket,
        sr: Option<&SourceRouteOption>,
        id: u16,
    ) {
        if next_recipient(sr, ip.dst) != Some(self.local) {
            return;
        }
        let Some(ack_dest) = prev_recipient(sr, ip.src) else {
            return;
        };
        let ack = DsrPacket::control(vec![DsrOption::Ack {
            id,
            src: self.local,
            dst: ack_dest,
        }]);
        let packet = self.control_packet(ctx, ack_dest, ack);
        trace!("dsr ack at={} to={} id={}", self.local, ack_dest, id);
        self.stats.acks_sent += 1;
        ctx.transmit(packet, MacAddress::ANY, Duration::ZERO);
    }

    fn check_passive_ack(&mut self, ip: &IpPacket, dsr: &DsrPacket) {
        if let Some(sr) = dsr.source_route() {
            if self
                .maintenance
                .passive_ack(&MaintenanceKey::of(ip), sr.segments_left)
            {
                trace!("dsr passive ack at={} src={} id={}", self.local, ip.src, ip.id);
            }
        }
    }

    fn process_options(&mut self, ctx: &mut NodeContext<'_, DsrTimer>, ip: &IpPacket, dsr: &DsrPacket) {
        let msg = match screen_unrecognized(dsr) {
            Screened::Keep(msg) => msg,
            Screened::Drop(ty) => {
                if next_recipient(dsr.source_route(), ip.dst) == Some(self.local) {
                    ctx.drop_packet(ip.clone(), DropReason::UnsupportedOption);
                }
                debug!("dsr at={} dropping packet with option type {}", self.local, ty);
                return;
            }
        };

        let mut ack_request = None;
        for opt in &msg.options {
            match opt {
                DsrOption::RouteRequest(rreq) => self.handle_request(ctx, ip, &msg, rreq),
                DsrOption::RouteReply(rrep) => self.handle_reply(ctx, rrep),
                DsrOption::SourceRoute(sr) => {
                    if sr.next_recipient(ip.dst) == Some(self.local) {
                        self.forward_packet(ctx, ip, &msg, sr);
                    } else {
                        self.shorten_route(ctx, ip, sr);
                    }
                }
                DsrOption::AckRequest { id } => ack_request = Some(*id),
                DsrOption::Ack { id, .. } => {
                    if ip.dst == self.local && self.active_acks.remove(id) {
                        trace!("dsr ack received at={} id={}", self.local, id);
                    }
                }
                DsrOption::RouteError(err) => self.handle_error(err),
                DsrOption::Pad1 | DsrOption::PadN(_) | DsrOption::Unknown { .. } => {}
            }
        }

        if let Some(id) = ack_request {
            self.handle_ack_request(ctx, ip, msg.source_route(), id);
        }
    }
}

impl RouteInterface for Dsr {
    type Timer = DsrTimer;

    const PROTOCOL: crate::net::Protocol = protocol::DSR;

    fn local_addr(&self) -> NetAddress {
        self.local
    }

    fn start(&mut self, _ctx: &mut NodeContext<'_, DsrTimer>) {
        debug!("dsr started at={}", self.local);
    }

    fn peek(&mut self, ctx: &mut NodeContext<'_, DsrTimer>, packet: &IpPacket, _last_hop: MacAddress) {
        if packet.protocol != protocol::DSR {
            return;
        }
        let Payload::Dsr(dsr) = &packet.payload else {
            return;
        };
        self.check_passive_ack(packet, dsr);
        self.process_options(ctx, packet, dsr);
    }

    fn send(&mut self, ctx: &mut NodeContext<'_, DsrTimer>, packet: IpPacket) {
        if packet.protocol == protocol::DSR {
            // Forwarding was already done while peeking
            return;
        }

        let dst = packet.dst;
        if let Some(route) = self.cache.shortest(&dst).map(<[NetAddress]>::to_vec) {
            self.send_with_route(ctx, packet, &route);
            return;
        }

        let key = self.send_buffer.insert(packet);
        ctx.schedule(self.config.send_buffer_timeout, DsrTimer::BufferExpiry { key });
        self.active_requests.insert(dst);
        self.discover_route(ctx, dst);
    }

    fn receive(
        &mut self,
        ctx: &mut NodeContext<'_, DsrTimer>,
        packet: &IpPacket,
        _last_hop: MacAddress,
        _interface: InterfaceId,
    ) {
        let Payload::Dsr(dsr) = &packet.payload else {
            debug!("dsr at={} ignoring non-dsr payload", self.local);
            return;
        };
        if let Screened::Drop(_) = screen_unrecognized(dsr) {
            return;
        }
        // Arrived over a shortcut before traversing the rest of its route
        if let Some(sr) = dsr.source_route() {
            if sr.next_recipient(packet.dst) != Some(self.local) {
                return;
            }
        }

        let Some(content) = &dsr.content else {
            return;
        };
        info!("dsr data at={} from={} id={}", self.local, packet.src, packet.id);
        self.stats.data_received += 1;
        ctx.deliver(IpPacket {
            src: packet.src,
            dst: packet.dst,
            protocol: dsr.next_header,
            priority: packet.priority,
            ttl: packet.ttl,
            id: packet.id,
            frag_offset: packet.frag_offset,
            payload: (**content).clone(),
            source_route: None,
        });
    }

    fn timeout(&mut self, ctx: &mut NodeContext<'_, DsrTimer>, timer: DsrTimer) {
        match timer {
            DsrTimer::RequestRetry { target, attempt } => self.request_retry(ctx, target, attempt),
            DsrTimer::PassiveAck { packet, attempt } => {
                self.transmit_with_passive_ack(ctx, packet, attempt, Duration::ZERO)
            }
            DsrTimer::NetworkAck {
                packet,
                ack_id,
                timeout,
                attempt,
            } => self.transmit_with_network_ack(ctx, packet, ack_id, timeout, attempt, Duration::ZERO),
            DsrTimer::BufferExpiry { key } => {
                if let Some(packet) = self.send_buffer.expire(key) {
                    debug!("dsr buffer timeout at={} dst={}", self.local, packet.dst);
                    ctx.drop_packet(packet, DropReason::BufferTimeout);
                }
            }
            DsrTimer::HoldoffExpiry {
                originator,
                last_hop,
            } => self.holdoff.remove(originator, last_hop),
        }
    }
}
