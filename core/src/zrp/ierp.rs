//! IERP: reactive route discovery beyond the zone
//!
//! Data for a destination outside the zone is queued while a request is
//! bordercast. Any node holding the destination in its zone answers with
//! the full route, which travels back hop by hop to the originator. The
//! originator then sends the queued data along it as an IP source route.

use super::{
    IerpKind, IerpMessage, InterzoneRouting, NeighborDiscovery, ZoneRouting, ZrpAction,
    ZrpMessage, ZrpTimer,
};
use crate::net::{priority, protocol, IpPacket, NetAddress, Payload, SourceRoute};
use crate::route::{next_seq, replace_dest};
use crate::sim::{DropReason, NodeContext};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Queued data older than this is dropped
pub const QUEUE_LIFETIME: Duration = Duration::from_secs(30);
/// Queue sweeps run up to twice this apart
pub const QUEUE_REFRESH: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct Queued {
    packet: IpPacket,
    since: Duration,
}

#[derive(Debug)]
pub struct Ierp {
    local: NetAddress,
    seq: i16,
    queue: Vec<Queued>,
}

impl Ierp {
    pub fn new(local: NetAddress) -> Self {
        Self {
            local,
            seq: 0,
            queue: Vec::new(),
        }
    }

    fn take_for(&mut self, dst: &NetAddress) -> Vec<IpPacket> {
        let (ready, kept): (Vec<_>, Vec<_>) =
            self.queue.drain(..).partition(|q| q.packet.dst == *dst);
        self.queue = kept;
        ready.into_iter().map(|q| q.packet).collect()
    }

    fn handle_request(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        query: &IerpMessage,
        zone: &dyn ZoneRouting,
        ndp: &dyn NeighborDiscovery,
    ) -> Vec<ZrpAction> {
        let (Some(src), Some(dst)) = (query.src(), query.dst()) else {
            return Vec::new();
        };

        let Some(zone_route) = zone.route(&dst) else {
            let onward = if query.route.contains(&self.local) {
                query.clone()
            } else {
                query.append_hop(self.local)
            };
            return vec![ZrpAction::Bordercast(onward)];
        };

        if src == self.local {
            // Destination came into the zone while the query was out
            return self.take_for(&dst).into_iter().map(ZrpAction::Forward).collect();
        }
        let reply = IerpMessage::reply(query.id, replace_dest(&query.route, self.local, zone_route));
        info!(
            "ierp reply at={} id={} route={:?}",
            self.local, reply.id, reply.route
        );
        self.handle_reply(ctx, reply, ndp)
    }

    fn handle_reply(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        reply: IerpMessage,
        ndp: &dyn NeighborDiscovery,
    ) -> Vec<ZrpAction> {
        let (Some(src), Some(dst)) = (reply.src(), reply.dst()) else {
            return Vec::new();
        };

        if src == self.local {
            let Some(&first) = reply.route.get(1) else {
                return Vec::new();
            };
            let hops = reply.route[1..].to_vec();
            let ready = self.take_for(&dst);
            info!(
                "ierp route found at={} dst={} hops={} releasing={}",
                self.local,
                dst,
                hops.len(),
                ready.len()
            );
            return ready
                .into_iter()
                .map(|packet| ZrpAction::Unicast {
                    packet: packet.with_source_route(SourceRoute::new(hops.clone())),
                    next_hop: first,
                })
                .collect();
        }

        let back = reply
            .route
            .iter()
            .position(|&hop| hop == self.local)
            .and_then(|pos| pos.checked_sub(1))
            .map(|prev| reply.route[prev]);
        let Some(next) = back else {
            warn!("ierp at={} not on reply route {:?}", self.local, reply.route);
            return Vec::new();
        };
        if !ndp.is_neighbour(&next) {
            debug!("ierp at={} reply hop {} no longer a neighbour", self.local, next);
            return Vec::new();
        }
        let packet = IpPacket::new(
            Payload::Zrp(ZrpMessage::Ierp(reply)),
            self.local,
            next,
            protocol::ZRP,
            priority::NORMAL,
            1,
        )
        .with_id(ctx.next_packet_id());
        vec![ZrpAction::Unicast {
            packet,
            next_hop: next,
        }]
    }
}

impl InterzoneRouting for Ierp {
    fn start(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>) {
        ctx.schedule(Duration::ZERO, ZrpTimer::IerpFlush);
    }

    fn send(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        packet: IpPacket,
        zone: &dyn ZoneRouting,
        ndp: &dyn NeighborDiscovery,
    ) -> Vec<ZrpAction> {
        let dst = packet.dst;
        self.queue.push(Queued {
            packet,
            since: ctx.now(),
        });
        self.seq = next_seq(self.seq);
        debug!("ierp request at={} dst={} id={}", self.local, dst, self.seq);
        let query = IerpMessage::request(self.seq, self.local, dst);
        self.handle_request(ctx, &query, zone, ndp)
    }

    fn receive(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        msg: &IerpMessage,
        zone: &dyn ZoneRouting,
        ndp: &dyn NeighborDiscovery,
    ) -> Vec<ZrpAction> {
        match msg.kind {
            IerpKind::Request => self.handle_request(ctx, msg, zone, ndp),
            IerpKind::Reply => self.handle_reply(ctx, msg.clone(), ndp),
        }
    }

    fn zone_changed(&mut self, zone: &dyn ZoneRouting) -> Vec<ZrpAction> {
        let (ready, kept): (Vec<_>, Vec<_>) = self
            .queue
            .drain(..)
            .partition(|q| zone.route(&q.packet.dst).is_some_and(|r| !r.is_empty()));
        self.queue = kept;
        ready
            .into_iter()
            .map(|q| ZrpAction::Forward(q.packet))
            .collect()
    }

    fn timeout(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>) {
        let now = ctx.now();
        let (expired, kept): (Vec<_>, Vec<_>) = self
            .queue
            .drain(..)
            .partition(|q| q.since + QUEUE_LIFETIME < now);
        self.queue = kept;
        for q in expired {
            debug!("ierp at={} queue timeout dst={}", self.local, q.packet.dst);
            ctx.drop_packet(q.packet, DropReason::BufferTimeout);
        }
        let delay = ctx.random_delay(2 * QUEUE_REFRESH);
        ctx.schedule(delay, ZrpTimer::IerpFlush);
    }

    fn queued(&self) -> usize {
        self.queue.len()
    }
}
