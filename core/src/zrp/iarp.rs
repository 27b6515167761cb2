//! IARP: proactive link state limited to the zone
//!
//! Each node advertises its full neighbour list with a fresh sequence
//! number, flooded `radius` hops. Zone routes are a bounded BFS over the
//! newest advertisement heard from each source.

use super::{
    Compression, IarpMessage, ZoneRouting, ZoneTable, ZoneTimer, ZoneUpdate, ZrpAction,
    ZrpMessage, ZrpTimer,
};
use crate::net::{Link, NetAddress};
use crate::route::{next_seq, seq_after};
use crate::sim::NodeContext;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Advertisements older than this are forgotten
pub const LINK_LIFETIME: Duration = Duration::from_secs(10 * 60);
/// Re-flooding waits up to twice this
pub const JITTER: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
struct LinkStateEntry {
    seq: i16,
    time: Duration,
    dsts: Vec<NetAddress>,
}

#[derive(Debug)]
pub struct Iarp {
    local: NetAddress,
    radius: u8,
    compression: Compression,
    seq: i16,
    link_state: HashMap<NetAddress, LinkStateEntry>,
    routes: OnceCell<ZoneTable>,
}

impl Iarp {
    pub fn new(local: NetAddress, radius: u8, compression: Compression) -> Self {
        Self {
            local,
            radius,
            compression,
            seq: 0,
            link_state: HashMap::new(),
            routes: OnceCell::new(),
        }
    }

    /// Advertise the current neighbour list, processed locally first
    fn neighbours_changed(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        neighbours: &[NetAddress],
    ) -> Vec<ZrpAction> {
        self.seq = next_seq(self.seq);
        debug!("iarp at={} advertises {:?}", self.local, neighbours);
        let msg = IarpMessage {
            src: self.local,
            seq: self.seq,
            ttl: self.radius,
            dsts: neighbours.to_vec(),
            compression: self.compression,
        };
        self.apply(ctx, msg)
    }

    fn update_link_state(&mut self, now: Duration, msg: &IarpMessage) -> bool {
        let newer = match self.link_state.get(&msg.src) {
            Some(entry) => seq_after(msg.seq, entry.seq),
            None => true,
        };
        if newer {
            self.link_state.insert(
                msg.src,
                LinkStateEntry {
                    seq: msg.seq,
                    time: now,
                    dsts: msg.dsts.clone(),
                },
            );
        }
        newer
    }

    fn flush_link_state(&mut self, now: Duration) -> bool {
        let before = self.link_state.len();
        self.link_state
            .retain(|_, entry| entry.time + LINK_LIFETIME >= now);
        self.link_state.len() != before
    }

    fn apply(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>, msg: IarpMessage) -> Vec<ZrpAction> {
        if !self.update_link_state(ctx.now(), &msg) {
            return Vec::new();
        }
        self.routes.take();
        let mut actions = vec![ZrpAction::ZoneChanged];
        if let Some(fwd) = msg.decremented() {
            let delay = ctx.random_delay(2 * JITTER);
            info!("iarp send at={} src={} seq={} ttl={}", self.local, fwd.src, fwd.seq, fwd.ttl);
            actions.push(ZrpAction::Broadcast {
                msg: ZrpMessage::Zone(ZoneUpdate::Iarp(fwd)),
                delay,
            });
        }
        actions
    }
}

impl ZoneRouting for Iarp {
    fn start(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>) {
        ctx.schedule(Duration::ZERO, ZrpTimer::Zone(ZoneTimer::Refresh));
    }

    fn receive(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        update: &ZoneUpdate,
        from: NetAddress,
    ) -> Vec<ZrpAction> {
        let ZoneUpdate::Iarp(msg) = update else {
            debug!("iarp at={} ignoring zdp update from {}", self.local, from);
            return Vec::new();
        };
        debug!(
            "iarp receive at={} from={} src={} seq={}",
            self.local, from, msg.src, msg.seq
        );
        self.apply(ctx, msg.clone())
    }

    fn link_info(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        _link: Link,
        _drop: bool,
        neighbours: &[NetAddress],
    ) -> Vec<ZrpAction> {
        self.neighbours_changed(ctx, neighbours)
    }

    fn timeout(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        timer: ZoneTimer,
        neighbours: &[NetAddress],
    ) -> Vec<ZrpAction> {
        if timer != ZoneTimer::Refresh {
            return Vec::new();
        }
        if self.flush_link_state(ctx.now()) {
            self.routes.take();
        }
        let actions = self.neighbours_changed(ctx, neighbours);
        let delay = ctx.random_delay(2 * LINK_LIFETIME);
        ctx.schedule(delay, ZrpTimer::Zone(ZoneTimer::Refresh));
        actions
    }

    fn link_count(&self) -> usize {
        self.link_state.values().map(|e| e.dsts.len()).sum()
    }

    fn links_from(&self, src: &NetAddress) -> Vec<NetAddress> {
        self.link_state
            .get(src)
            .map(|e| e.dsts.clone())
            .unwrap_or_default()
    }

    fn zone(&self) -> &ZoneTable {
        self.routes
            .get_or_init(|| ZoneTable::compute(self.local, self.radius, |n| self.links_from(n)))
    }
}
