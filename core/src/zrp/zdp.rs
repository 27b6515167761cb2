//! ZDP: incremental link-state zone routing
//!
//! Instead of whole neighbour lists, ZDP ships individual directed links
//! with a per-link id. Changes are batched behind a short delay and sent
//! only while the link's far end is still in the sender's zone. Links whose
//! source is too far away to matter are pruned on receipt.

use super::{
    Compression, ZdpLink, ZdpMessage, ZoneRouting, ZoneTable, ZoneTimer, ZoneUpdate, ZrpAction,
    ZrpMessage, ZrpTimer,
};
use crate::net::{Link, NetAddress};
use crate::route::{next_seq, seq_after};
use crate::sim::NodeContext;
use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;
use tracing::debug;

/// Batching delay before a link-state send
pub const SEND_DELAY: Duration = Duration::from_secs(7);
pub const JITTER: Duration = Duration::from_secs(2);
/// Period of the two-phase flush sweep
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LinkEntry {
    id: i16,
    drop: bool,
    /// Not yet passed on
    fresh: bool,
    /// Survived one flush sweep without an update
    flush: bool,
}

impl LinkEntry {
    fn new(id: i16, drop: bool) -> Self {
        Self {
            id,
            drop,
            fresh: true,
            flush: false,
        }
    }

    fn set(&mut self, id: i16, drop: bool) {
        *self = Self::new(id, drop);
    }

    fn is_up(&self) -> bool {
        !self.drop
    }
}

#[derive(Debug)]
pub struct Zdp {
    local: NetAddress,
    radius: u8,
    compression: Compression,
    seq: i16,
    links: BTreeMap<Link, LinkEntry>,
    routes: OnceCell<ZoneTable>,
    send_scheduled: bool,
    adjacency_changed: bool,
}

impl Zdp {
    pub fn new(local: NetAddress, radius: u8, compression: Compression) -> Self {
        Self {
            local,
            radius,
            compression,
            seq: 0,
            links: BTreeMap::new(),
            routes: OnceCell::new(),
            send_scheduled: false,
            adjacency_changed: false,
        }
    }

    pub fn is_link_up(&self, link: &Link) -> bool {
        self.links.get(link).is_some_and(LinkEntry::is_up)
    }

    fn touch(&mut self) {
        self.routes.take();
        self.adjacency_changed = true;
    }

    /// Apply a link record; true if it was newer than what is held
    fn update_link(&mut self, link: Link, id: i16, drop: bool) -> bool {
        match self.links.get_mut(&link) {
            None => {
                self.links.insert(link, LinkEntry::new(id, drop));
                if !drop {
                    self.touch();
                }
                true
            }
            Some(entry) if seq_after(id, entry.id) => {
                let was_up = entry.is_up();
                entry.set(id, drop);
                if was_up == drop {
                    self.touch();
                }
                true
            }
            Some(_) => false,
        }
    }

    /// Local links are authoritative and always replace what is held
    fn set_local_link(&mut self, link: Link, id: i16, drop: bool) {
        let was_up = self.is_link_up(&link);
        self.links
            .entry(link)
            .and_modify(|e| e.set(id, drop))
            .or_insert_with(|| LinkEntry::new(id, drop));
        if was_up == drop {
            self.touch();
        }
    }

    fn remove_link(&mut self, link: &Link) {
        if let Some(entry) = self.links.remove(link) {
            if entry.is_up() {
                self.touch();
            }
        }
    }

    fn schedule_send(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>) {
        if self.send_scheduled {
            return;
        }
        self.send_scheduled = true;
        let delay = SEND_DELAY + ctx.random_delay(JITTER);
        ctx.schedule(delay, ZrpTimer::Zone(ZoneTimer::Send));
    }

    fn assert_local(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>, link: Link, drop: bool) {
        self.seq = next_seq(self.seq);
        self.set_local_link(link, self.seq, drop);
        self.schedule_send(ctx);
    }

    fn take_changes(&mut self) -> Vec<ZrpAction> {
        if std::mem::take(&mut self.adjacency_changed) {
            vec![ZrpAction::ZoneChanged]
        } else {
            Vec::new()
        }
    }

    /// Hop count from every node that can reach the local node over live links
    fn distances_to_local(&self) -> HashMap<NetAddress, u8> {
        let mut incoming: HashMap<NetAddress, Vec<NetAddress>> = HashMap::new();
        for (link, _) in self.links.iter().filter(|(_, e)| e.is_up()) {
            incoming.entry(link.dst).or_default().push(link.src);
        }

        let mut dist = HashMap::from([(self.local, 0u8)]);
        let mut horizon = VecDeque::from([self.local]);
        while let Some(node) = horizon.pop_front() {
            let d = dist[&node].saturating_add(1);
            for src in incoming.get(&node).into_iter().flatten() {
                if !dist.contains_key(src) {
                    dist.insert(*src, d);
                    horizon.push_back(*src);
                }
            }
        }
        dist
    }

    fn send(&mut self) -> Vec<ZrpAction> {
        self.send_scheduled = false;
        let batch: Vec<ZdpLink> = self
            .links
            .iter()
            .filter(|(link, e)| e.fresh && self.has_route(&link.dst))
            .map(|(link, e)| ZdpLink {
                link: *link,
                id: e.id,
                drop: e.drop,
            })
            .collect();
        if batch.is_empty() {
            return Vec::new();
        }

        for l in &batch {
            if l.drop {
                self.links.remove(&l.link);
            } else if let Some(entry) = self.links.get_mut(&l.link) {
                entry.fresh = false;
            }
        }
        debug!("zdp send at={} links={}", self.local, batch.len());
        vec![ZrpAction::Broadcast {
            msg: ZrpMessage::Zone(ZoneUpdate::Zdp(ZdpMessage {
                links: batch,
                compression: self.compression,
            })),
            delay: Duration::ZERO,
        }]
    }

    fn refresh(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>) {
        let stale: Vec<Link> = self
            .links
            .iter()
            .filter(|(_, e)| e.flush)
            .map(|(link, _)| *link)
            .collect();
        for link in &stale {
            self.remove_link(link);
        }
        for entry in self.links.values_mut() {
            entry.flush = true;
        }

        self.seq = next_seq(self.seq);
        let own: Vec<(Link, bool)> = self
            .links
            .iter()
            .filter(|(link, _)| link.dst == self.local)
            .map(|(link, e)| (*link, e.drop))
            .collect();
        for (link, drop) in own {
            self.set_local_link(link, self.seq, drop);
            self.schedule_send(ctx);
        }

        let delay = FLUSH_INTERVAL + ctx.random_delay(JITTER);
        ctx.schedule(delay, ZrpTimer::Zone(ZoneTimer::Refresh));
    }
}

impl ZoneRouting for Zdp {
    fn start(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>) {
        ctx.schedule(Duration::ZERO, ZrpTimer::Zone(ZoneTimer::Refresh));
    }

    fn receive(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        update: &ZoneUpdate,
        from: NetAddress,
    ) -> Vec<ZrpAction> {
        let ZoneUpdate::Zdp(msg) = update else {
            debug!("zdp at={} ignoring iarp update from {}", self.local, from);
            return Vec::new();
        };
        debug!("zdp receive at={} from={} links={}", self.local, from, msg.links.len());

        for l in &msg.links {
            if self.update_link(l.link, l.id, l.drop) {
                self.schedule_send(ctx);
            }
        }
        let heard = Link::new(from, self.local);
        if !self.is_link_up(&heard) {
            self.assert_local(ctx, heard, false);
        }

        let dist = self.distances_to_local();
        let far: Vec<Link> = self
            .links
            .iter()
            .filter(|(_, e)| e.fresh)
            .filter(|(link, _)| dist.get(&link.src).map_or(true, |&d| d >= self.radius))
            .map(|(link, _)| *link)
            .collect();
        for link in &far {
            self.remove_link(link);
        }
        self.take_changes()
    }

    fn link_info(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        link: Link,
        drop: bool,
        _neighbours: &[NetAddress],
    ) -> Vec<ZrpAction> {
        self.assert_local(ctx, link, drop);
        self.take_changes()
    }

    fn timeout(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        timer: ZoneTimer,
        _neighbours: &[NetAddress],
    ) -> Vec<ZrpAction> {
        let mut actions = match timer {
            ZoneTimer::Send => self.send(),
            ZoneTimer::Refresh => {
                self.refresh(ctx);
                Vec::new()
            }
        };
        actions.extend(self.take_changes());
        actions
    }

    fn link_count(&self) -> usize {
        self.links.values().filter(|e| e.is_up()).count()
    }

    fn links_from(&self, src: &NetAddress) -> Vec<NetAddress> {
        self.links
            .iter()
            .filter(|(link, e)| link.src == *src && e.is_up())
            .map(|(link, _)| link.dst)
            .collect()
    }

    fn zone(&self) -> &ZoneTable {
        self.routes
            .get_or_init(|| ZoneTable::compute(self.local, self.radius, |n| self.links_from(n)))
    }
}
