//! Neighbour discovery by periodic heartbeat
//!
//! Every node broadcasts an empty beacon roughly every ten seconds. A
//! neighbour that misses more than three consecutive periods is evicted.

use super::{NeighborDiscovery, ZrpAction, ZrpMessage, ZrpTimer};
use crate::net::{Link, MacAddress, NetAddress};
use crate::sim::NodeContext;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Beacon period before jitter
pub const BEAT_INTERVAL: Duration = Duration::from_secs(10);
/// Beacons start `BEAT_JITTER / 2` early plus up to `BEAT_JITTER`
pub const BEAT_JITTER: Duration = Duration::from_secs(4);
/// Periods a neighbour may stay silent
pub const BEATS_ALLOWED: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Neighbour {
    mac: MacAddress,
    beats: i32,
}

#[derive(Debug, Clone)]
pub struct Ndp {
    local: NetAddress,
    neighbours: BTreeMap<NetAddress, Neighbour>,
}

impl Ndp {
    pub fn new(local: NetAddress) -> Self {
        Self {
            local,
            neighbours: BTreeMap::new(),
        }
    }

    fn next_beat(ctx: &mut NodeContext<'_, ZrpTimer>) -> Duration {
        BEAT_INTERVAL - BEAT_JITTER / 2 + ctx.random_delay(BEAT_JITTER)
    }
}

impl NeighborDiscovery for Ndp {
    fn start(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>) {
        ctx.schedule(Duration::ZERO, ZrpTimer::NdpBeat);
    }

    fn receive(&mut self, src: NetAddress, mac: MacAddress) -> Vec<ZrpAction> {
        let fresh = Neighbour {
            mac,
            beats: BEATS_ALLOWED,
        };
        match self.neighbours.insert(src, fresh) {
            Some(_) => Vec::new(),
            None => {
                debug!("ndp at={} new neighbour {}", self.local, src);
                vec![ZrpAction::LinkInfo {
                    link: Link::new(src, self.local),
                    drop: false,
                }]
            }
        }
    }

    fn timeout(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>) -> Vec<ZrpAction> {
        let mut actions = vec![ZrpAction::Broadcast {
            msg: ZrpMessage::Ndp,
            delay: Duration::ZERO,
        }];

        for n in self.neighbours.values_mut() {
            n.beats -= 1;
        }
        let lost: Vec<NetAddress> = self
            .neighbours
            .iter()
            .filter(|(_, n)| n.beats < 0)
            .map(|(addr, _)| *addr)
            .collect();
        for addr in lost {
            self.neighbours.remove(&addr);
            debug!("ndp at={} lost neighbour {}", self.local, addr);
            actions.push(ZrpAction::LinkInfo {
                link: Link::new(addr, self.local),
                drop: true,
            });
        }

        let delay = Self::next_beat(ctx);
        ctx.schedule(delay, ZrpTimer::NdpBeat);
        actions
    }

    fn mac_address(&self, addr: &NetAddress) -> Option<MacAddress> {
        self.neighbours.get(addr).map(|n| n.mac)
    }

    fn neighbours(&self) -> Vec<NetAddress> {
        self.neighbours.keys().copied().collect()
    }

    fn neighbour_count(&self) -> usize {
        self.neighbours.len()
    }
}
