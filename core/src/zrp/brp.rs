//! BRP: directed bordercast
//!
//! A query is relayed only by the neighbours a sender names as targets.
//! Each relay picks the fewest neighbours that reach the part of its zone
//! periphery not already covered by the zones of the nodes it heard the
//! query from.

use super::{
    zone, BordercastMessage, BordercastResolver, IerpMessage, ZoneRouting, ZrpAction, ZrpMessage,
    ZrpTimer,
};
use crate::net::NetAddress;
use crate::sim::NodeContext;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, info};

/// How long query coverage is remembered
pub const COVERAGE_LIFETIME: Duration = Duration::from_secs(90);
/// Coverage sweeps run up to twice this apart
pub const COVERAGE_REFRESH: Duration = Duration::from_secs(10);
/// Queries go up to IERP after up to twice this
pub const JITTER: Duration = Duration::from_secs(2);

/// Identity of a query: originator and query id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct QueryKey {
    pub src: NetAddress,
    pub id: i16,
}

impl QueryKey {
    pub fn of(query: &IerpMessage) -> Option<Self> {
        Some(Self {
            src: query.src()?,
            id: query.id,
        })
    }
}

/// What this node knows about one query
#[derive(Debug, Clone)]
pub(crate) struct CoverageEntry {
    /// Nodes the query was heard from; `None` once relayed
    from: Option<Vec<NetAddress>>,
    pub time: Duration,
    pub target: bool,
    pub processed: bool,
}

impl CoverageEntry {
    fn new(now: Duration, target: bool) -> Self {
        Self {
            from: Some(Vec::new()),
            time: now,
            target,
            processed: false,
        }
    }

    pub fn add_from(&mut self, node: NetAddress) {
        if let Some(from) = self.from.as_mut() {
            from.push(node);
        }
    }

    pub fn from(&self) -> &[NetAddress] {
        self.from.as_deref().unwrap_or_default()
    }

    pub fn is_forwarded(&self) -> bool {
        self.from.is_none()
    }

    pub fn forwarded(&mut self) {
        self.from = None;
    }
}

/// Query coverage keyed by [`QueryKey`], aged out by a periodic sweep
#[derive(Debug, Clone, Default)]
pub(crate) struct CoverageTable {
    entries: HashMap<QueryKey, CoverageEntry>,
}

impl CoverageTable {
    pub fn entry(&mut self, key: QueryKey, now: Duration, target: bool) -> &mut CoverageEntry {
        self.entries
            .entry(key)
            .or_insert_with(|| CoverageEntry::new(now, target))
    }

    pub fn expire(&mut self, now: Duration) {
        self.entries
            .retain(|_, e| e.time + COVERAGE_LIFETIME >= now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Mark the query processed and schedule its hand-off to IERP, once
    pub fn deliver_once(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        key: QueryKey,
        query: &IerpMessage,
        from: NetAddress,
    ) {
        let entry = self.entry(key, ctx.now(), false);
        if entry.processed {
            return;
        }
        entry.processed = true;
        let delay = ctx.random_delay(2 * JITTER);
        ctx.schedule(
            delay,
            ZrpTimer::DeliverQuery {
                query: query.clone(),
                from,
            },
        );
    }

    pub fn sweep(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>) {
        self.expire(ctx.now());
        let delay = ctx.random_delay(2 * COVERAGE_REFRESH);
        ctx.schedule(delay, ZrpTimer::BordercastRefresh);
    }
}

#[derive(Debug)]
pub struct Brp {
    local: NetAddress,
    radius: u8,
    coverage: CoverageTable,
}

impl Brp {
    pub fn new(local: NetAddress, radius: u8) -> Self {
        Self {
            local,
            radius,
            coverage: CoverageTable::default(),
        }
    }

    /// Periphery nodes outside every `from` node's zone
    fn uncovered_periphery(&self, from: &[NetAddress], zone: &dyn ZoneRouting) -> BTreeSet<NetAddress> {
        let mut uncovered: BTreeSet<NetAddress> = zone.periphery().into_iter().collect();
        for f in from {
            if uncovered.is_empty() {
                break;
            }
            let covered = zone.coverage(*f, self.radius);
            uncovered.retain(|p| !covered.contains(p));
        }
        uncovered
    }

    /// Greedy set cover: repeatedly take the neighbour leading to the most
    /// uncovered periphery nodes, lowest address first on ties
    fn bordercast_neighbours(&self, from: &[NetAddress], zone: &dyn ZoneRouting) -> Vec<NetAddress> {
        let mut uncovered = self.uncovered_periphery(from, zone);
        if uncovered.is_empty() {
            return Vec::new();
        }
        let closest = zone::closest_neighbours(self.local, self.radius, |n| zone.links_from(n));

        let mut chosen = Vec::new();
        while !uncovered.is_empty() {
            let mut counts: BTreeMap<NetAddress, usize> = BTreeMap::new();
            for p in &uncovered {
                for n in closest.get(p).into_iter().flatten() {
                    *counts.entry(*n).or_default() += 1;
                }
            }
            let Some(max) = counts.values().copied().max() else {
                break;
            };
            let Some(best) = counts
                .iter()
                .find(|(_, c)| **c == max)
                .map(|(n, _)| *n)
            else {
                break;
            };
            chosen.push(best);
            uncovered.retain(|p| !closest.get(p).is_some_and(|via| via.contains(&best)));
        }
        chosen
    }
}

impl BordercastResolver for Brp {
    fn start(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>) {
        ctx.schedule(Duration::ZERO, ZrpTimer::BordercastRefresh);
    }

    fn receive(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        msg: &BordercastMessage,
        from: NetAddress,
    ) {
        let BordercastMessage::Brp { query, targets } = msg else {
            debug!("brp at={} ignoring flood from {}", self.local, from);
            return;
        };
        let Some(key) = QueryKey::of(query) else {
            return;
        };
        debug!(
            "brp receive at={} from={} src={} id={}",
            self.local, from, key.src, key.id
        );

        let entry = self.coverage.entry(key, ctx.now(), false);
        entry.add_from(from);
        if targets.contains(&self.local) {
            entry.target = true;
        } else {
            entry.forwarded();
        }
        self.coverage.deliver_once(ctx, key, query, from);
    }

    fn send(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        query: IerpMessage,
        zone: &dyn ZoneRouting,
    ) -> Vec<ZrpAction> {
        let Some(key) = QueryKey::of(&query) else {
            return Vec::new();
        };
        let entry = self.coverage.entry(key, ctx.now(), true);
        if entry.is_forwarded() || !entry.target {
            return Vec::new();
        }
        let from = entry.from().to_vec();
        entry.forwarded();

        let targets = self.bordercast_neighbours(&from, zone);
        if targets.is_empty() {
            debug!("brp at={} periphery already covered for {}:{}", self.local, key.src, key.id);
            return Vec::new();
        }
        info!(
            "brp send at={} src={} id={} targets={:?}",
            self.local, key.src, key.id, targets
        );
        vec![ZrpAction::Broadcast {
            msg: ZrpMessage::Bordercast(BordercastMessage::Brp { query, targets }),
            delay: Duration::ZERO,
        }]
    }

    fn timeout(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>) {
        self.coverage.sweep(ctx);
    }

    fn query_count(&self) -> usize {
        self.coverage.len()
    }
}
