//! Bordercast by plain flooding: every node relays each query once.
//! Useful as a baseline against directed bordercast.

use super::brp::{CoverageTable, QueryKey};
use super::{
    BordercastMessage, BordercastResolver, IerpMessage, ZoneRouting, ZrpAction, ZrpMessage,
    ZrpTimer,
};
use crate::net::NetAddress;
use crate::sim::NodeContext;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default)]
pub struct BrpFlood {
    coverage: CoverageTable,
}

impl BrpFlood {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BordercastResolver for BrpFlood {
    fn start(&mut self, ctx: &mut NodeContext<'_, ZrpTimer>) {
        ctx.schedule(Duration::ZERO, ZrpTimer::BordercastRefresh);
    }

    fn receive(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        msg: &BordercastMessage,
        from: NetAddress,
    ) {
        let query = msg.query();
        let Some(key) = QueryKey::of(query) else {
            return;
        };
        self.coverage.deliver_once(ctx, key, query, from);
    }

    fn send(
        &mut self,
        ctx: &mut NodeContext<'_, ZrpTimer>,
        query: IerpMessage,
        _zone: &dyn ZoneRouting,
    ) -> Vec<ZrpAction> {
        let Some(key) = QueryKey::of(&query) else {
            return Vec::new();
        };
        let entry = self.coverage.entry(key, ctx.now(), false);
        if entry.is_forwarded() {
            return Vec::new();
        }
        entry.forwarded();
        debug!("flood send src={} id={}", key.src, key.id);
        vec![ZrpAction::Broadcast {
            msg: ZrpMessage::Bordercast(BordercastMessage::Flood { query }),
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
