//! Discrete-event harness driving routing engines over a link set
//!
//! Nodes share nothing but frames: an engine's transmissions are turned
//! into future `Frame` events at every neighbour that hears them. Events
//! fire in virtual-time order, ties in submission order.

use super::context::{DropReason, Effect, NodeContext};
use super::SimConfig;
use crate::net::{
    priority, protocol, IpPacket, MacAddress, NetAddress, Payload, INTERFACE_DEFAULT,
    INTERFACE_LOOPBACK, TTL_DEFAULT,
};
use crate::route::RouteInterface;
use crate::ManetError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, trace};

enum Event<T> {
    Start,
    Timer(T),
    Frame {
        packet: IpPacket,
        last_hop: MacAddress,
        overheard: bool,
    },
}

struct Scheduled<T> {
    at: Duration,
    seq: u64,
    node: usize,
    event: Event<T>,
}

impl<T> PartialEq for Scheduled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<T> Eq for Scheduled<T> {}

impl<T> PartialOrd for Scheduled<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Scheduled<T> {
    // Reversed: BinaryHeap is a max-heap, we want the earliest event first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// One simulated node and what was observed at it
pub struct SimNode<R> {
    pub addr: NetAddress,
    pub mac: MacAddress,
    pub engine: R,
    rng: StdRng,
    next_packet_id: u16,
    /// Application packets handed up at this node
    pub delivered: Vec<IpPacket>,
    /// Packets abandoned at this node
    pub drops: Vec<(IpPacket, DropReason)>,
    /// Every packet this node put on the air
    pub sent: Vec<IpPacket>,
    /// Every frame addressed to this node (broadcast or unicast)
    pub received: Vec<IpPacket>,
}

/// Event-driven network of nodes all running engine `R`
pub struct Simulation<R: RouteInterface> {
    config: SimConfig,
    now: Duration,
    seq: u64,
    nodes: Vec<SimNode<R>>,
    index: HashMap<NetAddress, usize>,
    links: HashSet<(usize, usize)>,
    queue: BinaryHeap<Scheduled<R::Timer>>,
}

impl<R: RouteInterface> Simulation<R> {
    /// Create `size` unconnected nodes. Node `i` gets address and MAC `i + 1`.
    pub fn new<F>(size: usize, config: SimConfig, mut factory: F) -> Self
    where
        F: FnMut(NetAddress) -> R,
    {
        let mut nodes = Vec::with_capacity(size);
        let mut index = HashMap::new();
        for i in 0..size {
            let addr = NetAddress::from_index(i as u32 + 1);
            index.insert(addr, i);
            nodes.push(SimNode {
                addr,
                mac: MacAddress::new(i as u32 + 1),
                engine: factory(addr),
                rng: StdRng::seed_from_u64(config.seed.wrapping_add(i as u64)),
                next_packet_id: 0,
                delivered: Vec::new(),
                drops: Vec::new(),
                sent: Vec::new(),
                received: Vec::new(),
            });
        }

        Self {
            config,
            now: Duration::ZERO,
            seq: 0,
            nodes,
            index,
            links: HashSet::new(),
            queue: BinaryHeap::new(),
        }
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn address(&self, node: usize) -> NetAddress {
        self.nodes[node].addr
    }

    pub fn index_of(&self, addr: NetAddress) -> Option<usize> {
        self.index.get(&addr).copied()
    }

    pub fn node(&self, node: usize) -> &SimNode<R> {
        &self.nodes[node]
    }

    pub fn engine(&self, node: usize) -> &R {
        &self.nodes[node].engine
    }

    pub fn engine_mut(&mut self, node: usize) -> &mut R {
        &mut self.nodes[node].engine
    }

    /// Bring up the bidirectional link `a <-> b`
    pub fn link_up(&mut self, a: usize, b: usize) {
        if a != b {
            self.links.insert((a.min(b), a.max(b)));
        }
    }

    /// Tear down the bidirectional link `a <-> b`
    pub fn link_down(&mut self, a: usize, b: usize) {
        self.links.remove(&(a.min(b), a.max(b)));
    }

    pub fn is_linked(&self, a: usize, b: usize) -> bool {
        self.links.contains(&(a.min(b), a.max(b)))
    }

    /// Link consecutive nodes: 0-1, 1-2, ...
    pub fn connect_chain(&mut self) {
        for i in 1..self.nodes.len() {
            self.link_up(i - 1, i);
        }
    }

    pub fn neighbours(&self, node: usize) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .links
            .iter()
            .filter_map(|&(a, b)| {
                if a == node {
                    Some(b)
                } else if b == node {
                    Some(a)
                } else {
                    None
                }
            })
            .collect();
        out.sort_unstable();
        out
    }

    /// Start every engine at the current time
    pub fn start(&mut self) {
        for node in 0..self.nodes.len() {
            self.push(self.now, node, Event::Start);
        }
    }

    /// Originate application data at `from` addressed to `dst`
    pub fn send_data(
        &mut self,
        from: usize,
        dst: NetAddress,
        data: Vec<u8>,
    ) -> Result<(), ManetError> {
        if from >= self.nodes.len() {
            return Err(ManetError::UnknownNodeIndex(from));
        }
        let node = &mut self.nodes[from];
        let id = node.next_packet_id;
        node.next_packet_id = id.wrapping_add(1);
        let packet = IpPacket::new(
            Payload::Data(data),
            node.addr,
            dst,
            protocol::UDP,
            priority::NORMAL,
            TTL_DEFAULT,
        )
        .with_id(id);
        debug!("originate at={} dst={} id={}", node.addr, dst, id);
        self.send_ip(from, packet);
        Ok(())
    }

    /// Process the next pending event; false once the queue is empty
    pub fn step(&mut self) -> bool {
        let Some(next) = self.queue.pop() else {
            return false;
        };
        self.now = next.at;
        self.process(next.node, next.event);
        true
    }

    /// Process every event due at or before `until`, then advance the clock
    pub fn run_until(&mut self, until: Duration) {
        while self.queue.peek().is_some_and(|e| e.at <= until) {
            self.step();
        }
        if until > self.now {
            self.now = until;
        }
    }

    pub fn run_for(&mut self, duration: Duration) {
        self.run_until(self.now + duration);
    }

    fn push(&mut self, at: Duration, node: usize, event: Event<R::Timer>) {
        let seq = self.seq;
        self.seq += 1;
        self.queue.push(Scheduled {
            at,
            seq,
            node,
            event,
        });
    }

    fn process(&mut self, node: usize, event: Event<R::Timer>) {
        match event {
            Event::Start => self.dispatch(node, |engine, ctx| engine.start(ctx)),
            Event::Timer(timer) => self.dispatch(node, |engine, ctx| engine.timeout(ctx, timer)),
            Event::Frame {
                packet,
                last_hop,
                overheard,
            } => self.receive_frame(node, packet, last_hop, overheard),
        }
    }

    fn dispatch<F>(&mut self, node: usize, f: F)
    where
        F: FnOnce(&mut R, &mut NodeContext<'_, R::Timer>),
    {
        let now = self.now;
        let effects = {
            let n = &mut self.nodes[node];
            let mut ctx = NodeContext::new(n.addr, now, &mut n.rng, &mut n.next_packet_id);
            f(&mut n.engine, &mut ctx);
            ctx.into_effects()
        };
        for effect in effects {
            self.apply(node, effect);
        }
    }

    fn apply(&mut self, node: usize, effect: Effect<R::Timer>) {
        match effect {
            Effect::Transmit {
                packet,
                next_hop,
                delay,
            } => self.transmit(node, packet, next_hop, delay),
            Effect::Deliver { packet } => self.deliver_local(node, packet),
            Effect::Schedule { delay, timer } => {
                self.push(self.now + delay, node, Event::Timer(timer))
            }
            Effect::Drop { packet, reason } => {
                debug!(
                    "drop at={} src={} dst={} reason={:?}",
                    self.nodes[node].addr, packet.src, packet.dst, reason
                );
                self.nodes[node].drops.push((packet, reason));
            }
        }
    }

    fn transmit(&mut self, node: usize, packet: IpPacket, next_hop: MacAddress, delay: Duration) {
        let from = self.nodes[node].mac;
        trace!("transmit at={} to={} size={}", self.nodes[node].addr, next_hop, packet.size());
        self.nodes[node].sent.push(packet.clone());
        let at = self.now + delay + self.config.propagation_delay;

        if next_hop == MacAddress::LOOP {
            self.push(
                at,
                node,
                Event::Frame {
                    packet,
                    last_hop: from,
                    overheard: false,
                },
            );
            return;
        }

        for neighbour in self.neighbours(node) {
            let addressed = next_hop == MacAddress::ANY || self.nodes[neighbour].mac == next_hop;
            if addressed || self.config.promiscuous {
                self.push(
                    at,
                    neighbour,
                    Event::Frame {
                        packet: packet.clone(),
                        last_hop: from,
                        overheard: !addressed,
                    },
                );
            }
        }
    }

    fn receive_frame(&mut self, node: usize, packet: IpPacket, last_hop: MacAddress, overheard: bool) {
        self.dispatch(node, |engine, ctx| engine.peek(ctx, &packet, last_hop));
        if overheard {
            return;
        }
        self.nodes[node].received.push(packet.clone());

        let local = self.nodes[node].addr;
        if packet.is_for(local) {
            if packet.protocol == R::PROTOCOL {
                self.dispatch(node, |engine, ctx| {
                    engine.receive(ctx, &packet, last_hop, INTERFACE_DEFAULT)
                });
            } else {
                self.deliver_local(node, packet);
            }
        } else if packet.ttl > 0 {
            self.send_ip(node, packet.decremented());
        } else {
            self.apply(
                node,
                Effect::Drop {
                    packet,
                    reason: DropReason::TtlExpired,
                },
            );
        }
    }

    fn send_ip(&mut self, node: usize, packet: IpPacket) {
        let local = self.nodes[node].addr;
        if packet.dst == NetAddress::ANY {
            self.transmit(node, packet, MacAddress::ANY, Duration::ZERO);
        } else if packet.dst == NetAddress::LOCAL || packet.dst == local {
            if packet.protocol == R::PROTOCOL {
                self.dispatch(node, |engine, ctx| {
                    engine.receive(ctx, &packet, MacAddress::LOOP, INTERFACE_LOOPBACK)
                });
            } else {
                self.deliver_local(node, packet);
            }
        } else {
            self.dispatch(node, |engine, ctx| engine.send(ctx, packet));
        }
    }

    fn deliver_local(&mut self, node: usize, packet: IpPacket) {
        debug!(
            "deliver at={} src={} id={}",
            self.nodes[node].addr, packet.src, packet.id
        );
        self.nodes[node].delivered.push(packet);
    }
}
