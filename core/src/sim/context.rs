//! Per-invocation simulation context handed to routing engines
//!
//! Engines never touch a global clock or RNG. Every callback receives a
//! [`NodeContext`] carrying the current virtual time, the node's RNG and an
//! outbox of [`Effect`]s that the host applies once the callback returns.

use crate::net::{IpPacket, MacAddress, NetAddress};
use rand::rngs::StdRng;
use rand::Rng;
use std::time::Duration;

/// Why a packet was given up on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Route discovery finished without a usable route
    NoRoute,
    /// Waited in a send buffer or queue longer than allowed
    BufferTimeout,
    /// Forwarding ran out of ttl
    TtlExpired,
    /// Next hop stopped acknowledging
    LinkBroken,
    /// Unrecognized header option demanded the packet be dropped
    UnsupportedOption,
    /// Packet could not be forwarded along its source route
    BadSourceRoute,
}

/// Side effect requested by an engine callback
#[derive(Debug, Clone, PartialEq)]
pub enum Effect<T> {
    /// Hand a packet to the link layer after `delay`
    Transmit {
        packet: IpPacket,
        next_hop: MacAddress,
        delay: Duration,
    },
    /// Deliver a packet to the local transport/application layer
    Deliver { packet: IpPacket },
    /// Invoke the engine's timeout callback after `delay`
    Schedule { delay: Duration, timer: T },
    /// Packet abandoned
    Drop { packet: IpPacket, reason: DropReason },
}

/// Clock, randomness and outbox for one engine callback
pub struct NodeContext<'a, T> {
    local: NetAddress,
    now: Duration,
    rng: &'a mut StdRng,
    next_packet_id: &'a mut u16,
    effects: Vec<Effect<T>>,
}

impl<'a, T> NodeContext<'a, T> {
    pub fn new(
        local: NetAddress,
        now: Duration,
        rng: &'a mut StdRng,
        next_packet_id: &'a mut u16,
    ) -> Self {
        Self {
            local,
            now,
            rng,
            next_packet_id,
            effects: Vec::new(),
        }
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn local_addr(&self) -> NetAddress {
        self.local
    }

    pub fn rng(&mut self) -> &mut StdRng {
        self.rng
    }

    /// Uniformly distributed delay in `[0, max)`
    pub fn random_delay(&mut self, max: Duration) -> Duration {
        let nanos = max.as_nanos() as u64;
        if nanos == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.rng.gen_range(0..nanos))
    }

    /// Fresh IP identification value for packets originated here
    pub fn next_packet_id(&mut self) -> u16 {
        let id = *self.next_packet_id;
        *self.next_packet_id = id.wrapping_add(1);
        id
    }

    pub fn transmit(&mut self, packet: IpPacket, next_hop: MacAddress, delay: Duration) {
        self.effects.push(Effect::Transmit {
            packet,
            next_hop,
            delay,
        });
    }

    pub fn deliver(&mut self, packet: IpPacket) {
        self.effects.push(Effect::Deliver { packet });
    }

    pub fn schedule(&mut self, delay: Duration, timer: T) {
        self.effects.push(Effect::Schedule { delay, timer });
    }

    pub fn drop_packet(&mut self, packet: IpPacket, reason: DropReason) {
        self.effects.push(Effect::Drop { packet, reason });
    }

    /// Effects recorded so far
    pub fn effects(&self) -> &[Effect<T>] {
        &self.effects
    }

    /// Drain recorded effects, leaving the outbox empty
    pub fn take_effects(&mut self) -> Vec<Effect<T>> {
        std::mem::take(&mut self.effects)
    }

    pub fn into_effects(self) -> Vec<Effect<T>> {
        self.effects
    }
}
