//! AODV tables: routes, request dedupe buffer, precursor and outgoing sets
//!
//! Ordered maps keep iteration deterministic, so a seeded run always draws
//! jitter in the same order.

use crate::net::{MacAddress, NetAddress};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

/// Best known next hop toward a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    /// `MacAddress::NULL` for the self entry
    pub next_hop: MacAddress,
    pub dest_seq: u32,
    pub hop_count: u32,
}

impl RouteEntry {
    pub fn new(next_hop: MacAddress, dest_seq: u32, hop_count: u32) -> Self {
        Self {
            next_hop,
            dest_seq,
            hop_count,
        }
    }

    /// True if packets can be forwarded along this entry
    pub fn is_usable(&self) -> bool {
        self.next_hop != MacAddress::NULL
    }
}

/// Destination → next hop table
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: BTreeMap<NetAddress, RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `dest`
    pub fn add(&mut self, dest: NetAddress, entry: RouteEntry) {
        self.routes.insert(dest, entry);
    }

    pub fn lookup(&self, dest: &NetAddress) -> Option<&RouteEntry> {
        self.routes.get(dest)
    }

    pub fn lookup_mut(&mut self, dest: &NetAddress) -> Option<&mut RouteEntry> {
        self.routes.get_mut(dest)
    }

    /// Next hop for `dest`, if a usable route exists
    pub fn next_hop(&self, dest: &NetAddress) -> Option<MacAddress> {
        self.routes
            .get(dest)
            .filter(|e| e.is_usable())
            .map(|e| e.next_hop)
    }

    pub fn remove(&mut self, dest: &NetAddress) -> Option<RouteEntry> {
        self.routes.remove(dest)
    }

    /// Remove every listed destination; true if anything was removed
    pub fn remove_list(&mut self, dests: &[NetAddress]) -> bool {
        let mut removed = false;
        for dest in dests {
            removed |= self.routes.remove(dest).is_some();
        }
        removed
    }

    /// Destinations currently routed through `next_hop`
    pub fn dests_via_hop(&self, next_hop: MacAddress) -> Vec<NetAddress> {
        self.routes
            .iter()
            .filter(|(_, e)| e.next_hop == next_hop)
            .map(|(dest, _)| *dest)
            .collect()
    }

    /// Remove every route through `next_hop`, returning the destinations lost
    pub fn remove_next_hop(&mut self, next_hop: MacAddress) -> Vec<NetAddress> {
        let lost = self.dests_via_hop(next_hop);
        for dest in &lost {
            self.routes.remove(dest);
        }
        lost
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NetAddress, &RouteEntry)> {
        self.routes.iter()
    }
}

/// Dedupe record for one route request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RreqBufferEntry {
    pub rreq_id: u32,
    pub originator: NetAddress,
    pub time: Duration,
}

/// Bounded, age-limited record of requests already handled.
/// Newest entries at the front.
#[derive(Debug)]
pub struct RreqBuffer {
    entries: VecDeque<RreqBufferEntry>,
    capacity: usize,
    lifetime: Duration,
}

impl RreqBuffer {
    pub fn new(capacity: usize, lifetime: Duration) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            lifetime,
        }
    }

    /// Record a request, evicting expired entries and then the oldest if full
    pub fn add(&mut self, rreq_id: u32, originator: NetAddress, now: Duration) {
        self.clear_expired(now);
        if self.entries.len() >= self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(RreqBufferEntry {
            rreq_id,
            originator,
            time: now,
        });
    }

    pub fn contains(&self, rreq_id: u32, originator: NetAddress) -> bool {
        self.entries
            .iter()
            .any(|e| e.rreq_id == rreq_id && e.originator == originator)
    }

    /// Drop entries older than the buffer lifetime; returns how many went
    pub fn clear_expired(&mut self, now: Duration) -> usize {
        let mut removed = 0;
        while self
            .entries
            .back()
            .is_some_and(|e| now > e.time + self.lifetime)
        {
            self.entries.pop_back();
            removed += 1;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Neighbours that route through us, with the time we last sent them anything
#[derive(Debug, Default)]
pub struct PrecursorSet {
    last_contact: BTreeMap<MacAddress, Duration>,
}

impl PrecursorSet {
    /// Add (or renew) a precursor
    pub fn add(&mut self, mac: MacAddress, now: Duration) {
        self.last_contact.insert(mac, now);
    }

    pub fn remove(&mut self, mac: &MacAddress) -> bool {
        self.last_contact.remove(mac).is_some()
    }

    /// Renew one precursor if known
    pub fn renew(&mut self, mac: &MacAddress, now: Duration) {
        if let Some(t) = self.last_contact.get_mut(mac) {
            *t = now;
        }
    }

    pub fn renew_all(&mut self, now: Duration) {
        for t in self.last_contact.values_mut() {
            *t = now;
        }
    }

    /// Precursors not contacted for at least `interval`
    pub fn quiet_since(&self, now: Duration, interval: Duration) -> Vec<MacAddress> {
        self.last_contact
            .iter()
            .filter(|(_, t)| now >= **t + interval)
            .map(|(mac, _)| *mac)
            .collect()
    }

    pub fn contains(&self, mac: &MacAddress) -> bool {
        self.last_contact.contains_key(mac)
    }

    pub fn macs(&self) -> Vec<MacAddress> {
        self.last_contact.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.last_contact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_contact.is_empty()
    }
}

/// Next hops we forward through, with missed-HELLO counters
#[derive(Debug, Default)]
pub struct OutgoingSet {
    hello_wait: BTreeMap<MacAddress, u32>,
}

impl OutgoingSet {
    /// Add a next hop (or reset its counter)
    pub fn add(&mut self, mac: MacAddress) {
        self.hello_wait.insert(mac, 0);
    }

    /// Reset the counter of a known next hop; false if unknown
    pub fn heard_from(&mut self, mac: &MacAddress) -> bool {
        match self.hello_wait.get_mut(mac) {
            Some(count) => {
                *count = 0;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, mac: &MacAddress) -> bool {
        self.hello_wait.remove(mac).is_some()
    }

    /// Age every counter by one period. Next hops whose counter already
    /// exceeded `allowed_loss` are removed and returned instead.
    pub fn tick(&mut self, allowed_loss: u32) -> Vec<MacAddress> {
        let mut lost = Vec::new();
        self.hello_wait.retain(|mac, count| {
            if *count > allowed_loss {
                lost.push(*mac);
                false
            } else {
                *count += 1;
                true
            }
        });
        lost
    }

    pub fn hello_wait_count(&self, mac: &MacAddress) -> Option<u32> {
        self.hello_wait.get(mac).copied()
    }

    pub fn contains(&self, mac: &MacAddress) -> bool {
        self.hello_wait.contains_key(mac)
    }

    pub fn len(&self) -> usize {
        self.hello_wait.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hello_wait.is_empty()
    }
}
