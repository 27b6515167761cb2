//! DSR bookkeeping: request table, send buffer, maintenance buffer and
//! gratuitous reply holdoff

use crate::net::{IpPacket, NetAddress, Protocol};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Duration;

/// Discovery state toward one target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discovery {
    pub requests_since_reply: u32,
    /// Wait before the next retry is allowed
    pub timeout: Duration,
    pub last_request: Duration,
}

impl Discovery {
    fn new(base: Duration, now: Duration) -> Self {
        Self {
            requests_since_reply: 0,
            timeout: base,
            last_request: now,
        }
    }

    /// Whether a request may go out now
    pub fn may_request(&self, now: Duration) -> bool {
        self.requests_since_reply == 0 || self.last_request + self.timeout <= now
    }
}

/// Recently seen request ids per originator, and discovery state per target
#[derive(Debug, Clone)]
pub struct RequestTable {
    max_ids: usize,
    base_timeout: Duration,
    seen: HashMap<NetAddress, VecDeque<u16>>,
    discovery: BTreeMap<NetAddress, Discovery>,
}

impl RequestTable {
    pub fn new(max_ids: usize, base_timeout: Duration) -> Self {
        Self {
            max_ids,
            base_timeout,
            seen: HashMap::new(),
            discovery: BTreeMap::new(),
        }
    }

    /// True if `(src, id)` was seen recently. A hit moves the id to the front
    /// so it outlives older ids.
    pub fn seen_lately(&mut self, src: NetAddress, id: u16) -> bool {
        let Some(ids) = self.seen.get_mut(&src) else {
            return false;
        };
        match ids.iter().position(|&i| i == id) {
            Some(pos) => {
                ids.remove(pos);
                ids.push_front(id);
                true
            }
            None => false,
        }
    }

    /// Remember `(src, id)`, forgetting the least recently seen id when full
    pub fn add_id(&mut self, src: NetAddress, id: u16) {
        if self.seen_lately(src, id) {
            return;
        }
        let ids = self.seen.entry(src).or_default();
        ids.push_front(id);
        if ids.len() > self.max_ids {
            ids.pop_back();
        }
    }

    pub fn discovery(&self, target: &NetAddress) -> Option<&Discovery> {
        self.discovery.get(target)
    }

    pub fn discovery_mut(&mut self, target: NetAddress, now: Duration) -> &mut Discovery {
        let base = self.base_timeout;
        self.discovery
            .entry(target)
            .or_insert_with(|| Discovery::new(base, now))
    }

    /// A reply for `target` arrived: the next discovery starts from scratch
    pub fn reply_received(&mut self, target: &NetAddress) {
        if let Some(d) = self.discovery.get_mut(target) {
            d.requests_since_reply = 0;
            d.timeout = self.base_timeout;
        }
    }

    pub fn forget_discovery(&mut self, target: &NetAddress) {
        self.discovery.remove(target);
    }
}

#[derive(Debug, Clone)]
struct Buffered {
    key: u64,
    packet: IpPacket,
}

/// Packets waiting for a route
#[derive(Debug, Default, Clone)]
pub struct SendBuffer {
    next_key: u64,
    packets: Vec<Buffered>,
}

impl SendBuffer {
    /// Buffer `packet`; the returned key identifies it for expiry
    pub fn insert(&mut self, packet: IpPacket) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        self.packets.push(Buffered { key, packet });
        key
    }

    /// Remove the packet under `key`, if still buffered
    pub fn expire(&mut self, key: u64) -> Option<IpPacket> {
        let pos = self.packets.iter().position(|b| b.key == key)?;
        Some(self.packets.remove(pos).packet)
    }

    /// Remove and return every packet for `dest`, oldest first
    pub fn take_for(&mut self, dest: &NetAddress) -> Vec<IpPacket> {
        let (ready, kept): (Vec<_>, Vec<_>) =
            self.packets.drain(..).partition(|b| b.packet.dst == *dest);
        self.packets = kept;
        ready.into_iter().map(|b| b.packet).collect()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

/// Identity of a packet for passive acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaintenanceKey {
    pub src: NetAddress,
    pub dst: NetAddress,
    pub protocol: Protocol,
    pub id: u16,
    pub frag_offset: u16,
}

impl MaintenanceKey {
    pub fn of(packet: &IpPacket) -> Self {
        Self {
            src: packet.src,
            dst: packet.dst,
            protocol: packet.protocol,
            id: packet.id,
            frag_offset: packet.frag_offset,
        }
    }
}

/// Forwarded packets awaiting a passive ack, with the segments-left value
/// they were sent with
#[derive(Debug, Default, Clone)]
pub struct MaintenanceBuffer {
    entries: HashMap<MaintenanceKey, u8>,
}

impl MaintenanceBuffer {
    pub fn insert(&mut self, key: MaintenanceKey, segments_left: u8) {
        self.entries.insert(key, segments_left);
    }

    pub fn contains(&self, key: &MaintenanceKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &MaintenanceKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// An overheard copy with fewer segments left means the next hop
    /// forwarded it. Returns true if that acknowledged an entry.
    pub fn passive_ack(&mut self, key: &MaintenanceKey, segments_left: u8) -> bool {
        match self.entries.get(key) {
            Some(&sent) if sent > segments_left => {
                self.entries.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// (originator, previous hop) pairs recently sent a gratuitous reply
#[derive(Debug, Default, Clone)]
pub struct ReplyHoldoff {
    entries: HashSet<(NetAddress, NetAddress)>,
}

impl ReplyHoldoff {
    pub fn contains(&self, originator: NetAddress, last_hop: NetAddress) -> bool {
        self.entries.contains(&(originator, last_hop))
    }

    pub fn insert(&mut self, originator: NetAddress, last_hop: NetAddress) {
        self.entries.insert((originator, last_hop));
    }

    pub fn remove(&mut self, originator: NetAddress, last_hop: NetAddress) {
        self.entries.remove(&(originator, last_hop));
    }
}
