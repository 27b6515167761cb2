//! AODV control messages and counters

use crate::net::NetAddress;
use serde::{Deserialize, Serialize};

/// Route request, flooded with an expanding ttl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequestMsg {
    pub rreq_id: u32,
    pub dest: NetAddress,
    pub orig: NetAddress,
    /// Latest destination sequence number known to the sender
    pub dest_seq: u32,
    pub orig_seq: u32,
    /// Sender knows no destination sequence number at all
    pub unknown_dest_seq: bool,
    pub hop_count: u32,
}

/// Route reply, unicast back along the reverse path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteReplyMsg {
    pub dest: NetAddress,
    pub dest_seq: u32,
    pub orig: NetAddress,
    pub hop_count: u32,
}

/// Route error listing destinations that became unreachable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteErrorMsg {
    pub unreachable: Vec<NetAddress>,
}

/// Liveness beacon sent to quiet precursors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloMsg {
    pub addr: NetAddress,
    pub seq: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AodvMessage {
    Rreq(RouteRequestMsg),
    Rrep(RouteReplyMsg),
    Rerr(RouteErrorMsg),
    Hello(HelloMsg),
}

impl AodvMessage {
    pub const RREQ_SIZE: usize = 24;
    pub const RREP_SIZE: usize = 20;
    pub const RERR_SIZE: usize = 20;
    pub const HELLO_SIZE: usize = 20;

    pub fn size(&self) -> usize {
        match self {
            AodvMessage::Rreq(_) => Self::RREQ_SIZE,
            AodvMessage::Rrep(_) => Self::RREP_SIZE,
            AodvMessage::Rerr(_) => Self::RERR_SIZE,
            AodvMessage::Hello(_) => Self::HELLO_SIZE,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AodvMessage::Rreq(_) => "rreq",
            AodvMessage::Rrep(_) => "rrep",
            AodvMessage::Rerr(_) => "rerr",
            AodvMessage::Hello(_) => "hello",
        }
    }
}

/// Per-kind packet counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketCounts {
    pub rreq: u64,
    pub rrep: u64,
    pub rerr: u64,
    pub hello: u64,
}

impl PacketCounts {
    pub fn total(&self) -> u64 {
        self.rreq + self.rrep + self.rerr + self.hello
    }

    pub(crate) fn count(&mut self, msg: &AodvMessage) {
        match msg {
            AodvMessage::Rreq(_) => self.rreq += 1,
            AodvMessage::Rrep(_) => self.rrep += 1,
            AodvMessage::Rerr(_) => self.rerr += 1,
            AodvMessage::Hello(_) => self.hello += 1,
        }
    }
}

/// Engine statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AodvStats {
    pub send: PacketCounts,
    pub recv: PacketCounts,
    /// Discoveries started at this node
    pub rreq_originated: u64,
    /// Discoveries answered
    pub rreq_succeeded: u64,
    /// Replies generated at this node (as target or with a fresher route)
    pub rrep_originated: u64,
}
