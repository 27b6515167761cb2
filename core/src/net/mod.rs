//! Network layer primitives
//!
//! Addresses, links and the IP packet model shared by all three routing
//! engines and the simulation harness.

pub mod address;
pub mod packet;

pub use address::{Link, MacAddress, NetAddress};
pub use packet::{
    priority, protocol, InterfaceId, IpPacket, Payload, Priority, Protocol, SourceRoute,
    INTERFACE_DEFAULT, INTERFACE_LOOPBACK, TTL_DEFAULT,
};
