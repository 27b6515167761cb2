//! Node and link-layer addressing

use serde::{Deserialize, Serialize};
use std::fmt;

/// 4-byte network-layer node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetAddress([u8; 4]);

impl NetAddress {
    /// Wire size in bytes
    pub const SIZE: usize = 4;
    /// Broadcast address (255.255.255.255)
    pub const ANY: NetAddress = NetAddress([255, 255, 255, 255]);
    /// Loopback address (127.0.0.1)
    pub const LOCAL: NetAddress = NetAddress([127, 0, 0, 1]);
    /// Unassigned address (0.0.0.0)
    pub const NULL: NetAddress = NetAddress([0, 0, 0, 0]);

    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Address derived from a node index, big-endian
    pub const fn from_index(index: u32) -> Self {
        Self(index.to_be_bytes())
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0
    }

    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let bytes: [u8; 4] = data.get(..Self::SIZE)?.try_into().ok()?;
        Some(Self(bytes))
    }

    pub fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::ANY
    }
}

impl From<u32> for NetAddress {
    fn from(value: u32) -> Self {
        Self::from_index(value)
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

/// Link-layer interface address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MacAddress(u32);

impl MacAddress {
    /// Link-layer broadcast
    pub const ANY: MacAddress = MacAddress(u32::MAX);
    /// Loopback interface
    pub const LOOP: MacAddress = MacAddress(u32::MAX - 1);
    /// No next hop known (self route)
    pub const NULL: MacAddress = MacAddress(u32::MAX - 2);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// True for ordinary unicast interface addresses
    pub fn is_unicast(&self) -> bool {
        self.0 < Self::NULL.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ANY => write!(f, "mac:any"),
            Self::LOOP => write!(f, "mac:loop"),
            Self::NULL => write!(f, "mac:null"),
            Self(v) => write!(f, "mac:{}", v),
        }
    }
}

/// Directed link between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Link {
    pub src: NetAddress,
    pub dst: NetAddress,
}

impl Link {
    pub fn new(src: NetAddress, dst: NetAddress) -> Self {
        Self { src, dst }
    }

    /// Same link in the opposite direction
    pub fn reverse(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.src, self.dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_from_index() {
        let addr = NetAddress::from_index(258);
        assert_eq!(addr.to_bytes(), [0, 0, 1, 2]);
        assert_eq!(addr.to_u32(), 258);
        assert_eq!(addr.to_string(), "0.0.1.2");
    }

    #[test]
    fn test_address_from_short_slice() {
        assert!(NetAddress::from_slice(&[1, 2, 3]).is_none());
        assert_eq!(
            NetAddress::from_slice(&[10, 0, 0, 1, 99]),
            Some(NetAddress::new([10, 0, 0, 1]))
        );
    }

    #[test]
    fn test_special_mac_addresses() {
        assert!(MacAddress::new(7).is_unicast());
        assert!(!MacAddress::ANY.is_unicast());
        assert!(!MacAddress::NULL.is_unicast());
        assert!(!MacAddress::LOOP.is_unicast());
    }

    #[test]
    fn test_link_reverse() {
        let a = NetAddress::from_index(1);
        let b = NetAddress::from_index(2);
        let link = Link::new(a, b);
        assert_eq!(link.reverse(), Link::new(b, a));
        assert_eq!(link.reverse().reverse(), link);
    }
}
