// Multihop ad hoc routing engines
//
// Three pluggable engines (AODV, DSR, ZRP) behind one network-layer
// contract, plus the simulation host that drives them in virtual time.

pub mod aodv;
pub mod dsr;
pub mod net;
pub mod route;
pub mod sim;
pub mod zrp;

use thiserror::Error;

pub use aodv::{Aodv, AodvConfig};
pub use dsr::{Dsr, DsrConfig};
pub use net::{IpPacket, Link, MacAddress, NetAddress, Payload};
pub use route::RouteInterface;
pub use sim::{DropReason, Effect, NodeContext, SimConfig, Simulation};
pub use zrp::{Compression, Zrp, ZrpConfig};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error, Clone)]
pub enum ManetError {
    #[error("Invalid zone radius: {0} (expected 1..=127)")]
    InvalidRadius(u8),
    #[error("Unknown node index: {0}")]
    UnknownNodeIndex(usize),
    #[error("Unknown node address: {0}")]
    UnknownNode(NetAddress),
    #[error("DSR codec error: {0}")]
    Codec(#[from] dsr::DsrError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{protocol} does not support {compression:?} compression")]
    UnsupportedCompression {
        protocol: &'static str,
        compression: zrp::Compression,
    },
}

/// Install a `tracing` subscriber honouring `RUST_LOG`, falling back to
/// `default_filter`. Safe to call more than once.
pub fn init_logging(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .try_init();
}

/// Load an engine configuration from JSON
pub fn config_from_json<T: serde::de::DeserializeOwned>(json: &str) -> Result<T, ManetError> {
    serde_json::from_str(json).map_err(|e| ManetError::Config(e.to_string()))
}

/// Serialize an engine configuration to JSON
pub fn config_to_json<T: serde::Serialize>(config: &T) -> Result<String, ManetError> {
    serde_json::to_string(config).map_err(|e| ManetError::Config(e.to_string()))
}
