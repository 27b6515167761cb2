//! Simulation host
//!
//! This module provides:
//! - NodeContext: virtual clock, RNG and effect outbox passed into every engine callback
//! - Simulation: minimal discrete-event harness with the IP layer's
//!   peek / deliver / forward semantics over an explicit link set
//!
//! Radio propagation, MAC contention and mobility are not modelled: a frame
//! sent at time t reaches every current neighbour at t + propagation delay.

pub mod context;
pub mod kernel;

pub use context::{DropReason, Effect, NodeContext};
pub use kernel::{SimNode, Simulation};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Delay between transmission and reception on every link
    pub propagation_delay: Duration,
    /// Pass unicast frames addressed to other nodes to `peek`
    pub promiscuous: bool,
    /// Base seed; node `i` uses `seed + i`
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            propagation_delay: Duration::from_micros(100),
            promiscuous: false,
            seed: 1,
        }
    }
}
