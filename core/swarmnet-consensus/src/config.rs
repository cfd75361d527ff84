//! Quorum cop configuration

use serde::{Deserialize, Serialize};
use swarmnet_core::constants::MIN_TIME_IN_S_BEFORE_VOTING;

/// Quorum cop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuorumCopConfig {
    /// Seconds the node must have been running before it votes
    pub min_time_before_voting: u64,

    /// Seconds before a pooled vote is offered for relay again
    pub vote_relay_interval: u64,

    /// Version advertised in uptime proofs
    pub version: [u16; 3],
}

impl Default for QuorumCopConfig {
    fn default() -> Self {
        let min_time_before_voting = std::env::var("SWARMNET_MIN_TIME_BEFORE_VOTING")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(MIN_TIME_IN_S_BEFORE_VOTING);

        let vote_relay_interval = std::env::var("SWARMNET_VOTE_RELAY_INTERVAL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        Self {
            min_time_before_voting,
            vote_relay_interval,
            version: [0, 1, 0],
        }
    }
}
