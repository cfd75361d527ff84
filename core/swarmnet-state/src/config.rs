//! Registry configuration

use serde::{Deserialize, Serialize};
use swarmnet_core::constants::REBUILD_BATCH_BLOCKS;
use swarmnet_core::NetworkConfig;

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Network parameters and hard fork schedule
    pub network: NetworkConfig,

    /// Blocks requested from the ledger per batch while rescanning
    pub rebuild_batch_blocks: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let rebuild_batch_blocks = std::env::var("SWARMNET_REBUILD_BATCH")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&n: &u64| n > 0)
            .unwrap_or(REBUILD_BATCH_BLOCKS);

        Self {
            network: NetworkConfig::default(),
            rebuild_batch_blocks,
        }
    }
}

impl RegistryConfig {
    pub fn new(network: NetworkConfig) -> Self {
        Self { network, rebuild_batch_blocks: REBUILD_BATCH_BLOCKS }
    }
}
