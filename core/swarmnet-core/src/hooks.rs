//! Callbacks the ledger drives, strictly in height order
//!
//! The ledger calls `block_added` once per height with no gaps and
//! `blockchain_detached` when it pops blocks during a reorg. Implementors
//! treat any violation of that ordering as state corruption.

use crate::crypto::Hash;
use crate::transaction::{Block, Transaction};

/// Reward split computed by the ledger for one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockRewardParts {
    /// Amount paid out to the winning service node and its contributors
    pub service_node_total: u64,
}

pub trait BlockAddedHook: Send + Sync {
    fn block_added(&self, block: &Block, txs: &[Transaction]);
}

pub trait BlockchainDetachedHook: Send + Sync {
    /// Blocks at `height` and above were removed
    fn blockchain_detached(&self, height: u64);
}

pub trait InitHook: Send + Sync {
    fn init(&self);
}

pub trait ValidateMinerTxHook: Send + Sync {
    fn validate_miner_tx(
        &self,
        prev_id: &Hash,
        miner_tx: &Transaction,
        height: u64,
        hf_version: u8,
        reward_parts: &BlockRewardParts,
    ) -> bool;
}

/// Share of `total` corresponding to `portions` out of the portion unit
pub fn get_portion_of_reward(portions: u64, total: u64) -> u64 {
    (u128::from(total) * u128::from(portions) / u128::from(crate::constants::STAKING_PORTIONS)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::STAKING_PORTIONS;

    #[test]
    fn test_portion_of_reward() {
        assert_eq!(get_portion_of_reward(STAKING_PORTIONS, 1_000), 1_000);
        assert_eq!(get_portion_of_reward(STAKING_PORTIONS / 2, 1_000), 500);
        assert_eq!(get_portion_of_reward(0, 1_000), 0);
    }
}
