//! What the registry needs from the ledger

use swarmnet_core::{Block, Transaction};

use crate::errors::StateResult;

/// Read access to the main chain
///
/// The ledger stores a block before announcing it through
/// `block_added` and removes blocks before announcing
/// `blockchain_detached`, so `height` always counts the blocks the
/// registry is being told about.
pub trait Blockchain: Send + Sync {
    /// Number of blocks in the chain, i.e. the height of the next block
    fn height(&self) -> u64;

    /// Up to `count` consecutive blocks from `start`, each with its
    /// non-coinbase transactions in block order
    fn blocks_with_txs(&self, start: u64, count: u64) -> StateResult<Vec<(Block, Vec<Transaction>)>>;
}
