//! Per-height quorum selection

use serde::{Deserialize, Serialize};
use swarmnet_core::constants::{MIN_NODES_TO_TEST, NTH_OF_THE_NETWORK_TO_TEST, QUORUM_SIZE};
use swarmnet_core::{shuffle, PublicKey};

/// Validators and testees for one height. Never modified once stored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuorumState {
    pub quorum_nodes: Vec<PublicKey>,
    pub nodes_to_test: Vec<PublicKey>,
}

impl QuorumState {
    /// Select from `sorted_nodes`, which must be the fully funded nodes in
    /// ascending key order
    pub fn generate(sorted_nodes: &[PublicKey], seed: u64) -> Self {
        let mut indexes: Vec<usize> = (0..sorted_nodes.len()).collect();
        shuffle(&mut indexes, seed);

        let quorum_len = sorted_nodes.len().min(QUORUM_SIZE);
        let remaining = indexes.len() - quorum_len;
        let test_len = (remaining / NTH_OF_THE_NETWORK_TO_TEST).max(MIN_NODES_TO_TEST.min(remaining));

        let quorum_nodes = indexes[..quorum_len].iter().map(|&i| sorted_nodes[i]).collect();
        let nodes_to_test = indexes[quorum_len..quorum_len + test_len]
            .iter()
            .map(|&i| sorted_nodes[i])
            .collect();

        Self { quorum_nodes, nodes_to_test }
    }

    /// Position of `key` among the validators
    pub fn validator_index(&self, key: &PublicKey) -> Option<usize> {
        self.quorum_nodes.iter().position(|k| k == key)
    }
}
