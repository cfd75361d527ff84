//! Quorum cop: liveness bookkeeping and the delinquency sweep
//!
//! After each block the cop walks quorum heights it has not yet examined,
//! stopping [`REORG_SAFETY_BUFFER_IN_BLOCKS`] short of the tip. At every
//! height where the local node is a validator it votes against each testee
//! without a live uptime proof.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use swarmnet_core::constants::{hf, REORG_SAFETY_BUFFER_IN_BLOCKS, VOTE_LIFETIME_IN_BLOCKS};
use swarmnet_core::{Block, BlockAddedHook, BlockchainDetachedHook, PublicKey, SecretKey, Transaction};
use swarmnet_state::ServiceNodeList;
use tracing::{debug, error, info, warn};

use crate::config::QuorumCopConfig;
use crate::errors::{ConsensusError, ConsensusResult};
use crate::messages::UptimeProof;
use crate::metrics;
use crate::uptime::{generate_uptime_proof, unix_now, LivenessTable, ProofInfo};
use crate::vote_pool::VoteSink;
use crate::votes::Vote;

pub struct QuorumCop {
    config: QuorumCopConfig,
    registry: Arc<ServiceNodeList>,
    liveness: Arc<LivenessTable>,
    votes: Arc<dyn VoteSink>,
    keys: RwLock<Option<(PublicKey, SecretKey)>>,
    started_at: u64,
    /// Next quorum height to examine
    last_height: Mutex<u64>,
}

impl std::fmt::Debug for QuorumCop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuorumCop")
            .field("config", &self.config)
            .field("started_at", &self.started_at)
            .field("last_height", &*self.last_height.lock())
            .finish_non_exhaustive()
    }
}

impl QuorumCop {
    pub fn new(
        config: QuorumCopConfig,
        registry: Arc<ServiceNodeList>,
        liveness: Arc<LivenessTable>,
        votes: Arc<dyn VoteSink>,
    ) -> Self {
        Self {
            config,
            registry,
            liveness,
            votes,
            keys: RwLock::new(None),
            started_at: unix_now(),
            last_height: Mutex::new(0),
        }
    }

    /// Keys of the local service node, `None` when not running as one.
    /// The registry is told the public key so it can report on our node.
    pub fn set_service_node_keys(&self, keys: Option<(PublicKey, SecretKey)>) {
        self.registry.set_my_service_node_keys(keys.map(|(pubkey, _)| pubkey));
        *self.keys.write() = keys;
    }

    pub fn liveness(&self) -> &LivenessTable {
        &self.liveness
    }

    pub fn last_height(&self) -> u64 {
        *self.last_height.lock()
    }

    /// Validate a proof received from the network
    pub fn handle_uptime_proof(&self, proof: &UptimeProof) -> ConsensusResult<()> {
        self.liveness.handle_uptime_proof(proof, &self.registry, unix_now())?;
        Ok(())
    }

    /// Sign a proof for the local node at the current time
    pub fn generate_uptime_proof(&self) -> ConsensusResult<UptimeProof> {
        let (pubkey, secret) = (*self.keys.read()).ok_or(ConsensusError::NoServiceNodeKeys)?;
        generate_uptime_proof(&pubkey, &secret, unix_now(), self.config.version)
            .ok_or_else(|| ConsensusError::Signing("invalid service node secret key".into()))
    }

    pub fn get_uptime_proof(&self, pubkey: &PublicKey) -> Option<ProofInfo> {
        self.liveness.get_uptime_proof(pubkey)
    }

    fn hard_fork_version(&self, height: u64) -> u8 {
        self.registry.config().network.hard_fork_version(height)
    }

    fn sweep(&self, height: u64, now: u64) {
        if self.hard_fork_version(height) < hf::SERVICE_NODES {
            return;
        }
        self.liveness.prune(now);

        if now < self.started_at + self.config.min_time_before_voting {
            return;
        }
        let Some((my_pubkey, my_secret)) = *self.keys.read() else {
            return;
        };
        if !self.registry.is_service_node(&my_pubkey) {
            return;
        }

        let latest_height = self.registry.height();
        if latest_height < VOTE_LIFETIME_IN_BLOCKS {
            return;
        }
        let justice_from = latest_height - VOTE_LIFETIME_IN_BLOCKS;
        if height < justice_from {
            return;
        }

        let mut last_height = self.last_height.lock();
        if *last_height < justice_from {
            *last_height = justice_from;
        }

        while *last_height + REORG_SAFETY_BUFFER_IN_BLOCKS < height {
            let quorum_height = *last_height;
            *last_height += 1;

            if self.hard_fork_version(quorum_height) < hf::SERVICE_NODES {
                continue;
            }
            let Some(quorum) = self.registry.get_quorum_state(quorum_height) else {
                error!(height = quorum_height, "quorum state missing while checking for delinquent nodes");
                continue;
            };
            let Some(my_index) = quorum.validator_index(&my_pubkey) else {
                continue;
            };

            for (testee_index, testee) in quorum.nodes_to_test.iter().enumerate() {
                if self.liveness.is_alive(testee, now) {
                    continue;
                }
                self.vote_against(quorum_height, testee_index as u32, testee, my_index as u32, &my_pubkey, &my_secret);
            }
        }
    }

    fn vote_against(
        &self,
        quorum_height: u64,
        testee_index: u32,
        testee: &PublicKey,
        my_index: u32,
        my_pubkey: &PublicKey,
        my_secret: &SecretKey,
    ) {
        let Some(vote) = Vote::sign(quorum_height, testee_index, my_index, my_pubkey, my_secret) else {
            error!("could not sign deregistration vote, service node key is invalid");
            metrics::record_vote_cast("unsigned");
            return;
        };

        match self.votes.submit_vote(vote) {
            Ok(()) => {
                info!(height = quorum_height, %testee, "voted to deregister unresponsive service node");
                metrics::record_vote_cast("submitted");
            }
            Err(e) => {
                warn!(height = quorum_height, %testee, error = %e, "deregistration vote not accepted");
                metrics::record_vote_cast("rejected");
            }
        }
    }

    pub fn blockchain_detached(&self, height: u64) {
        let mut last_height = self.last_height.lock();
        if *last_height >= height {
            error!(
                height,
                processed = *last_height,
                "chain detached below heights the quorum cop already voted on, reorg deeper than {} blocks",
                REORG_SAFETY_BUFFER_IN_BLOCKS
            );
            *last_height = height;
        }
    }
}

impl BlockAddedHook for QuorumCop {
    fn block_added(&self, block: &Block, _txs: &[Transaction]) {
        match block.height() {
            Some(height) => self.sweep(height, unix_now()),
            None => debug!("quorum cop skipped block without a coinbase height"),
        }
    }
}

impl BlockchainDetachedHook for QuorumCop {
    fn blockchain_detached(&self, height: u64) {
        QuorumCop::blockchain_detached(self, height);
    }
}
