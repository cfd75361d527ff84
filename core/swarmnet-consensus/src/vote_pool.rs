//! Pool aggregating validator votes into deregistration transactions
//!
//! Votes are grouped by `(block_height, service_node_index)`. Once a group
//! holds votes from enough distinct validators the pool builds the
//! deregistration transaction the ledger mines. Groups leave the pool when
//! their deregistration is mined or their votes outlive the vote lifetime.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use swarmnet_core::constants::{MIN_VOTES_TO_KICK_SERVICE_NODE, VOTE_LIFETIME_IN_BLOCKS};
use swarmnet_core::{
    BlockAddedHook, Block, ServiceNodeDeregister, Transaction, TxExtra, TxExtraField, TxType,
};
use swarmnet_state::{QuorumState, ServiceNodeList};
use tracing::{debug, info, warn};

use crate::config::QuorumCopConfig;
use crate::errors::{ConsensusResult, VoteError};
use crate::messages::NewDeregisterVote;
use crate::metrics;
use crate::votes::{verify_vote, Vote};

/// Where the quorum cop hands the votes it signs
pub trait VoteSink: Send + Sync {
    fn submit_vote(&self, vote: Vote) -> ConsensusResult<()>;
}

type VoteKey = (u64, u32);

#[derive(Debug, Clone, Copy)]
struct PooledVote {
    vote: Vote,
    last_relayed: Option<u64>,
}

/// Wrap `deregister` in a transaction
pub fn deregister_transaction(deregister: ServiceNodeDeregister) -> ConsensusResult<Transaction> {
    let mut extra = TxExtra::default();
    extra.push(TxExtraField::ServiceNodeDeregister(deregister));
    Ok(Transaction {
        version: 3,
        tx_type: TxType::Deregister,
        extra: extra.to_bytes()?,
        ..Default::default()
    })
}

#[derive(Debug, Default)]
pub struct DeregisterVotePool {
    votes: Mutex<BTreeMap<VoteKey, Vec<PooledVote>>>,
}

impl DeregisterVotePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vote for a quorum at `vote.block_height`
    ///
    /// Returns the deregistration transaction whenever the group holds at
    /// least [`MIN_VOTES_TO_KICK_SERVICE_NODE`] votes. A repeated vote from
    /// the same validator is ignored.
    pub fn add_vote(
        &self,
        vote: &Vote,
        quorum: &QuorumState,
        current_height: u64,
    ) -> ConsensusResult<Option<Transaction>> {
        if current_height > vote.block_height + VOTE_LIFETIME_IN_BLOCKS {
            metrics::record_pool_vote("expired");
            return Err(VoteError::Expired { block_height: vote.block_height, current_height }.into());
        }
        if let Err(e) = verify_vote(vote, quorum) {
            metrics::record_pool_vote("invalid");
            return Err(e.into());
        }

        let mut pool = self.votes.lock();
        let group = pool.entry((vote.block_height, vote.service_node_index)).or_default();
        if group.iter().any(|p| p.vote.voters_quorum_index == vote.voters_quorum_index) {
            metrics::record_pool_vote("duplicate");
            return Ok(None);
        }
        group.push(PooledVote { vote: *vote, last_relayed: None });
        metrics::record_pool_vote("accepted");

        if group.len() < MIN_VOTES_TO_KICK_SERVICE_NODE {
            return Ok(None);
        }
        let deregister = ServiceNodeDeregister {
            block_height: vote.block_height,
            service_node_index: vote.service_node_index,
            votes: group.iter().map(|p| p.vote.to_deregister_vote()).collect(),
        };
        Ok(Some(deregister_transaction(deregister)?))
    }

    /// Forget the groups whose deregistration was mined in `txs`
    pub fn remove_used_votes(&self, txs: &[Transaction]) {
        let mut pool = self.votes.lock();
        for tx in txs.iter().filter(|tx| tx.tx_type == TxType::Deregister) {
            let Ok(extra) = tx.parse_extra() else { continue };
            if let Some(deregister) = extra.service_node_deregister() {
                pool.remove(&(deregister.block_height, deregister.service_node_index));
            }
        }
    }

    /// Forget votes that can no longer be mined at `height`
    pub fn remove_expired_votes(&self, height: u64) {
        self.votes
            .lock()
            .retain(|(block_height, _), _| block_height + VOTE_LIFETIME_IN_BLOCKS >= height);
    }

    /// Votes not relayed within `relay_interval` seconds, marked as relayed at `now`
    pub fn get_relayable_votes(&self, now: u64, relay_interval: u64) -> Vec<Vote> {
        let mut pool = self.votes.lock();
        let mut relayable = Vec::new();
        for pooled in pool.values_mut().flatten() {
            let due = pooled.last_relayed.map_or(true, |last| last + relay_interval <= now);
            if due {
                pooled.last_relayed = Some(now);
                relayable.push(pooled.vote);
            }
        }
        relayable
    }

    /// Number of votes held
    pub fn len(&self) -> usize {
        self.votes.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pool fed from the registry's quorum history
///
/// Deregistrations that reached the threshold wait in `ready` until the
/// caller moves them into the transaction pool.
pub struct VotePoolSink {
    registry: Arc<ServiceNodeList>,
    relay_interval: u64,
    pool: DeregisterVotePool,
    ready: Mutex<BTreeMap<VoteKey, Transaction>>,
}

impl std::fmt::Debug for VotePoolSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VotePoolSink")
            .field("votes", &self.pool.len())
            .field("ready", &self.ready.lock().len())
            .finish()
    }
}

impl VotePoolSink {
    pub fn new(registry: Arc<ServiceNodeList>, config: &QuorumCopConfig) -> Self {
        Self {
            registry,
            relay_interval: config.vote_relay_interval,
            pool: DeregisterVotePool::new(),
            ready: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn pool(&self) -> &DeregisterVotePool {
        &self.pool
    }

    /// Add a vote signed here or received from a peer
    pub fn handle_vote(&self, vote: &Vote) -> ConsensusResult<()> {
        let quorum = self
            .registry
            .get_quorum_state(vote.block_height)
            .ok_or(VoteError::NoQuorumState(vote.block_height))?;

        if let Some(tx) = self.pool.add_vote(vote, &quorum, self.registry.height())? {
            info!(
                height = vote.block_height,
                testee = vote.service_node_index,
                "deregistration reached vote threshold"
            );
            self.ready.lock().insert((vote.block_height, vote.service_node_index), tx);
        }
        Ok(())
    }

    /// Votes relayed by a peer, returns how many were taken into the pool
    pub fn handle_new_deregister_vote(&self, message: &NewDeregisterVote) -> usize {
        let mut accepted = 0;
        for vote in &message.votes {
            match self.handle_vote(vote) {
                Ok(()) => accepted += 1,
                Err(e) => debug!(height = vote.block_height, error = %e, "relayed vote rejected"),
            }
        }
        accepted
    }

    /// Pooled votes due for relay at `now`, `None` when nothing is due
    pub fn relayable_votes(&self, now: u64) -> Option<NewDeregisterVote> {
        let votes = self.pool.get_relayable_votes(now, self.relay_interval);
        (!votes.is_empty()).then_some(NewDeregisterVote { votes })
    }

    /// Take the deregistrations ready to be mined
    pub fn take_ready_transactions(&self) -> Vec<Transaction> {
        std::mem::take(&mut *self.ready.lock()).into_values().collect()
    }
}

impl VoteSink for VotePoolSink {
    fn submit_vote(&self, vote: Vote) -> ConsensusResult<()> {
        self.handle_vote(&vote)
    }
}

impl BlockAddedHook for VotePoolSink {
    fn block_added(&self, block: &Block, txs: &[Transaction]) {
        let Some(height) = block.height() else {
            warn!("block without a height reached the vote pool");
            return;
        };
        self.pool.remove_used_votes(txs);
        self.pool.remove_expired_votes(height);

        let mut ready = self.ready.lock();
        ready.retain(|(block_height, _), _| block_height + VOTE_LIFETIME_IN_BLOCKS >= height);
        debug!(height, votes = self.pool.len(), ready = ready.len(), "vote pool pruned");
    }
}
