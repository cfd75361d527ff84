//! Deregistration votes and their verification
//!
//! A validator signs `(block_height, service_node_index, voters_quorum_index)`
//! with its service node key. The ledger accepts a deregistration only when
//! enough distinct validators of the referenced quorum have signed the same
//! testee.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use swarmnet_core::constants::MIN_VOTES_TO_KICK_SERVICE_NODE;
use swarmnet_core::crypto::{check_signature, generate_signature};
use swarmnet_core::{fast_hash, DeregisterVote, Hash, PublicKey, SecretKey, ServiceNodeDeregister, Signature};
use swarmnet_state::QuorumState;

use crate::errors::VoteError;

/// One validator's signed vote against one testee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub block_height: u64,
    pub service_node_index: u32,
    pub voters_quorum_index: u32,
    pub signature: Signature,
}

impl Vote {
    /// Sign a vote, `None` when the secret key is not a valid scalar
    pub fn sign(
        block_height: u64,
        service_node_index: u32,
        voters_quorum_index: u32,
        pubkey: &PublicKey,
        secret: &SecretKey,
    ) -> Option<Self> {
        let hash = vote_hash(block_height, service_node_index, voters_quorum_index);
        let signature = generate_signature(&hash, pubkey, secret)?;
        Some(Self { block_height, service_node_index, voters_quorum_index, signature })
    }

    pub fn hash(&self) -> Hash {
        vote_hash(self.block_height, self.service_node_index, self.voters_quorum_index)
    }

    /// The form carried inside a deregistration transaction
    pub fn to_deregister_vote(&self) -> DeregisterVote {
        DeregisterVote { voters_quorum_index: self.voters_quorum_index, signature: self.signature }
    }
}

/// Message signed by a deregistration vote
pub fn vote_hash(block_height: u64, service_node_index: u32, voters_quorum_index: u32) -> Hash {
    let mut buf = [0u8; 16];
    buf[..8].copy_from_slice(&block_height.to_le_bytes());
    buf[8..12].copy_from_slice(&service_node_index.to_le_bytes());
    buf[12..].copy_from_slice(&voters_quorum_index.to_le_bytes());
    fast_hash(&buf)
}

fn check_testee_index(service_node_index: u32, quorum: &QuorumState) -> Result<(), VoteError> {
    if service_node_index as usize >= quorum.nodes_to_test.len() {
        return Err(VoteError::TesteeIndexOutOfBounds {
            index: service_node_index,
            len: quorum.nodes_to_test.len(),
        });
    }
    Ok(())
}

fn check_voter(
    block_height: u64,
    service_node_index: u32,
    vote: &DeregisterVote,
    quorum: &QuorumState,
) -> Result<(), VoteError> {
    let index = vote.voters_quorum_index;
    let voter = quorum
        .quorum_nodes
        .get(index as usize)
        .ok_or(VoteError::VoterIndexOutOfBounds { index, len: quorum.quorum_nodes.len() })?;

    let hash = vote_hash(block_height, service_node_index, index);
    if !check_signature(&hash, voter, &vote.signature) {
        return Err(VoteError::BadSignature(index));
    }
    Ok(())
}

/// Check a single vote against the quorum of its height
pub fn verify_vote(vote: &Vote, quorum: &QuorumState) -> Result<(), VoteError> {
    check_testee_index(vote.service_node_index, quorum)?;
    check_voter(vote.block_height, vote.service_node_index, &vote.to_deregister_vote(), quorum)
}

/// Check an aggregated deregistration against the quorum of its height
pub fn verify_deregister(deregister: &ServiceNodeDeregister, quorum: &QuorumState) -> Result<(), VoteError> {
    if deregister.votes.len() < MIN_VOTES_TO_KICK_SERVICE_NODE {
        return Err(VoteError::NotEnoughVotes {
            actual: deregister.votes.len(),
            required: MIN_VOTES_TO_KICK_SERVICE_NODE,
        });
    }
    check_testee_index(deregister.service_node_index, quorum)?;

    let mut seen = HashSet::with_capacity(deregister.votes.len());
    for vote in &deregister.votes {
        if !seen.insert(vote.voters_quorum_index) {
            return Err(VoteError::DuplicateVoter(vote.voters_quorum_index));
        }
        check_voter(deregister.block_height, deregister.service_node_index, vote, quorum)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmnet_core::crypto::generate_keys;

    struct Quorum {
        state: QuorumState,
        secrets: Vec<SecretKey>,
    }

    fn quorum(validators: usize) -> Quorum {
        let (keys, secrets): (Vec<PublicKey>, Vec<SecretKey>) = (0..validators).map(|_| generate_keys()).unzip();
        let state = QuorumState {
            quorum_nodes: keys,
            nodes_to_test: vec![generate_keys().0, generate_keys().0],
        };
        Quorum { state, secrets }
    }

    fn vote(q: &Quorum, height: u64, testee: u32, voter: u32) -> Vote {
        let v = voter as usize;
        Vote::sign(height, testee, voter, &q.state.quorum_nodes[v], &q.secrets[v]).unwrap()
    }

    fn deregister(q: &Quorum, voters: &[u32]) -> ServiceNodeDeregister {
        ServiceNodeDeregister {
            block_height: 42,
            service_node_index: 1,
            votes: voters.iter().map(|&i| vote(q, 42, 1, i).to_deregister_vote()).collect(),
        }
    }

    #[test]
    fn test_vote_hash_layout() {
        let mut expected = Vec::new();
        expected.extend_from_slice(&7u64.to_le_bytes());
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(&3u32.to_le_bytes());
        assert_eq!(vote_hash(7, 1, 3), fast_hash(&expected));
        assert_ne!(vote_hash(7, 1, 3), vote_hash(7, 3, 1));
    }

    #[test]
    fn test_verify_vote() {
        let q = quorum(10);
        assert_eq!(verify_vote(&vote(&q, 42, 0, 4), &q.state), Ok(()));

        let mut wrong_testee = vote(&q, 42, 0, 4);
        wrong_testee.service_node_index = 1;
        assert_eq!(verify_vote(&wrong_testee, &q.state), Err(VoteError::BadSignature(4)));

        let mut out_of_range = vote(&q, 42, 0, 4);
        out_of_range.service_node_index = 2;
        assert_eq!(
            verify_vote(&out_of_range, &q.state),
            Err(VoteError::TesteeIndexOutOfBounds { index: 2, len: 2 })
        );

        let mut stranger = vote(&q, 42, 0, 4);
        stranger.voters_quorum_index = 10;
        assert_eq!(
            verify_vote(&stranger, &q.state),
            Err(VoteError::VoterIndexOutOfBounds { index: 10, len: 10 })
        );
    }

    #[test]
    fn test_verify_deregister() {
        let q = quorum(10);
        assert_eq!(verify_deregister(&deregister(&q, &[0, 1, 2, 3, 4, 5, 6]), &q.state), Ok(()));
        assert_eq!(
            verify_deregister(&deregister(&q, &[0, 1, 2, 3, 4, 5]), &q.state),
            Err(VoteError::NotEnoughVotes { actual: 6, required: 7 })
        );
        assert_eq!(
            verify_deregister(&deregister(&q, &[0, 1, 2, 3, 4, 5, 5]), &q.state),
            Err(VoteError::DuplicateVoter(5))
        );

        let mut forged = deregister(&q, &[0, 1, 2, 3, 4, 5, 6]);
        forged.votes[3].signature = forged.votes[2].signature;
        assert_eq!(verify_deregister(&forged, &q.state), Err(VoteError::BadSignature(3)));

        let mut moved = deregister(&q, &[0, 1, 2, 3, 4, 5, 6]);
        moved.block_height += 1;
        assert_eq!(verify_deregister(&moved, &q.state), Err(VoteError::BadSignature(0)));
    }
}
