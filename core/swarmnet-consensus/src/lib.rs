//! Quorum consensus for swarmnet service nodes
//!
//! Service nodes prove liveness with signed uptime proofs. Every block, each
//! validator of an older quorum votes against the testees it has not heard
//! from, and the vote pool turns enough matching votes into a deregistration
//! transaction for the ledger to mine.

pub mod config;
pub mod errors;
pub mod messages;
pub mod metrics;
pub mod quorum_cop;
pub mod uptime;
pub mod vote_pool;
pub mod votes;

pub use config::QuorumCopConfig;
pub use errors::{ConsensusError, ConsensusResult, UptimeProofError, VoteError};
pub use messages::{NewDeregisterVote, UptimeProof};
pub use quorum_cop::QuorumCop;
pub use uptime::{generate_uptime_proof, unix_now, uptime_proof_hash, LivenessTable, ProofInfo};
pub use vote_pool::{deregister_transaction, DeregisterVotePool, VotePoolSink, VoteSink};
pub use votes::{verify_deregister, verify_vote, vote_hash, Vote};

/// Re-export commonly used items
pub mod prelude {
    pub use crate::{
        ConsensusError, ConsensusResult, DeregisterVotePool, LivenessTable, QuorumCop, QuorumCopConfig,
        UptimeProof, Vote, VoteSink,
    };
}
