//! Error types for the quorum cop and deregistration votes

use swarmnet_core::{CoreError, PublicKey};
use thiserror::Error;

/// Why a vote or an aggregated deregistration does not verify
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoteError {
    #[error("No quorum state for height {0}")]
    NoQuorumState(u64),

    #[error("Voter index {index} out of bounds for {len} validators")]
    VoterIndexOutOfBounds { index: u32, len: usize },

    #[error("Service node index {index} out of bounds for {len} testees")]
    TesteeIndexOutOfBounds { index: u32, len: usize },

    #[error("Duplicate vote from voter {0}")]
    DuplicateVoter(u32),

    #[error("Not enough votes: {actual} < {required}")]
    NotEnoughVotes { actual: usize, required: usize },

    #[error("Signature of voter {0} does not verify")]
    BadSignature(u32),

    #[error("Vote for height {block_height} expired at height {current_height}")]
    Expired { block_height: u64, current_height: u64 },
}

/// Why an uptime proof was not accepted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UptimeProofError {
    #[error("Timestamp {timestamp} too far from local time {now}")]
    TimestampOutOfRange { timestamp: u64, now: u64 },

    #[error("{0} is not a service node")]
    UnknownServiceNode(PublicKey),

    #[error("Proof for {pubkey} already received at {last_seen}")]
    TooFrequent { pubkey: PublicKey, last_seen: u64 },

    #[error("Signature does not verify")]
    BadSignature,
}

impl UptimeProofError {
    /// Metric label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TimestampOutOfRange { .. } => "timestamp",
            Self::UnknownServiceNode(_) => "unknown_node",
            Self::TooFrequent { .. } => "too_frequent",
            Self::BadSignature => "signature",
        }
    }
}

/// Consensus error types
#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("Invalid vote: {0}")]
    Vote(#[from] VoteError),

    #[error("Invalid uptime proof: {0}")]
    UptimeProof(#[from] UptimeProofError),

    /// The local node has no service node keys
    #[error("No service node keys configured")]
    NoServiceNodeKeys,

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
