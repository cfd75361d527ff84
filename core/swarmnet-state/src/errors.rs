//! Error types for the service node registry

use swarmnet_core::{CoreError, PublicKey};
use thiserror::Error;

/// Registry errors
#[derive(Error, Debug)]
pub enum StateError {
    /// Registry state no longer matches the chain; recovered by a rebuild
    #[error("Registry state corrupt: {0}")]
    Corrupt(String),

    /// Rollback reached a fence and cannot go further back
    #[error("Rollback blocked by fence at height {0}")]
    RollbackFence(u64),

    /// Block arrived out of order
    #[error("Height mismatch: expected {expected}, got {actual}")]
    HeightMismatch { expected: u64, actual: u64 },

    /// Block without a coinbase height
    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Core primitive error
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for registry operations
pub type StateResult<T> = Result<T, StateError>;

/// Why a service node transaction was skipped
///
/// These never reach the ledger: the registry logs them and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("tx extra does not parse")]
    MalformedExtra,

    #[error("missing {0} in tx extra")]
    MissingField(&'static str),

    #[error("{addresses} addresses but {portions} portions")]
    PortionsMismatch { addresses: usize, portions: usize },

    #[error("invalid portions")]
    InvalidPortions,

    #[error("operator portions {0} exceed the portion unit")]
    InvalidOperatorPortions(u64),

    #[error("invalid service node key")]
    InvalidKey,

    #[error("signature does not verify")]
    InvalidSignature,

    #[error("registration expired at {expiration}, block time {block_timestamp}")]
    Expired { expiration: u64, block_timestamp: u64 },

    #[error("contribution could not be decoded")]
    UndecodableContribution,

    #[error("contribution {amount} below minimum {minimum}")]
    InsufficientContribution { amount: u64, minimum: u64 },

    #[error("too many contributors")]
    TooManyContributors,

    #[error("too many locked key images for contributor")]
    TooManyKeyImages,

    #[error("duplicate contributor address")]
    DuplicateContributor,

    #[error("service node {0} already registered")]
    AlreadyRegistered(PublicKey),

    #[error("unknown service node {0}")]
    UnknownServiceNode(PublicKey),

    #[error("service node {0} is already fully funded")]
    FullyFunded(PublicKey),

    #[error("no quorum state for height {0}")]
    NoQuorumState(u64),

    #[error("testee index {index} out of range for {len} testees")]
    TesteeIndexOutOfRange { index: u32, len: usize },

    #[error("unlock already requested for {0}")]
    UnlockAlreadyRequested(PublicKey),

    #[error("key image is not locked by {0}")]
    KeyImageNotLocked(PublicKey),

    #[error("stake unlocks need hard fork {required}, block is at {hf_version}")]
    UnlockBeforeInfiniteStaking { hf_version: u8, required: u8 },
}

impl From<CoreError> for RejectReason {
    fn from(_: CoreError) -> Self {
        RejectReason::MalformedExtra
    }
}

/// Result type for transaction-level checks
pub type RejectResult<T> = Result<T, RejectReason>;
