//! Consensus constants shared by the registry and the quorum machinery

/// Fixed-point unit in which stake shares are expressed
pub const STAKING_PORTIONS: u64 = 0xffff_ffff_ffff_fffc;
pub const MAX_NUMBER_OF_CONTRIBUTORS: usize = 4;
pub const MAX_KEY_IMAGES_PER_CONTRIBUTOR: usize = 1;

pub const QUORUM_SIZE: usize = 10;
pub const MIN_VOTES_TO_KICK_SERVICE_NODE: usize = 7;
pub const NTH_OF_THE_NETWORK_TO_TEST: usize = 100;
pub const MIN_NODES_TO_TEST: usize = 50;

pub const MIN_SWARM_SIZE: usize = 5;
pub const MAX_SWARM_SIZE: usize = 10;
/// Surplus the queue must hold beyond a full swarm before a new one forms
pub const SWARM_BUFFER: usize = 5;
/// Pseudo-swarm holding nodes not yet assigned
pub const QUEUE_SWARM_ID: u64 = u64::MAX;

pub const TARGET_BLOCK_TIME: u64 = 120;
pub const VOTE_LIFETIME_IN_BLOCKS: u64 = 2 * 60 * 60 / TARGET_BLOCK_TIME;
pub const QUORUM_LIFETIME_IN_BLOCKS: u64 = 6 * VOTE_LIFETIME_IN_BLOCKS;
pub const ROLLBACK_EVENT_EXPIRATION_BLOCKS: u64 = 30;
pub const REORG_SAFETY_BUFFER_IN_BLOCKS: u64 = 20;
/// Grace window after a legacy stake unlocks, during which the node may
/// re-register and keep its place in the reward queue
pub const STAKING_REQUIREMENT_LOCK_BLOCKS_EXCESS: u64 = 20;

pub const UPTIME_PROOF_BUFFER_IN_SECONDS: u64 = 5 * 60;
pub const UPTIME_PROOF_FREQUENCY_IN_SECONDS: u64 = 60 * 60;
pub const UPTIME_PROOF_MAX_TIME_IN_SECONDS: u64 =
    UPTIME_PROOF_FREQUENCY_IN_SECONDS * 2 + UPTIME_PROOF_BUFFER_IN_SECONDS;
pub const MIN_TIME_IN_S_BEFORE_VOTING: u64 = UPTIME_PROOF_MAX_TIME_IN_SECONDS;

/// Magic prefix of the uptime proof hash
pub const UPTIME_PROOF_MAGIC: [u8; 4] = *b"SUP\0";

pub const COIN: u64 = 1_000_000_000;

/// Blocks fetched per batch while rescanning the chain
pub const REBUILD_BATCH_BLOCKS: u64 = 1000;

/// Hard fork versions that change service node rules
pub mod hf {
    pub const BASE: u8 = 7;
    pub const SERVICE_NODES: u8 = 8;
    pub const SWARMS: u8 = 9;
    pub const INFINITE_STAKING: u8 = 10;
}
