//! Service node records

use serde::{Deserialize, Serialize};
use swarmnet_core::constants::{hf, QUEUE_SWARM_ID};
use swarmnet_core::{AccountAddress, KeyImage, PublicKey, SwarmId};

/// Schema of a node record, fixed by the hard fork it registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeVersion {
    V0,
    V1Swarms,
    V2InfiniteStaking,
}

impl NodeVersion {
    pub fn for_hard_fork(hf_version: u8) -> Self {
        if hf_version >= hf::INFINITE_STAKING {
            Self::V2InfiniteStaking
        } else if hf_version >= hf::SWARMS {
            Self::V1Swarms
        } else {
            Self::V0
        }
    }
}

/// Output locked as stake, identified by its key image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedContribution {
    pub key_image: KeyImage,
    /// One-time output key the key image was generated from
    pub key_image_pub_key: PublicKey,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub address: AccountAddress,
    pub amount: u64,
    pub reserved: u64,
    pub locked_contributions: Vec<LockedContribution>,
}

impl Contributor {
    pub fn new(address: AccountAddress, reserved: u64) -> Self {
        Self { address, amount: 0, reserved, locked_contributions: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNodeInfo {
    pub version: NodeVersion,
    pub registration_height: u64,
    /// Height after which the stake unlocks; `None` until an unlock is requested
    pub requested_unlock_height: Option<u64>,
    pub last_reward_block_height: u64,
    pub last_reward_transaction_index: u32,
    pub contributors: Vec<Contributor>,
    pub total_contributed: u64,
    pub total_reserved: u64,
    pub staking_requirement: u64,
    pub portions_for_operator: u64,
    pub swarm_id: SwarmId,
    pub operator_address: AccountAddress,
}

impl Default for ServiceNodeInfo {
    fn default() -> Self {
        Self {
            version: NodeVersion::V0,
            registration_height: 0,
            requested_unlock_height: None,
            last_reward_block_height: 0,
            last_reward_transaction_index: 0,
            contributors: Vec::new(),
            total_contributed: 0,
            total_reserved: 0,
            staking_requirement: 0,
            portions_for_operator: 0,
            swarm_id: QUEUE_SWARM_ID,
            operator_address: AccountAddress::null(),
        }
    }
}

impl ServiceNodeInfo {
    pub fn is_fully_funded(&self) -> bool {
        self.total_contributed >= self.staking_requirement
    }

    pub fn total_num_locked_contributions(&self) -> usize {
        self.contributors.iter().map(|c| c.locked_contributions.len()).sum()
    }

    pub fn contributor(&self, address: &AccountAddress) -> Option<&Contributor> {
        self.contributors.iter().find(|c| &c.address == address)
    }

    /// Locked contribution holding `key_image`, if any
    pub fn locked_contribution(&self, key_image: &KeyImage) -> Option<&LockedContribution> {
        self.contributors
            .iter()
            .flat_map(|c| c.locked_contributions.iter())
            .find(|locked| &locked.key_image == key_image)
    }
}

/// Key image barred from staking until `unlock_height`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyImageBlacklistEntry {
    pub key_image: KeyImage,
    pub unlock_height: u64,
}

/// A node record together with its identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNodePubkeyInfo {
    pub pubkey: PublicKey,
    pub info: ServiceNodeInfo,
}
