//! Network messages produced and consumed by the quorum cop

use serde::{Deserialize, Serialize};
use swarmnet_core::{PublicKey, Signature};

use crate::errors::ConsensusResult;
use crate::votes::Vote;

/// Signed, timestamped attestation that a service node is online
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UptimeProof {
    pub timestamp: u64,
    pub pubkey: PublicKey,
    pub snode_version_major: u16,
    pub snode_version_minor: u16,
    pub snode_version_patch: u16,
    pub signature: Signature,
}

impl UptimeProof {
    pub fn version(&self) -> [u16; 3] {
        [self.snode_version_major, self.snode_version_minor, self.snode_version_patch]
    }

    pub fn to_bytes(&self) -> ConsensusResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> ConsensusResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Deregistration votes relayed between nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDeregisterVote {
    pub votes: Vec<Vote>,
}

impl NewDeregisterVote {
    pub fn to_bytes(&self) -> ConsensusResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> ConsensusResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
