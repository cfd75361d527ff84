//! Undo log for chain reorganisations
//!
//! Every mutation of a node record or of the key image blacklist is preceded
//! by an event describing how to reverse it. Detaching blocks pops events
//! from the back and undoes them; a fence marks the oldest height the log
//! can still reach.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use swarmnet_core::PublicKey;

use crate::errors::{StateError, StateResult};
use crate::service_node_info::{KeyImageBlacklistEntry, ServiceNodeInfo};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollbackEvent {
    /// Record of `key` as it was before the change
    Change { block_height: u64, key: PublicKey, info: Box<ServiceNodeInfo> },
    /// `key` was registered
    New { block_height: u64, key: PublicKey },
    /// History before this height has been discarded
    PreventFence { block_height: u64 },
    BlacklistChange { block_height: u64, entry: KeyImageBlacklistEntry, adding: bool },
    /// `key` requested an unlock
    UnlockReset { block_height: u64, key: PublicKey },
}

impl RollbackEvent {
    pub fn block_height(&self) -> u64 {
        match self {
            Self::Change { block_height, .. }
            | Self::New { block_height, .. }
            | Self::PreventFence { block_height }
            | Self::BlacklistChange { block_height, .. }
            | Self::UnlockReset { block_height, .. } => *block_height,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Change { .. } => "change",
            Self::New { .. } => "new",
            Self::PreventFence { .. } => "prevent_fence",
            Self::BlacklistChange { .. } => "blacklist",
            Self::UnlockReset { .. } => "unlock_reset",
        }
    }

    /// Reverse this event
    pub(crate) fn undo(
        self,
        infos: &mut BTreeMap<PublicKey, ServiceNodeInfo>,
        blacklist: &mut Vec<KeyImageBlacklistEntry>,
    ) -> StateResult<()> {
        match self {
            Self::Change { key, info, .. } => {
                infos.insert(key, *info);
            }
            Self::New { key, .. } => {
                if infos.remove(&key).is_none() {
                    return Err(StateError::Corrupt(format!(
                        "rollback of new node {key} which is not registered"
                    )));
                }
            }
            Self::PreventFence { block_height } => {
                return Err(StateError::RollbackFence(block_height));
            }
            Self::BlacklistChange { entry, adding: true, .. } => {
                match blacklist.iter().position(|e| e.key_image == entry.key_image) {
                    Some(pos) => {
                        blacklist.remove(pos);
                    }
                    None => {
                        return Err(StateError::Corrupt(format!(
                            "rollback of blacklisted key image {} which is not blacklisted",
                            entry.key_image
                        )));
                    }
                }
            }
            Self::BlacklistChange { entry, adding: false, .. } => {
                insert_blacklist_entry(blacklist, entry);
            }
            Self::UnlockReset { key, .. } => match infos.get_mut(&key) {
                Some(info) => info.requested_unlock_height = None,
                None => {
                    return Err(StateError::Corrupt(format!(
                        "rollback of unlock request for {key} which is not registered"
                    )));
                }
            },
        }
        Ok(())
    }
}

/// Insert keeping the blacklist ordered by key image
pub(crate) fn insert_blacklist_entry(
    blacklist: &mut Vec<KeyImageBlacklistEntry>,
    entry: KeyImageBlacklistEntry,
) {
    let pos = blacklist.partition_point(|e| e.key_image < entry.key_image);
    blacklist.insert(pos, entry);
}
