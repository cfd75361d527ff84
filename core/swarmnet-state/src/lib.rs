//! Service node registry for swarmnet
//!
//! Tracks which service nodes are registered, how their stake is funded and
//! when it unlocks, assigns them to storage swarms and records the testing
//! quorum for every height. The ledger drives it through the hooks in
//! `swarmnet_core::hooks`; reorgs are undone from a bounded rollback log.

pub mod config;
pub mod contribution;
pub mod errors;
pub mod ledger;
pub mod metrics;
pub mod persistence;
pub mod quorum;
pub mod registry;
pub mod rollback;
pub mod rules;
pub mod service_node_info;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::RegistryConfig;
pub use contribution::{get_contribution, ParsedContribution};
pub use errors::{RejectReason, RejectResult, StateError, StateResult};
pub use ledger::Blockchain;
pub use persistence::{FileStore, MemoryStore, RegistrySnapshot, ServiceNodeStore, STORE_VERSION};
pub use quorum::QuorumState;
pub use registry::{KeyImageLock, ServiceNodeList};
pub use rollback::RollbackEvent;
pub use rules::{
    check_service_node_portions, convert_registration_args, get_min_node_contribution,
    get_min_node_contribution_in_portions, get_portions_to_make_amount, get_registration_hash,
    locked_key_image_unlock_height, portions_to_amount, RegistrationArgs,
};
pub use service_node_info::{
    Contributor, KeyImageBlacklistEntry, LockedContribution, NodeVersion, ServiceNodeInfo,
    ServiceNodePubkeyInfo,
};

/// Re-export commonly used items
pub mod prelude {
    pub use crate::{
        Blockchain, QuorumState, RegistryConfig, ServiceNodeInfo, ServiceNodeList,
        ServiceNodeStore, StateError, StateResult,
    };
}
