//! Core primitives for the swarmnet service node layer
//!
//! This crate holds everything the registry and the quorum machinery share:
//! CryptoNote-style keys and signatures, output decoding, the consensus
//! random number generator, the transaction/block model, the tx extra codec,
//! network constants and the hook surface the ledger drives.

pub mod config;
pub mod constants;
pub mod crypto;
pub mod errors;
pub mod hooks;
pub mod random;
pub mod transaction;
pub mod tx_extra;
pub mod varint;

pub use config::{HardForkSchedule, Network, NetworkConfig};
pub use crypto::{
    fast_hash, Hash, KeyDerivation, KeyImage, PublicKey, SecretKey, Signature,
};
pub use errors::{CoreError, CoreResult};
pub use hooks::{
    get_portion_of_reward, BlockAddedHook, BlockRewardParts, BlockchainDetachedHook, InitHook,
    ValidateMinerTxHook,
};
pub use random::{seed_from_hash, shuffle, shuffle_with, uniform_distribution_portable, Mt64};
pub use transaction::{AccountAddress, Block, BlockHeader, Transaction, TxIn, TxOut, TxType};
pub use tx_extra::{
    DeregisterVote, KeyImageProof, KeyImageUnlock, ServiceNodeDeregister, ServiceNodeRegister,
    TxExtra, TxExtraField,
};

/// Re-export commonly used items
pub mod prelude {
    pub use crate::{
        AccountAddress, Amount, Block, Hash, Height, KeyImage, PublicKey, SecretKey, Signature,
        SwarmId, Transaction, TxExtra, TxExtraField, TxType,
    };
}

/// Height of a block in the chain
pub type Height = u64;

/// Identifier of a swarm
pub type SwarmId = u64;

/// Atomic currency amount
pub type Amount = u64;
