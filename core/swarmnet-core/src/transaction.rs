//! Transaction and block model as seen by the service node layer
//!
//! Only the fields the registry reads are modelled. Ring signatures and
//! range proofs are verified by the ledger before a block reaches us.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::crypto::rct::RctSignatures;
use crate::crypto::{fast_hash, Hash, KeyImage, PublicKey};
use crate::errors::{CoreError, CoreResult};
use crate::tx_extra::TxExtra;

/// Kind of transaction, introduced at the service node fork
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TxType {
    #[default]
    Standard,
    Deregister,
    KeyImageUnlock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxIn {
    /// Coinbase input carrying the block height
    Gen { height: u64 },
    ToKey {
        amount: u64,
        key_offsets: Vec<u64>,
        key_image: KeyImage,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub amount: u64,
    pub key: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u16,
    pub tx_type: TxType,
    pub unlock_time: u64,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    /// Raw tx extra, see [`TxExtra`]
    pub extra: Vec<u8>,
    pub rct: RctSignatures,
}

impl Transaction {
    pub fn hash(&self) -> Hash {
        match bincode::serialize(self) {
            Ok(bytes) => fast_hash(&bytes),
            Err(_) => Hash::null(),
        }
    }

    /// Parse the extra field
    pub fn parse_extra(&self) -> CoreResult<TxExtra> {
        TxExtra::parse(&self.extra)
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self.inputs.as_slice(), [TxIn::Gen { .. }])
    }

    /// Key images spent by this transaction
    pub fn key_images(&self) -> impl Iterator<Item = &KeyImage> {
        self.inputs.iter().filter_map(|input| match input {
            TxIn::ToKey { key_image, .. } => Some(key_image),
            TxIn::Gen { .. } => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockHeader {
    pub major_version: u8,
    pub minor_version: u8,
    pub timestamp: u64,
    pub prev_id: Hash,
    pub nonce: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub miner_tx: Transaction,
    pub tx_hashes: Vec<Hash>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        match bincode::serialize(self) {
            Ok(bytes) => fast_hash(&bytes),
            Err(_) => Hash::null(),
        }
    }

    /// Height from the coinbase input, `None` for a malformed miner tx
    pub fn height(&self) -> Option<u64> {
        match self.miner_tx.inputs.as_slice() {
            [TxIn::Gen { height }] => Some(*height),
            _ => None,
        }
    }
}

/// Public spend and view keys of a wallet
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct AccountAddress {
    pub spend_public_key: PublicKey,
    pub view_public_key: PublicKey,
}

impl AccountAddress {
    pub fn new(spend_public_key: PublicKey, view_public_key: PublicKey) -> Self {
        Self { spend_public_key, view_public_key }
    }

    /// Address with both keys zeroed; receives the reward when no node is due
    pub const fn null() -> Self {
        Self { spend_public_key: PublicKey::null(), view_public_key: PublicKey::null() }
    }

    pub fn is_null(&self) -> bool {
        self.spend_public_key.is_null() && self.view_public_key.is_null()
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.spend_public_key, self.view_public_key)
    }
}

impl fmt::Debug for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountAddress({})", self)
    }
}

/// Hex of the spend key followed by the view key
impl FromStr for AccountAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        if s.len() != 128 {
            return Err(CoreError::InvalidLength { expected: 128, actual: s.len() });
        }
        let (spend, view) = s.split_at(64);
        Ok(Self { spend_public_key: spend.parse()?, view_public_key: view.parse()? })
    }
}
