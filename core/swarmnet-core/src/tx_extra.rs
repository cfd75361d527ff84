//! Tagged fields carried in a transaction's extra blob
//!
//! Wire form is a flat sequence of `tag:u8 || varint(len) || payload`,
//! with payloads bincode-encoded. Unknown tags are skipped so that newer
//! fields do not break older parsers.

use serde::{Deserialize, Serialize};

use crate::crypto::{Hash, KeyImage, PublicKey, SecretKey, Signature};
use crate::errors::{CoreError, CoreResult};
use crate::transaction::AccountAddress;
use crate::varint::{read_varint, write_varint};

pub const TAG_PUBKEY: u8 = 0x01;
pub const TAG_NONCE: u8 = 0x02;
pub const TAG_SERVICE_NODE_REGISTER: u8 = 0x70;
pub const TAG_SERVICE_NODE_DEREGISTER: u8 = 0x71;
pub const TAG_SERVICE_NODE_WINNER: u8 = 0x72;
pub const TAG_SERVICE_NODE_CONTRIBUTOR: u8 = 0x73;
pub const TAG_SERVICE_NODE_PUBKEY: u8 = 0x74;
pub const TAG_TX_SECRET_KEY: u8 = 0x75;
pub const TAG_TX_KEY_IMAGE_PROOFS: u8 = 0x76;
pub const TAG_TX_KEY_IMAGE_UNLOCK: u8 = 0x77;

/// Registration parameters signed by the service node key
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceNodeRegister {
    pub public_spend_keys: Vec<PublicKey>,
    pub public_view_keys: Vec<PublicKey>,
    pub portions_for_operator: u64,
    pub portions: Vec<u64>,
    pub expiration_timestamp: u64,
    pub service_node_signature: Signature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeregisterVote {
    pub voters_quorum_index: u32,
    pub signature: Signature,
}

/// Aggregated quorum votes evicting the testee at `service_node_index`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceNodeDeregister {
    pub block_height: u64,
    pub service_node_index: u32,
    pub votes: Vec<DeregisterVote>,
}

/// Proof that the staker owns the key image of a locked output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyImageProof {
    pub key_image: KeyImage,
    pub signature: Signature,
}

/// Request to unlock the stake identified by `key_image`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyImageUnlock {
    pub key_image: KeyImage,
    pub nonce: u32,
    pub signature: Signature,
}

impl KeyImageUnlock {
    /// Message signed by an unlock request: the nonce repeated to fill a hash
    pub fn hash(nonce: u32) -> Hash {
        let mut bytes = [0u8; 32];
        for chunk in bytes.chunks_exact_mut(4) {
            chunk.copy_from_slice(&nonce.to_le_bytes());
        }
        Hash(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxExtraField {
    PubKey(PublicKey),
    Nonce(Vec<u8>),
    ServiceNodeRegister(ServiceNodeRegister),
    ServiceNodeDeregister(ServiceNodeDeregister),
    ServiceNodeWinner(PublicKey),
    ServiceNodeContributor(AccountAddress),
    ServiceNodePubkey(PublicKey),
    TxSecretKey(SecretKey),
    KeyImageProofs(Vec<KeyImageProof>),
    KeyImageUnlock(KeyImageUnlock),
}

impl TxExtraField {
    fn tag(&self) -> u8 {
        match self {
            Self::PubKey(_) => TAG_PUBKEY,
            Self::Nonce(_) => TAG_NONCE,
            Self::ServiceNodeRegister(_) => TAG_SERVICE_NODE_REGISTER,
            Self::ServiceNodeDeregister(_) => TAG_SERVICE_NODE_DEREGISTER,
            Self::ServiceNodeWinner(_) => TAG_SERVICE_NODE_WINNER,
            Self::ServiceNodeContributor(_) => TAG_SERVICE_NODE_CONTRIBUTOR,
            Self::ServiceNodePubkey(_) => TAG_SERVICE_NODE_PUBKEY,
            Self::TxSecretKey(_) => TAG_TX_SECRET_KEY,
            Self::KeyImageProofs(_) => TAG_TX_KEY_IMAGE_PROOFS,
            Self::KeyImageUnlock(_) => TAG_TX_KEY_IMAGE_UNLOCK,
        }
    }

    fn payload(&self) -> CoreResult<Vec<u8>> {
        let bytes = match self {
            Self::PubKey(key) | Self::ServiceNodeWinner(key) | Self::ServiceNodePubkey(key) => {
                bincode::serialize(key)?
            }
            Self::Nonce(nonce) => nonce.clone(),
            Self::ServiceNodeRegister(register) => bincode::serialize(register)?,
            Self::ServiceNodeDeregister(deregister) => bincode::serialize(deregister)?,
            Self::ServiceNodeContributor(address) => bincode::serialize(address)?,
            Self::TxSecretKey(key) => bincode::serialize(key)?,
            Self::KeyImageProofs(proofs) => bincode::serialize(proofs)?,
            Self::KeyImageUnlock(unlock) => bincode::serialize(unlock)?,
        };
        Ok(bytes)
    }

    fn decode(tag: u8, payload: &[u8]) -> CoreResult<Option<Self>> {
        let field = match tag {
            TAG_PUBKEY => Self::PubKey(bincode::deserialize(payload)?),
            TAG_NONCE => Self::Nonce(payload.to_vec()),
            TAG_SERVICE_NODE_REGISTER => Self::ServiceNodeRegister(bincode::deserialize(payload)?),
            TAG_SERVICE_NODE_DEREGISTER => {
                Self::ServiceNodeDeregister(bincode::deserialize(payload)?)
            }
            TAG_SERVICE_NODE_WINNER => Self::ServiceNodeWinner(bincode::deserialize(payload)?),
            TAG_SERVICE_NODE_CONTRIBUTOR => {
                Self::ServiceNodeContributor(bincode::deserialize(payload)?)
            }
            TAG_SERVICE_NODE_PUBKEY => Self::ServiceNodePubkey(bincode::deserialize(payload)?),
            TAG_TX_SECRET_KEY => Self::TxSecretKey(bincode::deserialize(payload)?),
            TAG_TX_KEY_IMAGE_PROOFS => Self::KeyImageProofs(bincode::deserialize(payload)?),
            TAG_TX_KEY_IMAGE_UNLOCK => Self::KeyImageUnlock(bincode::deserialize(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(field))
    }
}

/// Parsed tx extra
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxExtra {
    pub fields: Vec<TxExtraField>,
}

macro_rules! first_field {
    ($self:ident, $variant:ident) => {
        $self.fields.iter().find_map(|field| match field {
            TxExtraField::$variant(value) => Some(value),
            _ => None,
        })
    };
}

impl TxExtra {
    pub fn parse(bytes: &[u8]) -> CoreResult<Self> {
        let mut fields = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let tag = bytes[pos];
            pos += 1;
            let (len, used) = read_varint(&bytes[pos..])?;
            pos += used;
            let len = usize::try_from(len).map_err(|_| CoreError::TruncatedExtra(tag))?;
            let end = pos.checked_add(len).ok_or(CoreError::TruncatedExtra(tag))?;
            if end > bytes.len() {
                return Err(CoreError::TruncatedExtra(tag));
            }
            if let Some(field) = TxExtraField::decode(tag, &bytes[pos..end])? {
                fields.push(field);
            }
            pos = end;
        }
        Ok(Self { fields })
    }

    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        let mut out = Vec::new();
        for field in &self.fields {
            let payload = field.payload()?;
            out.push(field.tag());
            write_varint(&mut out, payload.len() as u64);
            out.extend_from_slice(&payload);
        }
        Ok(out)
    }

    pub fn push(&mut self, field: TxExtraField) -> &mut Self {
        self.fields.push(field);
        self
    }

    pub fn tx_pub_key(&self) -> Option<&PublicKey> {
        first_field!(self, PubKey)
    }

    pub fn service_node_register(&self) -> Option<&ServiceNodeRegister> {
        first_field!(self, ServiceNodeRegister)
    }

    pub fn service_node_deregister(&self) -> Option<&ServiceNodeDeregister> {
        first_field!(self, ServiceNodeDeregister)
    }

    pub fn service_node_winner(&self) -> Option<&PublicKey> {
        first_field!(self, ServiceNodeWinner)
    }

    pub fn service_node_contributor(&self) -> Option<&AccountAddress> {
        first_field!(self, ServiceNodeContributor)
    }

    pub fn service_node_pubkey(&self) -> Option<&PublicKey> {
        first_field!(self, ServiceNodePubkey)
    }

    pub fn tx_secret_key(&self) -> Option<&SecretKey> {
        first_field!(self, TxSecretKey)
    }

    pub fn key_image_proofs(&self) -> Option<&Vec<KeyImageProof>> {
        first_field!(self, KeyImageProofs)
    }

    pub fn key_image_unlock(&self) -> Option<&KeyImageUnlock> {
        first_field!(self, KeyImageUnlock)
    }
}
