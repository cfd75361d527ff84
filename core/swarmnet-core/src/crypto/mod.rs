//! CryptoNote-style primitives over Ed25519
//!
//! Keys are compressed Edwards points, secret keys are reduced scalars and
//! the "fast hash" is Keccak-256. Everything here is consensus-critical:
//! the byte layout of every hashed buffer is fixed.

mod derivation;
pub mod rct;
mod signature;

use std::fmt;
use std::str::FromStr;

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::errors::{CoreError, CoreResult};

pub use derivation::{
    derivation_to_scalar, derive_public_key, derive_secret_key, generate_key_derivation,
    generate_key_image, hash_to_point,
};
pub use signature::{
    check_key_image_signature, check_signature, generate_key_image_signature, generate_signature,
};

macro_rules! bytes32_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// All-zero value
            pub const fn null() -> Self {
                Self([0u8; 32])
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn is_null(&self) -> bool {
                self.0 == [0u8; 32]
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> CoreResult<Self> {
                let bytes = hex::decode(s)?;
                let bytes: [u8; 32] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| CoreError::InvalidLength { expected: 32, actual: bytes.len() })?;
                Ok(Self(bytes))
            }
        }
    };
}

bytes32_type!(
    /// Keccak-256 digest
    Hash
);
bytes32_type!(
    /// Compressed Ed25519 point used as an identity or one-time output key
    PublicKey
);
bytes32_type!(
    /// Spend-once identifier of an output, `x * Hp(P)`
    KeyImage
);
bytes32_type!(
    /// Shared secret `8 * r * A` between a transaction and a recipient
    KeyDerivation
);

/// Reduced scalar. Debug output is redacted.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecretKey(pub [u8; 32]);

impl SecretKey {
    /// Canonical scalar form, `None` when the bytes are not reduced mod l
    pub fn to_scalar(&self) -> Option<Scalar> {
        Option::from(Scalar::from_canonical_bytes(self.0))
    }

    pub fn from_scalar(scalar: &Scalar) -> Self {
        Self(scalar.to_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Schnorr-style signature `(c, r)`
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Signature {
    pub c: [u8; 32],
    pub r: [u8; 32],
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}{})", hex::encode(self.c), hex::encode(self.r))
    }
}

/// Keccak-256 of `data`
pub fn fast_hash(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Hash(out)
}

/// Keccak-256 of `data` reduced mod l
pub fn hash_to_scalar(data: &[u8]) -> Scalar {
    Scalar::from_bytes_mod_order(fast_hash(data).0)
}

/// Uniformly random scalar from the OS RNG
pub fn random_scalar() -> Scalar {
    let mut wide = [0u8; 64];
    rand::rngs::OsRng.fill_bytes(&mut wide);
    Scalar::from_bytes_mod_order_wide(&wide)
}

/// Decompress a public key into a curve point
pub fn decompress(key: &PublicKey) -> Option<EdwardsPoint> {
    CompressedEdwardsY(key.0).decompress()
}

/// `true` when the key is a valid curve point
pub fn check_key(key: &PublicKey) -> bool {
    decompress(key).is_some()
}

/// Fresh random keypair
pub fn generate_keys() -> (PublicKey, SecretKey) {
    let sec = random_scalar();
    (public_from_scalar(&sec), SecretKey::from_scalar(&sec))
}

/// `sec * G`
pub fn secret_key_to_public_key(sec: &SecretKey) -> CoreResult<PublicKey> {
    let scalar = sec.to_scalar().ok_or(CoreError::InvalidSecretKey)?;
    Ok(public_from_scalar(&scalar))
}

pub(crate) fn public_from_scalar(scalar: &Scalar) -> PublicKey {
    PublicKey(EdwardsPoint::mul_base(scalar).compress().to_bytes())
}

/// Keypair whose secret is the little-endian height, used to derive the
/// one-time keys of service node payouts in a block
pub fn deterministic_keypair_from_height(height: u64) -> (PublicKey, SecretKey) {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&height.to_le_bytes());
    let sec = Scalar::from_bytes_mod_order(bytes);
    (public_from_scalar(&sec), SecretKey::from_scalar(&sec))
}
