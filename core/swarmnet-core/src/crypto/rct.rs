//! Confidential output amounts
//!
//! Every output carries a Pedersen commitment `mask * G + amount * H` and an
//! 8-byte ECDH-masked amount. A recipient holding the shared scalar
//! `Hs(D || i)` recovers the amount and checks it against the commitment.

use curve25519_dalek::constants::ED25519_BASEPOINT_COMPRESSED;
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::derivation::hash_to_point;
use super::{fast_hash, hash_to_scalar};

/// Second commitment generator, independent of G
static H: Lazy<EdwardsPoint> = Lazy::new(|| hash_to_point(ED25519_BASEPOINT_COMPRESSED.as_bytes()));

/// Per-output commitments and encrypted amounts, index-aligned with `outputs`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RctSignatures {
    pub out_commitments: Vec<[u8; 32]>,
    pub ecdh_amounts: Vec<[u8; 8]>,
}

/// Blinding factor for an output, derived from its shared scalar
pub fn commitment_mask(shared: &Scalar) -> Scalar {
    let mut buf = Vec::with_capacity(15 + 32);
    buf.extend_from_slice(b"commitment_mask");
    buf.extend_from_slice(shared.as_bytes());
    hash_to_scalar(&buf)
}

fn amount_pad(shared: &Scalar) -> [u8; 8] {
    let mut buf = Vec::with_capacity(6 + 32);
    buf.extend_from_slice(b"amount");
    buf.extend_from_slice(shared.as_bytes());
    let digest = fast_hash(&buf);
    let mut pad = [0u8; 8];
    pad.copy_from_slice(&digest.0[..8]);
    pad
}

/// `mask * G + amount * H`
pub fn commit(amount: u64, mask: &Scalar) -> [u8; 32] {
    (EdwardsPoint::mul_base(mask) + *H * Scalar::from(amount)).compress().to_bytes()
}

pub fn ecdh_encode(amount: u64, shared: &Scalar) -> [u8; 8] {
    let pad = amount_pad(shared);
    let mut out = amount.to_le_bytes();
    out.iter_mut().zip(pad.iter()).for_each(|(b, p)| *b ^= p);
    out
}

/// Commitment and masked amount for a new output
pub fn encode_output(amount: u64, shared: &Scalar) -> ([u8; 32], [u8; 8]) {
    (commit(amount, &commitment_mask(shared)), ecdh_encode(amount, shared))
}

impl RctSignatures {
    /// Recover the amount of output `index`, `None` when it is missing or
    /// does not open its commitment
    pub fn decode_amount(&self, index: usize, shared: &Scalar) -> Option<u64> {
        let masked = self.ecdh_amounts.get(index)?;
        let commitment = self.out_commitments.get(index)?;
        let pad = amount_pad(shared);
        let mut bytes = *masked;
        bytes.iter_mut().zip(pad.iter()).for_each(|(b, p)| *b ^= p);
        let amount = u64::from_le_bytes(bytes);
        (commit(amount, &commitment_mask(shared)) == *commitment).then_some(amount)
    }

    pub fn push_output(&mut self, amount: u64, shared: &Scalar) {
        let (commitment, masked) = encode_output(amount, shared);
        self.out_commitments.push(commitment);
        self.ecdh_amounts.push(masked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::random_scalar;

    #[test]
    fn test_decode_with_right_and_wrong_secret() {
        let shared = random_scalar();
        let mut rct = RctSignatures::default();
        rct.push_output(42_000_000_000, &shared);

        assert_eq!(rct.decode_amount(0, &shared), Some(42_000_000_000));
        assert_eq!(rct.decode_amount(0, &random_scalar()), None);
        assert_eq!(rct.decode_amount(1, &shared), None);
    }
}
