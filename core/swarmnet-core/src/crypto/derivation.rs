//! Key derivations, one-time output keys and key images

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;

use super::{decompress, fast_hash, hash_to_scalar, KeyDerivation, KeyImage, PublicKey, SecretKey};
use crate::varint::write_varint;

/// `8 * sec * key`
pub fn generate_key_derivation(key: &PublicKey, sec: &SecretKey) -> Option<KeyDerivation> {
    let point = decompress(key)?;
    let scalar = sec.to_scalar()?;
    Some(KeyDerivation((point * scalar).mul_by_cofactor().compress().to_bytes()))
}

/// `Hs(derivation || varint(output_index))`
pub fn derivation_to_scalar(derivation: &KeyDerivation, output_index: usize) -> Scalar {
    let mut buf = Vec::with_capacity(32 + 10);
    buf.extend_from_slice(&derivation.0);
    write_varint(&mut buf, output_index as u64);
    hash_to_scalar(&buf)
}

/// One-time output key `Hs(D || i) * G + base`
pub fn derive_public_key(
    derivation: &KeyDerivation,
    output_index: usize,
    base: &PublicKey,
) -> Option<PublicKey> {
    let base = decompress(base)?;
    let scalar = derivation_to_scalar(derivation, output_index);
    Some(PublicKey((EdwardsPoint::mul_base(&scalar) + base).compress().to_bytes()))
}

/// One-time output secret `Hs(D || i) + base`
pub fn derive_secret_key(
    derivation: &KeyDerivation,
    output_index: usize,
    base: &SecretKey,
) -> Option<SecretKey> {
    let base = base.to_scalar()?;
    let scalar = derivation_to_scalar(derivation, output_index);
    Some(SecretKey::from_scalar(&(scalar + base)))
}

/// Map bytes into the prime-order subgroup by try-and-increment over
/// Keccak-256, clearing the cofactor of the first decodable candidate
pub fn hash_to_point(data: &[u8]) -> EdwardsPoint {
    let mut buf = Vec::with_capacity(data.len() + 4);
    let mut counter: u32 = 0;
    loop {
        buf.clear();
        buf.extend_from_slice(data);
        buf.extend_from_slice(&counter.to_le_bytes());
        let candidate = fast_hash(&buf);
        if let Some(point) = CompressedEdwardsY(candidate.0).decompress() {
            let point = point.mul_by_cofactor();
            if !point.is_identity() {
                return point;
            }
        }
        counter = counter.wrapping_add(1);
    }
}

/// `sec * Hp(public)`
pub fn generate_key_image(public: &PublicKey, sec: &SecretKey) -> Option<KeyImage> {
    let scalar = sec.to_scalar()?;
    let point = hash_to_point(&public.0) * scalar;
    Some(KeyImage(point.compress().to_bytes()))
}
