//! Schnorr signatures and key image proofs

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;

use super::derivation::hash_to_point;
use super::{decompress, hash_to_scalar, random_scalar, Hash, KeyImage, PublicKey, SecretKey, Signature};

fn canonical(bytes: [u8; 32]) -> Option<Scalar> {
    Option::from(Scalar::from_canonical_bytes(bytes))
}

fn challenge(prefix_hash: &Hash, public: &PublicKey, commitment: &EdwardsPoint) -> Scalar {
    let mut buf = [0u8; 96];
    buf[..32].copy_from_slice(&prefix_hash.0);
    buf[32..64].copy_from_slice(&public.0);
    buf[64..].copy_from_slice(commitment.compress().as_bytes());
    hash_to_scalar(&buf)
}

/// Sign `prefix_hash` with `sec`, whose public key is `public`
pub fn generate_signature(prefix_hash: &Hash, public: &PublicKey, sec: &SecretKey) -> Option<Signature> {
    let x = sec.to_scalar()?;
    let k = random_scalar();
    let c = challenge(prefix_hash, public, &EdwardsPoint::mul_base(&k));
    let r = k - c * x;
    Some(Signature { c: c.to_bytes(), r: r.to_bytes() })
}

/// Verify a signature produced by [`generate_signature`]
pub fn check_signature(prefix_hash: &Hash, public: &PublicKey, sig: &Signature) -> bool {
    let Some(point) = decompress(public) else {
        return false;
    };
    let (Some(c), Some(r)) = (canonical(sig.c), canonical(sig.r)) else {
        return false;
    };
    let commitment = EdwardsPoint::vartime_double_scalar_mul_basepoint(&c, &point, &r);
    if commitment.is_identity() {
        return false;
    }
    challenge(prefix_hash, public, &commitment) == c
}

fn key_image_challenge(image: &KeyImage, public: &PublicKey, left: &EdwardsPoint, right: &EdwardsPoint) -> Scalar {
    let mut buf = [0u8; 128];
    buf[..32].copy_from_slice(&image.0);
    buf[32..64].copy_from_slice(&public.0);
    buf[64..96].copy_from_slice(left.compress().as_bytes());
    buf[96..].copy_from_slice(right.compress().as_bytes());
    hash_to_scalar(&buf)
}

/// Prove that `image` was generated from the secret behind `public`
pub fn generate_key_image_signature(image: &KeyImage, public: &PublicKey, sec: &SecretKey) -> Option<Signature> {
    let x = sec.to_scalar()?;
    let hp = hash_to_point(&public.0);
    let k = random_scalar();
    let c = key_image_challenge(image, public, &EdwardsPoint::mul_base(&k), &(hp * k));
    let r = k - c * x;
    Some(Signature { c: c.to_bytes(), r: r.to_bytes() })
}

/// Verify a proof produced by [`generate_key_image_signature`]
pub fn check_key_image_signature(image: &KeyImage, public: &PublicKey, sig: &Signature) -> bool {
    let Some(point) = decompress(public) else {
        return false;
    };
    let Some(image_point) = CompressedEdwardsY(image.0).decompress() else {
        return false;
    };
    if image_point.is_identity() || !image_point.is_torsion_free() {
        return false;
    }
    let (Some(c), Some(r)) = (canonical(sig.c), canonical(sig.r)) else {
        return false;
    };
    let hp = hash_to_point(&public.0);
    let left = EdwardsPoint::vartime_double_scalar_mul_basepoint(&c, &point, &r);
    let right = image_point * c + hp * r;
    key_image_challenge(image, public, &left, &right) == c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{fast_hash, generate_key_image, generate_keys};

    #[test]
    fn test_signature_verifies() {
        let (public, secret) = generate_keys();
        let hash = fast_hash(b"uptime");
        let sig = generate_signature(&hash, &public, &secret).unwrap();
        assert!(check_signature(&hash, &public, &sig));
    }

    #[test]
    fn test_signature_rejects_other_message_and_key() {
        let (public, secret) = generate_keys();
        let (other, _) = generate_keys();
        let sig = generate_signature(&fast_hash(b"a"), &public, &secret).unwrap();
        assert!(!check_signature(&fast_hash(b"b"), &public, &sig));
        assert!(!check_signature(&fast_hash(b"a"), &other, &sig));
        assert!(!check_signature(&fast_hash(b"a"), &public, &Signature::default()));
    }

    #[test]
    fn test_key_image_signature() {
        let (public, secret) = generate_keys();
        let image = generate_key_image(&public, &secret).unwrap();
        let sig = generate_key_image_signature(&image, &public, &secret).unwrap();
        assert!(check_key_image_signature(&image, &public, &sig));

        // A key image from a different secret cannot be proven for this key
        let (_, wrong_secret) = generate_keys();
        let forged = generate_key_image(&public, &wrong_secret).unwrap();
        let forged_sig = generate_key_image_signature(&forged, &public, &wrong_secret).unwrap();
        assert!(!check_key_image_signature(&forged, &public, &forged_sig));
    }
}
