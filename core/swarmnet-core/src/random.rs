//! Deterministic randomness shared by every node
//!
//! Quorum selection and swarm assignment must be reproduced bit-for-bit by
//! every participant, so they run on a portable 64-bit Mersenne Twister
//! seeded from the block hash rather than on a platform RNG.

use crate::crypto::Hash;

const NN: usize = 312;
const MM: usize = 156;
const MATRIX_A: u64 = 0xB502_6F5A_A966_19E9;
const UPPER_MASK: u64 = 0xFFFF_FFFF_8000_0000;
const LOWER_MASK: u64 = 0x7FFF_FFFF;

/// MT19937-64
#[derive(Clone)]
pub struct Mt64 {
    state: [u64; NN],
    index: usize,
}

impl Mt64 {
    pub fn new(seed: u64) -> Self {
        let mut state = [0u64; NN];
        state[0] = seed;
        for i in 1..NN {
            let prev = state[i - 1];
            state[i] = 6_364_136_223_846_793_005u64
                .wrapping_mul(prev ^ (prev >> 62))
                .wrapping_add(i as u64);
        }
        Self { state, index: NN }
    }

    fn twist(&mut self) {
        for i in 0..NN {
            let x = (self.state[i] & UPPER_MASK) | (self.state[(i + 1) % NN] & LOWER_MASK);
            let mut next = x >> 1;
            if x & 1 != 0 {
                next ^= MATRIX_A;
            }
            self.state[i] = self.state[(i + MM) % NN] ^ next;
        }
        self.index = 0;
    }

    pub fn next_u64(&mut self) -> u64 {
        if self.index >= NN {
            self.twist();
        }
        let mut x = self.state[self.index];
        self.index += 1;

        x ^= (x >> 29) & 0x5555_5555_5555_5555;
        x ^= (x << 17) & 0x71D6_7FFF_EDA6_0000;
        x ^= (x << 37) & 0xFFF7_EEE0_0000_0000;
        x ^= x >> 43;
        x
    }
}

impl std::fmt::Debug for Mt64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mt64").field("index", &self.index).finish()
    }
}

/// Uniform value in `[0, n)` without modulo bias. Returns 0 for `n == 0`.
pub fn uniform_distribution_portable(mt: &mut Mt64, n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let secure_max = u64::MAX - u64::MAX % n;
    let mut x;
    loop {
        x = mt.next_u64();
        if x < secure_max {
            break;
        }
    }
    x / (secure_max / n)
}

/// Fisher-Yates shuffle driven by an existing generator
pub fn shuffle_with<T>(items: &mut [T], mt: &mut Mt64) {
    for i in 1..items.len() {
        let j = uniform_distribution_portable(mt, (i + 1) as u64) as usize;
        items.swap(i, j);
    }
}

/// Fisher-Yates shuffle seeded with `seed`
pub fn shuffle<T>(items: &mut [T], seed: u64) {
    let mut mt = Mt64::new(seed);
    shuffle_with(items, &mut mt);
}

/// First eight bytes of a block hash, little-endian
pub fn seed_from_hash(hash: &Hash) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.0[..8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_output() {
        // 10000th output of the reference MT19937-64 with its default seed
        let mut mt = Mt64::new(5489);
        let mut last = 0;
        for _ in 0..10_000 {
            last = mt.next_u64();
        }
        assert_eq!(last, 9_981_545_732_273_789_042);
    }

    #[test]
    fn test_uniform_stays_in_range() {
        let mut mt = Mt64::new(7);
        for n in [1u64, 2, 3, 10, 1_000, u64::MAX] {
            for _ in 0..100 {
                assert!(uniform_distribution_portable(&mut mt, n) < n);
            }
        }
        assert_eq!(uniform_distribution_portable(&mut mt, 0), 0);
    }

    #[test]
    fn test_shuffle_is_deterministic_permutation() {
        let mut a: Vec<u32> = (0..100).collect();
        let mut b = a.clone();
        shuffle(&mut a, 0xDEAD_BEEF);
        shuffle(&mut b, 0xDEAD_BEEF);
        assert_eq!(a, b);

        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..100).collect::<Vec<_>>());
        assert_ne!(a, sorted);
    }

    #[test]
    fn test_seed_from_hash_little_endian() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x01;
        bytes[7] = 0x80;
        assert_eq!(seed_from_hash(&Hash(bytes)), 0x8000_0000_0000_0001);
    }
}
