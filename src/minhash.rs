//! MinHash signatures for Jaccard similarity estimation.
//!
//! MinHash approximates \(J(A,B) = |A ∩ B| / |A ∪ B|\) by the fraction of hash
//! families whose minimum agrees on both sets.
//!
//! Every hash here is stable: the same shingles, `num_perm` and seed give the
//! same signature in every process, which keeps LSH bucketing reproducible.

use std::hash::Hasher;

use crate::shingle::ShingleSet;

/// Default seed for the hash-family table.
pub const DEFAULT_SEED: u64 = 42;

/// Stable 64-bit FNV-1a. `DefaultHasher` output may change between Rust
/// releases; signatures and band keys must not.
pub(crate) struct Fnv1a64 {
    state: u64,
}

impl Fnv1a64 {
    pub(crate) fn new() -> Self {
        // FNV offset basis
        Self {
            state: 0xcbf29ce484222325,
        }
    }
}

impl Hasher for Fnv1a64 {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        // FNV-1a
        const PRIME: u64 = 0x00000100000001B3;
        for &b in bytes {
            self.state ^= b as u64;
            self.state = self.state.wrapping_mul(PRIME);
        }
    }
}

/// splitmix64 finalizer. FNV's low bits are weak on short keys.
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// Stable hash of a slice of signature values (used for LSH band keys).
pub(crate) fn hash_values(values: &[u64]) -> u64 {
    let mut hasher = Fnv1a64::new();
    for v in values {
        hasher.write(&v.to_le_bytes());
    }
    mix64(hasher.finish())
}

/// MinHash signature generator.
#[derive(Debug, Clone)]
pub struct MinHash {
    /// Number of hash functions (signature length).
    num_perm: usize,
    /// Seed the table was derived from.
    seed: u64,
    /// Seeds for hash functions.
    seeds: Vec<u64>,
}

impl MinHash {
    /// Create a new MinHash with `num_perm` hash functions, using [`DEFAULT_SEED`].
    pub fn new(num_perm: usize) -> Self {
        Self::with_seed(num_perm, DEFAULT_SEED)
    }

    /// Create MinHash with a specific seed (deterministic).
    pub fn with_seed(num_perm: usize, seed: u64) -> Self {
        let mut seeds = Vec::with_capacity(num_perm);
        let mut rng_state = seed;
        for _ in 0..num_perm {
            // Simple LCG for seed generation (deterministic, cheap).
            rng_state = rng_state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            seeds.push(rng_state);
        }
        Self {
            num_perm,
            seed,
            seeds,
        }
    }

    /// Compute the signature of a shingle set.
    ///
    /// An empty set yields `u64::MAX` in every slot.
    pub fn signature(&self, shingles: &ShingleSet) -> MinHashSignature {
        let mut mins = vec![u64::MAX; self.num_perm];
        for shingle in shingles.iter() {
            for (slot, &seed) in mins.iter_mut().zip(&self.seeds) {
                let h = hash_with_seed(shingle, seed);
                if h < *slot {
                    *slot = h;
                }
            }
        }
        MinHashSignature { values: mins }
    }

    /// Number of hash functions.
    pub fn num_perm(&self) -> usize {
        self.num_perm
    }

    /// Seed the hash-family table was derived from.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

fn hash_with_seed(shingle: &str, seed: u64) -> u64 {
    let mut hasher = Fnv1a64::new();
    hasher.write(&seed.to_le_bytes());
    hasher.write(shingle.as_bytes());
    mix64(hasher.finish())
}

/// A MinHash signature (fingerprint) of a shingle set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinHashSignature {
    /// The min-hash values for each hash function.
    pub values: Vec<u64>,
}

impl MinHashSignature {
    /// Estimate Jaccard similarity from two signatures.
    pub fn jaccard(&self, other: &Self) -> f64 {
        if self.values.len() != other.values.len() || self.values.is_empty() {
            return 0.0;
        }
        let matches = self
            .values
            .iter()
            .zip(other.values.iter())
            .filter(|(a, b)| a == b)
            .count();
        matches as f64 / self.values.len() as f64
    }

    /// Signature length.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for a zero-length signature.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use proptest::prelude::*;

    fn sig(mh: &MinHash, text: &str) -> MinHashSignature {
        mh.signature(&ShingleSet::from_normalized(&normalize(text)))
    }

    #[test]
    fn empty_set_is_all_sentinel() {
        let s = MinHash::new(16).signature(&ShingleSet::default());
        assert_eq!(s.values, vec![u64::MAX; 16]);
    }

    #[test]
    fn identical_sets_have_jaccard_one() {
        let mh = MinHash::new(128);
        let a = sig(&mh, "Your belt should match your shoes.");
        let b = sig(&mh, "your belt should match your shoes");
        assert_eq!(a, b);
        assert!((a.jaccard(&b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn seed_table_is_fixed() {
        let a = MinHash::with_seed(4, 7);
        let b = MinHash::with_seed(4, 7);
        assert_eq!(a.seeds, b.seeds);
        assert_ne!(a.seeds, MinHash::with_seed(4, 8).seeds);
    }

    #[test]
    fn estimate_tracks_overlap() {
        let mh = MinHash::new(256);
        let base = "always match the metal of your belt buckle to your watch";
        let near = sig(&mh, &format!("{base} strap"));
        let far = sig(&mh, "linen suits wrinkle so pack them rolled not folded");
        let b = sig(&mh, base);
        assert!(b.jaccard(&near) > 0.6);
        assert!(b.jaccard(&far) < 0.2);
    }

    proptest! {
        #[test]
        fn deterministic(text in "[a-z ]{0,80}") {
            let shingles = ShingleSet::from_normalized(&normalize(&text));
            let first = MinHash::new(128).signature(&shingles);
            let second = MinHash::new(128).signature(&shingles);
            prop_assert_eq!(first.len(), 128);
            prop_assert_eq!(first, second);
        }
    }
}
