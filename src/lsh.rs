//! Banding LSH over MinHash signatures.
//!
//! A signature of `num_perm` values is cut into `bands` contiguous slices of
//! `rows` values. Two signatures become candidates when any band hashes to
//! the same bucket, which happens with probability \(1 - (1 - s^r)^b\) for
//! Jaccard similarity \(s\). Misses are expected: recall is a tuning knob,
//! not a guarantee.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::minhash::{hash_values, MinHashSignature};

/// Handle of a registered entry. Ids are handed out in registration order,
/// so ordering by id is ordering by age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub usize);

/// Band/row split of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LshParams {
    /// Number of bands.
    pub bands: usize,
    /// Signature values per band.
    pub rows: usize,
}

impl LshParams {
    /// Explicit split; `bands * rows` must fit in `num_perm`.
    pub fn new(bands: usize, rows: usize, num_perm: usize) -> Result<Self> {
        if bands == 0 || rows == 0 {
            return Err(Error::InvalidParam("bands and rows must be >= 1"));
        }
        match bands.checked_mul(rows) {
            Some(total) if total <= num_perm => Ok(Self { bands, rows }),
            _ => Err(Error::InvalidParam("bands * rows must not exceed num_perm")),
        }
    }

    /// Pick the split that best separates pairs above and below `threshold`.
    ///
    /// Minimizes the equally weighted false-positive area (below the
    /// threshold) and false-negative area (above it) of the candidate curve.
    /// Ties keep the first split found, scanning bands then rows upward.
    pub fn from_threshold(threshold: f64, num_perm: usize) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidParam("threshold must be in [0, 1]"));
        }
        if num_perm == 0 {
            return Err(Error::InvalidParam("num_perm must be >= 1"));
        }
        let mut best = Self { bands: 1, rows: 1 };
        let mut best_error = f64::INFINITY;
        for bands in 1..=num_perm {
            for rows in 1..=num_perm / bands {
                let p = Self { bands, rows };
                let false_pos = integrate(|s| p.candidate_probability(s), 0.0, threshold);
                let false_neg =
                    integrate(|s| 1.0 - p.candidate_probability(s), threshold, 1.0);
                let error = 0.5 * false_pos + 0.5 * false_neg;
                if error < best_error {
                    best_error = error;
                    best = p;
                }
            }
        }
        Ok(best)
    }

    /// Probability that two sets with Jaccard similarity `s` share a bucket.
    ///
    /// \(P(\text{candidate}) = 1 - (1 - s^r)^b\)
    pub fn candidate_probability(&self, s: f64) -> f64 {
        1.0 - (1.0 - s.powi(self.rows as i32)).powi(self.bands as i32)
    }
}

/// Composite Simpson's rule on a fixed grid.
fn integrate(f: impl Fn(f64) -> f64, a: f64, b: f64) -> f64 {
    const STEPS: usize = 64;
    if b <= a {
        return 0.0;
    }
    let h = (b - a) / STEPS as f64;
    let mut sum = f(a) + f(b);
    for i in 1..STEPS {
        let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
        sum += weight * f(a + i as f64 * h);
    }
    sum * h / 3.0
}

/// Insert-only banding index from band buckets to entries.
#[derive(Debug)]
pub struct MinHashLSH {
    params: LshParams,
    buckets: Vec<HashMap<u64, Vec<EntryId>>>,
    len: usize,
}

impl MinHashLSH {
    /// Create an index for signatures of length `num_perm`.
    pub fn new(num_perm: usize, params: LshParams) -> Result<Self> {
        let params = LshParams::new(params.bands, params.rows, num_perm)?;
        Ok(Self {
            params,
            buckets: (0..params.bands).map(|_| HashMap::new()).collect(),
            len: 0,
        })
    }

    /// Create an index tuned for `threshold` (see [`LshParams::from_threshold`]).
    pub fn with_threshold(num_perm: usize, threshold: f64) -> Result<Self> {
        Self::new(num_perm, LshParams::from_threshold(threshold, num_perm)?)
    }

    /// Add `entry` to the bucket of every band of `signature`. O(bands).
    ///
    /// A signature shorter than `bands * rows` only fills the bands it covers.
    pub fn insert(&mut self, entry: EntryId, signature: &MinHashSignature) {
        for (band_idx, band_hash) in self.band_hashes(signature).enumerate() {
            self.buckets[band_idx]
                .entry(band_hash)
                .or_default()
                .push(entry);
        }
        self.len += 1;
    }

    /// Entries sharing at least one band bucket with `signature`, oldest first.
    pub fn query(&self, signature: &MinHashSignature) -> Vec<EntryId> {
        let mut candidates: HashSet<EntryId> = HashSet::new();
        for (band_idx, band_hash) in self.band_hashes(signature).enumerate() {
            if let Some(entries) = self.buckets[band_idx].get(&band_hash) {
                candidates.extend(entries.iter().copied());
            }
        }
        let mut v: Vec<EntryId> = candidates.into_iter().collect();
        v.sort_unstable();
        v
    }

    /// Band/row split in use.
    pub fn params(&self) -> LshParams {
        self.params
    }

    /// Number of distinct buckets in the first band.
    pub fn bucket_count(&self) -> usize {
        self.buckets.first().map_or(0, HashMap::len)
    }

    /// Number of inserted signatures.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if nothing was inserted.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn band_hashes<'a>(&self, signature: &'a MinHashSignature) -> impl Iterator<Item = u64> + 'a {
        signature
            .values
            .chunks_exact(self.params.rows)
            .take(self.params.bands)
            .map(hash_values)
    }
}
