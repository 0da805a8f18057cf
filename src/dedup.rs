//! Near-duplicate detection over a growing set of short texts.
//!
//! A [`Deduplicator`] answers "have we seen this already?" in three tiers:
//!
//! 1. exact match on the normalized text (hash set lookup),
//! 2. MinHash + LSH banding to find plausible candidates,
//! 3. token-set ratio on each candidate, oldest first; the first one at or
//!    above the fuzzy threshold is the match.
//!
//! A text that passes all three is registered and becomes matchable. Nothing
//! is ever removed. All mutable state (exact set, LSH index, per-entry
//! metadata) lives in one value and must be updated together, so concurrent
//! callers go through [`SharedDeduplicator`], which holds one lock for the
//! whole check-then-register transaction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::DedupConfig;
use crate::error::{Error, Result};
use crate::fuzzy::token_set_ratio;
use crate::lsh::{EntryId, MinHashLSH};
use crate::minhash::{MinHash, MinHashSignature};
use crate::normalize::normalize;
use crate::shingle::ShingleSet;

/// Outcome of a duplicate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// New text; it was registered as `entry`.
    Unique {
        /// The freshly registered entry.
        entry: EntryId,
    },
    /// Normalizes to the same text as `entry`.
    Exact {
        /// Entry that registered this normalized text.
        entry: EntryId,
    },
    /// Fuzzy-confirmed near duplicate of `entry`.
    Near {
        /// Matched entry.
        entry: EntryId,
        /// Token-set ratio against the matched entry.
        score: u8,
    },
}

impl Verdict {
    /// True unless the text was registered as new.
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, Verdict::Unique { .. })
    }

    /// The entry this text belongs to: itself if unique, its match otherwise.
    pub fn entry(&self) -> EntryId {
        match *self {
            Verdict::Unique { entry } | Verdict::Exact { entry } | Verdict::Near { entry, .. } => {
                entry
            }
        }
    }
}

/// Normalized text, and optionally a signature, computed ahead of a check.
///
/// Signing is the expensive part of a check. [`Prepared::new`] does it up
/// front so it can run in parallel or outside a lock; [`Prepared::unsigned`]
/// leaves it to [`Deduplicator::resolve`], which skips it entirely on an
/// exact hit.
#[derive(Debug, Clone)]
pub struct Prepared {
    normalized: String,
    signature: Option<Signed>,
}

#[derive(Debug, Clone)]
struct Signed {
    signature: MinHashSignature,
    seed: u64,
}

impl Prepared {
    /// Normalize, shingle and sign `text`.
    pub fn new(text: &str, minhash: &MinHash) -> Self {
        Self::unsigned(text).sign(minhash)
    }

    /// Normalize `text` only.
    pub fn unsigned(text: &str) -> Self {
        Self {
            normalized: normalize(text),
            signature: None,
        }
    }

    /// Sign with `minhash`, replacing a signature from any other hash family.
    pub fn sign(self, minhash: &MinHash) -> Self {
        if self.signed_by(minhash) {
            return self;
        }
        let signature = minhash.signature(&ShingleSet::from_normalized(&self.normalized));
        Self {
            signature: Some(Signed {
                signature,
                seed: minhash.seed(),
            }),
            ..self
        }
    }

    /// The normalized text.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// The signature, if signed.
    pub fn signature(&self) -> Option<&MinHashSignature> {
        self.signature.as_ref().map(|s| &s.signature)
    }

    fn signed_by(&self, minhash: &MinHash) -> bool {
        matches!(
            &self.signature,
            Some(s) if s.seed == minhash.seed() && s.signature.len() == minhash.num_perm()
        )
    }
}

#[derive(Debug)]
struct Entry {
    key: String,
    normalized: String,
    signature: MinHashSignature,
}

/// Snapshot of the index for logs and reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DedupStats {
    /// Registered entries (including empty texts).
    pub total_rules: usize,
    /// Distinct buckets in the first LSH band.
    pub lsh_buckets: usize,
    /// LSH bands.
    pub bands: usize,
    /// LSH rows per band.
    pub rows: usize,
    /// Configured MinHash threshold.
    pub minhash_threshold: f64,
    /// Configured fuzzy threshold.
    pub fuzzy_threshold: u8,
    /// Signatures built here rather than arriving with a prepared text.
    pub signatures_computed: usize,
}

/// Owner of all duplicate-detection state.
#[derive(Debug)]
pub struct Deduplicator {
    config: DedupConfig,
    minhash: MinHash,
    index: MinHashLSH,
    exact: HashMap<String, EntryId>,
    entries: Vec<Entry>,
    signatures_computed: usize,
}

impl Deduplicator {
    /// Validate `config` and build an empty deduplicator.
    pub fn new(config: DedupConfig) -> Result<Self> {
        config.validate()?;
        let minhash = MinHash::with_seed(config.num_perm, config.seed);
        let index = MinHashLSH::new(config.num_perm, config.lsh_params()?)?;
        Ok(Self {
            config,
            minhash,
            index,
            exact: HashMap::new(),
            entries: Vec::new(),
            signatures_computed: 0,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Signature generator, for preparing texts outside this value.
    pub fn minhash(&self) -> &MinHash {
        &self.minhash
    }

    /// Normalize and sign `text` with this deduplicator's hash family.
    pub fn prepare(&self, text: &str) -> Prepared {
        Prepared::new(text, &self.minhash)
    }

    /// Check `text` and register it if new.
    ///
    /// `key` names the entry if it is registered; without one the normalized
    /// text is the key. Never fails: empty text is always unique. An exact
    /// hit returns before any shingling or signing.
    pub fn is_duplicate(&mut self, text: &str, key: Option<&str>) -> Verdict {
        self.resolve(Prepared::unsigned(text), key)
    }

    /// [`Self::is_duplicate`] on a prepared text.
    ///
    /// An unsigned text, or one signed with a different hash family, is signed
    /// here once the exact lookup has missed.
    pub fn resolve(&mut self, prepared: Prepared, key: Option<&str>) -> Verdict {
        if let Some(entry) = self.exact_entry(&prepared.normalized) {
            trace!(entry = entry.0, "exact duplicate");
            return Verdict::Exact { entry };
        }

        let (normalized, signature) = self.signed(prepared);
        if !normalized.is_empty() {
            for candidate in self.index.query(&signature) {
                let known = &self.entries[candidate.0];
                let score = token_set_ratio(&normalized, &known.normalized);
                if score >= self.config.fuzzy_similarity_threshold {
                    debug!(
                        score,
                        matched = %known.key,
                        estimated_jaccard = signature.jaccard(&known.signature),
                        "near duplicate"
                    );
                    return Verdict::Near {
                        entry: candidate,
                        score,
                    };
                }
            }
        }

        let entry = self.register(normalized, signature, key);
        Verdict::Unique { entry }
    }

    /// Entry that registered `normalized`, if any. Empty text never has one.
    pub fn exact_entry(&self, normalized: &str) -> Option<EntryId> {
        self.exact.get(normalized).copied()
    }

    /// Register `text` without checking for near duplicates.
    ///
    /// For bootstrapping from a store of already deduplicated records.
    /// Returns false (and does nothing) if the normalized text is known.
    pub fn add_known_unique(&mut self, text: &str, key: Option<&str>) -> bool {
        let prepared = Prepared::unsigned(text);
        if self.exact.contains_key(&prepared.normalized) {
            return false;
        }
        let (normalized, signature) = self.signed(prepared);
        self.register(normalized, signature, key);
        true
    }

    /// [`Self::add_known_unique`] over many texts; returns how many were new.
    pub fn seed<'a>(&mut self, texts: impl IntoIterator<Item = &'a str>) -> usize {
        texts
            .into_iter()
            .filter(|text| self.add_known_unique(text, None))
            .count()
    }

    /// Key of the entry a near duplicate matched.
    ///
    /// `None` for unique texts and for exact duplicates, which are detected
    /// before any candidate is compared.
    pub fn matched_key(&self, verdict: &Verdict) -> Option<&str> {
        match verdict {
            Verdict::Near { entry, .. } => self.key(*entry),
            _ => None,
        }
    }

    /// Key of a registered entry.
    pub fn key(&self, entry: EntryId) -> Option<&str> {
        self.entries.get(entry.0).map(|e| e.key.as_str())
    }

    /// Normalized text of a registered entry.
    pub fn normalized_text(&self, entry: EntryId) -> Option<&str> {
        self.entries.get(entry.0).map(|e| e.normalized.as_str())
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counters for logs and reports.
    pub fn stats(&self) -> DedupStats {
        let params = self.index.params();
        DedupStats {
            total_rules: self.entries.len(),
            lsh_buckets: self.index.bucket_count(),
            bands: params.bands,
            rows: params.rows,
            minhash_threshold: self.config.minhash_similarity_threshold,
            fuzzy_threshold: self.config.fuzzy_similarity_threshold,
            signatures_computed: self.signatures_computed,
        }
    }

    fn signed(&mut self, prepared: Prepared) -> (String, MinHashSignature) {
        match prepared.signature {
            Some(Signed { signature, seed })
                if seed == self.minhash.seed() && signature.len() == self.minhash.num_perm() =>
            {
                (prepared.normalized, signature)
            }
            _ => {
                self.signatures_computed += 1;
                let shingles = ShingleSet::from_normalized(&prepared.normalized);
                (prepared.normalized, self.minhash.signature(&shingles))
            }
        }
    }

    // Empty texts get an entry but stay out of the exact set and the index,
    // so nothing can ever match them.
    fn register(
        &mut self,
        normalized: String,
        signature: MinHashSignature,
        key: Option<&str>,
    ) -> EntryId {
        let entry = EntryId(self.entries.len());
        if !normalized.is_empty() {
            self.index.insert(entry, &signature);
            self.exact.insert(normalized.clone(), entry);
        }
        let key = key.map_or_else(|| normalized.clone(), str::to_owned);
        trace!(entry = entry.0, key = %key, "registered");
        self.entries.push(Entry {
            key,
            normalized,
            signature,
        });
        entry
    }
}

/// Cloneable, thread-safe handle to one [`Deduplicator`].
///
/// Normalization and signing run without the lock; every check or
/// registration holds it for the whole transaction, so two threads racing on
/// similar texts cannot both register.
#[derive(Debug, Clone)]
pub struct SharedDeduplicator {
    inner: Arc<Mutex<Deduplicator>>,
    minhash: MinHash,
}

impl SharedDeduplicator {
    /// Wrap a deduplicator.
    pub fn new(dedup: Deduplicator) -> Self {
        let minhash = dedup.minhash().clone();
        Self {
            inner: Arc::new(Mutex::new(dedup)),
            minhash,
        }
    }

    /// Normalize and sign `text` without taking the lock.
    pub fn prepare(&self, text: &str) -> Prepared {
        Prepared::new(text, &self.minhash)
    }

    /// Locked [`Deduplicator::is_duplicate`].
    ///
    /// An exact hit is answered from a short lookup; otherwise the text is
    /// signed outside the lock and resolved under it. Resolution repeats the
    /// exact lookup, so a registration that lands in between is still seen.
    pub fn is_duplicate(&self, text: &str, key: Option<&str>) -> Result<Verdict> {
        let prepared = Prepared::unsigned(text);
        if let Some(entry) = self.with(|dedup| dedup.exact_entry(prepared.normalized()))? {
            return Ok(Verdict::Exact { entry });
        }
        let prepared = prepared.sign(&self.minhash);
        self.with(|dedup| dedup.resolve(prepared, key))
    }

    /// Locked [`Deduplicator::add_known_unique`].
    pub fn add_known_unique(&self, text: &str, key: Option<&str>) -> Result<bool> {
        self.with(|dedup| dedup.add_known_unique(text, key))
    }

    /// Run `f` with exclusive access, e.g. to resolve and read a key atomically.
    pub fn with<R>(&self, f: impl FnOnce(&mut Deduplicator) -> R) -> Result<R> {
        let mut guard = self.inner.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(f(&mut guard))
    }

    /// Take the deduplicator back. `Ok(None)` while other handles exist.
    pub fn into_inner(self) -> Result<Option<Deduplicator>> {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex
                .into_inner()
                .map(Some)
                .map_err(|_| Error::LockPoisoned),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dedup() -> Deduplicator {
        Deduplicator::new(DedupConfig::default()).unwrap()
    }

    #[test]
    fn exact_duplicate_via_normalization() {
        let mut d = dedup();
        let first = d.is_duplicate("Never wear a black belt with brown shoes.", None);
        assert!(!first.is_duplicate());
        let second = d.is_duplicate("never wear a black belt with brown shoes", None);
        assert_eq!(second, Verdict::Exact { entry: first.entry() });
        assert_eq!(d.matched_key(&second), None);
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn exact_hit_skips_signing() {
        let mut d = dedup();
        d.is_duplicate("Never wear a black belt with brown shoes.", None);
        assert_eq!(d.stats().signatures_computed, 1);
        let v = d.is_duplicate("never wear a black belt with brown shoes", None);
        assert!(matches!(v, Verdict::Exact { .. }));
        assert!(!d.add_known_unique("NEVER wear a black belt with brown shoes", None));
        assert_eq!(d.stats().signatures_computed, 1);
        d.is_duplicate("Roll your sleeves twice.", None);
        assert_eq!(d.stats().signatures_computed, 2);
    }

    #[test]
    fn presigned_text_is_not_signed_again() {
        let mut d = dedup();
        let prepared = d.prepare("Tuck in a dress shirt.");
        assert!(prepared.signature().is_some());
        d.resolve(prepared, None);
        assert!(Prepared::unsigned("Tuck in a dress shirt.").signature().is_none());
        assert_eq!(d.stats().signatures_computed, 0);
    }

    #[test]
    fn near_duplicate_reports_matched_key() {
        let mut d = dedup();
        d.is_duplicate("Your tie should always be darker than your shirt.", Some("rule_1"));
        let v = d.is_duplicate("Always ensure your tie is darker than your shirt.", Some("rule_2"));
        assert!(matches!(v, Verdict::Near { score: 87, .. }));
        assert_eq!(d.matched_key(&v), Some("rule_1"));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn unrelated_texts_are_both_unique() {
        let mut d = dedup();
        assert!(!d.is_duplicate("Brown shoes go well with casual outfits.", None).is_duplicate());
        assert!(!d.is_duplicate("Black shoes should be worn with dark suits.", None).is_duplicate());
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn key_defaults_to_normalized_text() {
        let mut d = dedup();
        let v = d.is_duplicate("Match your BELT to your shoes!", None);
        assert_eq!(d.key(v.entry()), Some("match your belt to your shoes"));
    }

    #[test]
    fn empty_text_is_always_unique() {
        let mut d = dedup();
        let a = d.is_duplicate("", None);
        let b = d.is_duplicate("  !!  ", None);
        assert!(!a.is_duplicate() && !b.is_duplicate());
        assert_ne!(a.entry(), b.entry());
        assert_eq!(d.stats().lsh_buckets, 0);
    }

    #[test]
    fn add_known_unique_then_exact_hit() {
        let mut d = dedup();
        assert!(d.add_known_unique("Hem trousers to a slight break.", Some("store:9")));
        assert!(!d.add_known_unique("hem trousers to a slight break", None));
        let v = d.is_duplicate("Hem trousers to a slight break!", None);
        assert!(matches!(v, Verdict::Exact { .. }));
        assert_eq!(d.key(v.entry()), Some("store:9"));
    }

    #[test]
    fn seeding_counts_new_texts() {
        let mut d = dedup();
        let n = d.seed(["Wear a belt.", "wear a belt", "Roll your sleeves twice."]);
        assert_eq!(n, 2);
        assert_eq!(d.stats().total_rules, 2);
    }

    #[test]
    fn earliest_candidate_wins() {
        let mut d = dedup();
        d.add_known_unique("always match your belt to your shoes", Some("old"));
        d.add_known_unique("always match your belt to your shoes and watch", Some("new"));
        let v = d.is_duplicate("always match your belt to your shoes please", None);
        assert!(matches!(v, Verdict::Near { score: 100, .. }));
        assert_eq!(d.matched_key(&v), Some("old"));
    }

    #[test]
    fn foreign_prepared_text_is_resigned() {
        let mut d = dedup();
        d.is_duplicate("Your belt should match your shoes.", None);
        let other = MinHash::with_seed(64, 7);
        let v = d.resolve(Prepared::new("Your belt should match your shoes!", &other), None);
        assert!(matches!(v, Verdict::Exact { .. }));
        let v = d.resolve(Prepared::new("Your belt should always match your shoes", &other), None);
        assert!(v.is_duplicate());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = DedupConfig {
            fuzzy_similarity_threshold: 150,
            ..DedupConfig::default()
        };
        assert!(Deduplicator::new(config).is_err());
    }

    #[test]
    fn shared_handle_serializes_registration() {
        let shared = SharedDeduplicator::new(dedup());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    shared
                        .is_duplicate("Button the top button of a suit jacket.", None)
                        .unwrap()
                })
            })
            .collect();
        let uniques = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|v| !v.is_duplicate())
            .count();
        assert_eq!(uniques, 1);
        let d = shared.into_inner().unwrap().unwrap();
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn into_inner_waits_for_the_last_handle() {
        let shared = SharedDeduplicator::new(dedup());
        let other = shared.clone();
        assert!(shared.into_inner().unwrap().is_none());
        assert!(other.into_inner().unwrap().is_some());
    }

    #[test]
    fn poisoned_lock_is_an_error() {
        let shared = SharedDeduplicator::new(dedup());
        let worker = shared.clone();
        let joined = std::thread::spawn(move || {
            let _ = worker.with(|_| panic!("worker died mid-transaction"));
        })
        .join();
        assert!(joined.is_err());
        assert!(matches!(shared.is_duplicate("Wear a belt.", None), Err(Error::LockPoisoned)));
        assert!(matches!(shared.into_inner(), Err(Error::LockPoisoned)));
    }

    proptest! {
        #[test]
        fn respelled_text_is_always_exact(
            words in prop::collection::vec("[a-z]{1,8}", 1..8),
            trailing in "[.!?]{0,3}",
        ) {
            let x = format!("{}{trailing}", words.join(" "));
            let y = format!(
                "  {}  !! https://example.com/{}",
                words.join("  ").to_uppercase(),
                words[0]
            );
            prop_assert_eq!(normalize(&y), normalize(&x));

            let mut d = dedup();
            let first = d.is_duplicate(&x, None);
            prop_assert!(!first.is_duplicate());
            prop_assert_eq!(d.is_duplicate(&y, None), Verdict::Exact { entry: first.entry() });
        }
    }
}
