//! `rulesketch`: near-duplicate detection and distillation for short rule texts.
//!
//! Extracted advice sentences ("rules") repeat across sources with small
//! wording changes. This crate collapses them:
//! - [`normalize`] and [`ShingleSet`] turn text into comparable token sets
//! - [`MinHash`] and [`MinHashLSH`] find plausible candidates in sublinear time
//! - [`token_set_ratio`] confirms candidates
//! - [`Deduplicator`] combines the three behind one stateful check
//! - [`Distiller`] groups a batch into families with merged provenance
//!
//! Matching is purely lexical. Meaning-level paraphrase detection is out of
//! scope, and LSH recall is probabilistic: similar pairs whose signatures
//! share no band are missed.
//!
//! ```
//! use rulesketch::{DedupConfig, Deduplicator};
//!
//! let mut dedup = Deduplicator::new(DedupConfig::default())?;
//! assert!(!dedup.is_duplicate("Never wear a black belt with brown shoes.", None).is_duplicate());
//! assert!(dedup.is_duplicate("never wear a black belt with brown shoes", None).is_duplicate());
//! # Ok::<(), rulesketch::Error>(())
//! ```

#![warn(missing_docs)]

pub mod classify;
pub mod config;
pub mod dedup;
pub mod distill;
pub mod error;
pub mod fuzzy;
pub mod io;
pub mod lsh;
pub mod minhash;
pub mod normalize;
pub mod record;
pub mod shingle;

pub use classify::{AcceptAll, ClassifierStrategy, KeywordHeuristic, PrototypeOverlap, RuleClassifier};
pub use config::{DedupConfig, DistillConfig, RulesketchConfig};
pub use dedup::{DedupStats, Deduplicator, Prepared, SharedDeduplicator, Verdict};
pub use distill::{dedup_records, DedupOutcome, Distiller};
pub use error::{Error, RecordError, Result};
pub use fuzzy::token_set_ratio;
pub use lsh::{EntryId, LshParams, MinHashLSH};
pub use minhash::{MinHash, MinHashSignature};
pub use normalize::normalize;
pub use record::{CanonicalRecord, Database, Provenance, RawRecord, Statistics};
pub use shingle::ShingleSet;
