//! Distillation: collapse a batch of records into duplicate families.
//!
//! Preparation (normalize, shingle, sign) is pure and runs on the rayon pool.
//! Resolution against the [`Deduplicator`] then runs strictly in input order,
//! so the first record of every family is its representative and the output
//! only depends on the input order and configuration.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::classify::RuleClassifier;
use crate::config::{DedupConfig, DistillConfig};
use crate::dedup::{Deduplicator, Prepared, Verdict};
use crate::error::{Error, Result};
use crate::lsh::EntryId;
use crate::record::{CanonicalRecord, Database, RawRecord, Statistics};

/// Groups records into families and merges their provenance.
#[derive(Debug)]
pub struct Distiller {
    config: DistillConfig,
    dedup: Deduplicator,
}

impl Distiller {
    /// Distiller over a fresh deduplicator.
    pub fn new(dedup: DedupConfig, config: DistillConfig) -> Result<Self> {
        Self::with_deduplicator(Deduplicator::new(dedup)?, config)
    }

    /// Distiller over an existing (typically pre-seeded) deduplicator.
    pub fn with_deduplicator(dedup: Deduplicator, config: DistillConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, dedup })
    }

    /// The underlying deduplicator.
    pub fn deduplicator(&self) -> &Deduplicator {
        &self.dedup
    }

    /// Give back the deduplicator, with everything registered so far.
    pub fn into_deduplicator(self) -> Deduplicator {
        self.dedup
    }

    /// Distill raw JSON records.
    ///
    /// Records that are not objects, lack a string text field, or have no
    /// usable provenance are logged and skipped.
    pub fn distill(&mut self, records: Vec<Value>) -> Result<Database> {
        let total = records.len();
        let parsed: Vec<RawRecord> = records
            .into_iter()
            .enumerate()
            .filter_map(|(idx, value)| match RawRecord::from_value(value, &self.config) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(record = idx, error = %e, "skipping record");
                    None
                }
            })
            .collect();
        if parsed.len() < total {
            info!(skipped = total - parsed.len(), "dropped malformed records");
        }
        self.distill_records(parsed)
    }

    /// Distill already parsed records.
    pub fn distill_records(&mut self, records: Vec<RawRecord>) -> Result<Database> {
        let minhash = self.dedup.minhash();
        let prepared: Vec<Prepared> = records
            .par_iter()
            .map(|record| Prepared::new(&record.text, minhash))
            .collect();

        // Families are created in order of their first member.
        let mut families: Vec<Vec<usize>> = Vec::new();
        let mut family_of_entry: HashMap<EntryId, usize> = HashMap::new();
        let mut duplicates = 0usize;
        for (idx, (record, prepared)) in records.iter().zip(prepared).enumerate() {
            let verdict = self.dedup.resolve(prepared, record.id.as_deref());
            if let Verdict::Near { score, .. } = verdict {
                debug!(record = idx, score, "merged near duplicate");
            }
            if verdict.is_duplicate() {
                duplicates += 1;
            }
            let family = *family_of_entry.entry(verdict.entry()).or_insert_with(|| {
                families.push(Vec::new());
                families.len() - 1
            });
            families[family].push(idx);
        }

        let input_sources: usize = records.iter().map(|r| r.sources.len()).sum();
        let input_count = records.len();
        let rules = merge_families(records, &families)?;

        let merged_sources: usize = rules.iter().map(|r| r.source_count).sum();
        if merged_sources != input_sources {
            return Err(Error::Invariant(format!(
                "merged {merged_sources} sources from {input_sources} input sources"
            )));
        }

        let statistics = Statistics::compute(&rules, &self.config);
        info!(
            records = input_count,
            families = rules.len(),
            duplicates,
            multi_source = statistics.multi_source_rules,
            "distilled batch"
        );
        Ok(Database { rules, statistics })
    }
}

fn merge_families(records: Vec<RawRecord>, families: &[Vec<usize>]) -> Result<Vec<CanonicalRecord>> {
    let mut slots: Vec<Option<RawRecord>> = records.into_iter().map(Some).collect();
    let mut take = |idx: usize| {
        slots
            .get_mut(idx)
            .and_then(Option::take)
            .ok_or_else(|| Error::Invariant(format!("record {idx} assigned to two families")))
    };

    families
        .iter()
        .map(|members| -> Result<CanonicalRecord> {
            let (&first, rest) = members
                .split_first()
                .ok_or_else(|| Error::Invariant("family without members".to_owned()))?;
            let representative = take(first)?;
            let mut sources = representative.sources;
            for &idx in rest {
                sources.extend(take(idx)?.sources);
            }
            if sources.is_empty() {
                return Err(Error::Invariant(format!(
                    "family of record {first} has no provenance"
                )));
            }
            Ok(CanonicalRecord {
                rule_text: representative.text,
                source_count: sources.len(),
                sources,
                attributes: representative.attributes,
            })
        })
        .collect()
}

/// Result of [`dedup_records`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DedupOutcome {
    /// Records kept, in input order.
    pub unique: Vec<Value>,
    /// Duplicates, annotated with `duplicate_of` and `duplicate_kind`.
    pub duplicates: Vec<Value>,
    /// Records the classifier did not accept as rules.
    pub rejected: Vec<Value>,
}

/// Split a record list into unique records, duplicates and non-rules.
///
/// Records without a string `text_field`, or whose text normalizes to
/// nothing, are logged and dropped. The rest are classified; accepted ones
/// are checked against (and registered in) `dedup` under their `id` if they
/// have one. Duplicates get `duplicate_of` (key of the matched entry),
/// `duplicate_kind` (`"exact"` or `"near"`) and, for near duplicates,
/// `duplicate_score`. The logged deduplication rate is over all records.
pub fn dedup_records(
    records: Vec<Value>,
    dedup: &mut Deduplicator,
    classifier: &dyn RuleClassifier,
    text_field: &str,
) -> DedupOutcome {
    let total = records.len();
    let mut outcome = DedupOutcome::default();
    let mut skipped = 0usize;
    for (idx, record) in records.into_iter().enumerate() {
        let Value::Object(mut fields) = record else {
            warn!(record = idx, "skipping record: not an object");
            skipped += 1;
            continue;
        };
        let Some(text) = fields.get(text_field).and_then(Value::as_str).map(str::to_owned) else {
            warn!(record = idx, field = text_field, "skipping record without text");
            skipped += 1;
            continue;
        };
        let prepared = Prepared::unsigned(&text);
        if prepared.normalized().is_empty() {
            warn!(record = idx, "skipping record with empty text");
            skipped += 1;
            continue;
        }
        if !classifier.is_rule(&text) {
            outcome.rejected.push(Value::Object(fields));
            continue;
        }
        let key = fields.get("id").and_then(Value::as_str).map(str::to_owned);
        let verdict = dedup.resolve(prepared, key.as_deref());
        match verdict {
            Verdict::Unique { .. } => outcome.unique.push(Value::Object(fields)),
            Verdict::Exact { entry } => {
                annotate(&mut fields, dedup.key(entry), "exact", None);
                outcome.duplicates.push(Value::Object(fields));
            }
            Verdict::Near { entry, score } => {
                annotate(&mut fields, dedup.key(entry), "near", Some(score));
                outcome.duplicates.push(Value::Object(fields));
            }
        }
    }

    let rate = if total == 0 {
        0.0
    } else {
        outcome.duplicates.len() as f64 / total as f64 * 100.0
    };
    info!(
        classifier = classifier.name(),
        records = total,
        unique = outcome.unique.len(),
        duplicates = outcome.duplicates.len(),
        rejected = outcome.rejected.len(),
        skipped,
        "deduplication rate {rate:.1}%"
    );
    outcome
}

fn annotate(fields: &mut Map<String, Value>, key: Option<&str>, kind: &str, score: Option<u8>) {
    fields.insert(
        "duplicate_of".to_owned(),
        key.map_or(Value::Null, |k| Value::String(k.to_owned())),
    );
    fields.insert("duplicate_kind".to_owned(), Value::String(kind.to_owned()));
    if let Some(score) = score {
        fields.insert("duplicate_score".to_owned(), Value::from(score));
    }
}
