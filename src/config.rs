//! Configuration for deduplication, distillation, and rule classification.
//!
//! Every section has compiled defaults; a TOML file only needs the fields it
//! overrides:
//!
//! ```toml
//! [dedup]
//! minhash_similarity_threshold = 0.5
//! fuzzy_similarity_threshold = 85
//!
//! [distill]
//! category_field = "category"
//!
//! [classifier]
//! strategy = "keyword_heuristic"
//! ```
//!
//! Invalid values are rejected by [`RulesketchConfig::validate`] before any
//! record is processed.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classify::ClassifierStrategy;
use crate::error::{Error, Result};
use crate::lsh::LshParams;
use crate::minhash::DEFAULT_SEED;

/// Deduplicator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Jaccard threshold used to pick the LSH band/row split.
    pub minhash_similarity_threshold: f64,
    /// Minimum token-set ratio (0..=100) that confirms a candidate.
    pub fuzzy_similarity_threshold: u8,
    /// Signature length.
    pub num_perm: usize,
    /// Explicit band count; needs `rows` too.
    pub bands: Option<usize>,
    /// Explicit rows per band; needs `bands` too.
    pub rows: Option<usize>,
    /// Seed of the hash-family table.
    pub seed: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            minhash_similarity_threshold: 0.5,
            fuzzy_similarity_threshold: 80,
            num_perm: 128,
            bands: None,
            rows: None,
            seed: DEFAULT_SEED,
        }
    }
}

impl DedupConfig {
    /// Check ranges. Called by [`crate::Deduplicator::new`].
    pub fn validate(&self) -> Result<()> {
        if self.num_perm == 0 {
            return Err(invalid("dedup.num_perm", "must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.minhash_similarity_threshold) {
            return Err(invalid(
                "dedup.minhash_similarity_threshold",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.fuzzy_similarity_threshold > 100 {
            return Err(invalid(
                "dedup.fuzzy_similarity_threshold",
                "must be between 0 and 100",
            ));
        }
        if self.bands.is_some() != self.rows.is_some() {
            return Err(invalid("dedup.bands", "bands and rows must be set together"));
        }
        self.lsh_params()
            .map(|_| ())
            .map_err(|e| invalid("dedup.bands", &e.to_string()))
    }

    /// Band/row split: explicit if configured, otherwise derived from the threshold.
    pub fn lsh_params(&self) -> Result<LshParams> {
        match (self.bands, self.rows) {
            (Some(bands), Some(rows)) => LshParams::new(bands, rows, self.num_perm),
            _ => LshParams::from_threshold(self.minhash_similarity_threshold, self.num_perm),
        }
    }
}

/// Field names the distiller reads from input records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistillConfig {
    /// Record field holding the rule text.
    pub text_field: String,
    /// Categorical attribute counted in the statistics.
    pub category_field: String,
    /// Numeric attributes averaged in the statistics.
    pub numeric_fields: Vec<String>,
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self {
            text_field: "rule_text".to_owned(),
            category_field: "rule_type".to_owned(),
            numeric_fields: vec!["quality_score".to_owned(), "word_count".to_owned()],
        }
    }
}

impl DistillConfig {
    /// Field names must be non-empty.
    pub fn validate(&self) -> Result<()> {
        if self.text_field.is_empty() {
            return Err(invalid("distill.text_field", "must not be empty"));
        }
        if self.category_field.is_empty() {
            return Err(invalid("distill.category_field", "must not be empty"));
        }
        if self.numeric_fields.iter().any(String::is_empty) {
            return Err(invalid("distill.numeric_fields", "names must not be empty"));
        }
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesketchConfig {
    /// Deduplicator settings.
    pub dedup: DedupConfig,
    /// Distillation field names.
    pub distill: DistillConfig,
    /// Rule classifier used by list deduplication.
    pub classifier: ClassifierStrategy,
}

impl RulesketchConfig {
    /// Parse and validate a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Self::parse(toml_str, "<string>")
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.dedup.validate()?;
        self.distill.validate()?;
        self.classifier.validate()
    }

    fn parse(toml_str: &str, origin: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| Error::ConfigParse {
            path: origin.to_owned(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}

pub(crate) fn invalid(field: &str, message: &str) -> Error {
    Error::Config {
        field: field.to_owned(),
        message: message.to_owned(),
    }
}
