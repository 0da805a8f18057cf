//! Rule classifiers: decide whether a candidate sentence is advice at all.
//!
//! The strategy is picked once from configuration and built into a
//! [`RuleClassifier`]; nothing is detected at runtime. Classification only
//! gates list deduplication ([`crate::dedup_records`]); distillation keeps
//! every record so that no provenance is lost.

use serde::{Deserialize, Serialize};

use crate::config::invalid;
use crate::error::Result;
use crate::fuzzy::token_set_ratio;
use crate::normalize::normalize;

/// Prescriptive phrasing that marks advice.
const RULE_KEYWORDS: &[&str] = &[
    "should", "must", "always", "never", "avoid", "ensure", "make sure", "remember", "rule",
    "principle", "guideline", "recommend", "don't", "do not", "appropriate", "suitable", "proper",
    "ideal", "best", "typically", "usually", "prefer", "opt for", "choose", "consider",
    "important",
];

/// Domain vocabulary; advice must mention at least one.
const DOMAIN_KEYWORDS: &[&str] = &[
    "wear", "fit", "color", "match", "pair", "dress", "style", "fashion", "shirt", "pants",
    "jacket", "suit", "shoes", "tie", "belt", "watch", "formal", "casual", "business", "wardrobe",
    "outfit", "garment", "trouser", "blazer", "sportcoat", "oxford", "loafer", "fabric",
    "tailoring", "accessories", "pattern", "texture", "silhouette",
];

/// Promotional boilerplate scraped along with content.
const NOISE_KEYWORDS: &[&str] = &[
    "subscribe", "newsletter", "click here", "read more", "buy now", "shop now", "related posts",
    "follow us", "advertisement", "sponsored", "affiliate", "disclosure", "comment below",
];

/// Decides whether a sentence is a rule.
pub trait RuleClassifier: Send + Sync {
    /// True if `text` should be kept as a rule.
    fn is_rule(&self, text: &str) -> bool;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Keeps everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl RuleClassifier for AcceptAll {
    fn is_rule(&self, _text: &str) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "accept_all"
    }
}

/// Length bounds plus keyword filters.
///
/// A rule is between `min_chars` and `max_chars` long, contains prescriptive
/// language and domain vocabulary, and contains no promotional noise.
#[derive(Debug, Clone)]
pub struct KeywordHeuristic {
    min_chars: usize,
    max_chars: usize,
}

impl KeywordHeuristic {
    /// Build with character-length bounds (inclusive).
    pub fn new(min_chars: usize, max_chars: usize) -> Self {
        Self {
            min_chars,
            max_chars,
        }
    }
}

impl RuleClassifier for KeywordHeuristic {
    fn is_rule(&self, text: &str) -> bool {
        let len = text.chars().count();
        if len < self.min_chars || len > self.max_chars {
            return false;
        }
        let lower = text.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        has(RULE_KEYWORDS) && has(DOMAIN_KEYWORDS) && !has(NOISE_KEYWORDS)
    }

    fn name(&self) -> &'static str {
        "keyword_heuristic"
    }
}

/// Lexical overlap with known example rules.
///
/// Accepts a text whose token-set ratio against any prototype reaches
/// `min_score`.
#[derive(Debug, Clone)]
pub struct PrototypeOverlap {
    prototypes: Vec<String>,
    min_score: u8,
}

impl PrototypeOverlap {
    /// Build from raw prototype sentences.
    pub fn new<S: AsRef<str>>(prototypes: impl IntoIterator<Item = S>, min_score: u8) -> Self {
        Self {
            prototypes: prototypes
                .into_iter()
                .map(|p| normalize(p.as_ref()))
                .filter(|p| !p.is_empty())
                .collect(),
            min_score,
        }
    }
}

impl RuleClassifier for PrototypeOverlap {
    fn is_rule(&self, text: &str) -> bool {
        let normalized = normalize(text);
        self.prototypes
            .iter()
            .any(|p| token_set_ratio(&normalized, p) >= self.min_score)
    }

    fn name(&self) -> &'static str {
        "prototype_overlap"
    }
}

fn default_min_chars() -> usize {
    30
}

fn default_max_chars() -> usize {
    500
}

fn default_min_score() -> u8 {
    60
}

/// Configuration-selected classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ClassifierStrategy {
    /// [`AcceptAll`].
    #[default]
    AcceptAll,
    /// [`KeywordHeuristic`].
    KeywordHeuristic {
        /// Minimum length in characters.
        #[serde(default = "default_min_chars")]
        min_chars: usize,
        /// Maximum length in characters.
        #[serde(default = "default_max_chars")]
        max_chars: usize,
    },
    /// [`PrototypeOverlap`].
    PrototypeOverlap {
        /// Example rules.
        prototypes: Vec<String>,
        /// Minimum token-set ratio against any prototype.
        #[serde(default = "default_min_score")]
        min_score: u8,
    },
}

impl ClassifierStrategy {
    /// Reject inconsistent settings.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::AcceptAll => Ok(()),
            Self::KeywordHeuristic {
                min_chars,
                max_chars,
            } if min_chars > max_chars => Err(invalid(
                "classifier.min_chars",
                "must not exceed max_chars",
            )),
            Self::KeywordHeuristic { .. } => Ok(()),
            Self::PrototypeOverlap { min_score, .. } if *min_score > 100 => Err(invalid(
                "classifier.min_score",
                "must be between 0 and 100",
            )),
            Self::PrototypeOverlap { prototypes, .. } if prototypes.is_empty() => Err(invalid(
                "classifier.prototypes",
                "must list at least one rule",
            )),
            Self::PrototypeOverlap { .. } => Ok(()),
        }
    }

    /// Build the classifier.
    pub fn build(&self) -> Box<dyn RuleClassifier> {
        match self {
            Self::AcceptAll => Box::new(AcceptAll),
            Self::KeywordHeuristic {
                min_chars,
                max_chars,
            } => Box::new(KeywordHeuristic::new(*min_chars, *max_chars)),
            Self::PrototypeOverlap {
                prototypes,
                min_score,
            } => Box::new(PrototypeOverlap::new(prototypes.iter(), *min_score)),
        }
    }
}
