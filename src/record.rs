//! Input and output records.
//!
//! Records are JSON objects. Apart from the text and `sources`, every field
//! is an opaque attribute carried through to the output untouched.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::DistillConfig;
use crate::error::RecordError;

/// Domain reported for sources that do not name one.
pub const UNKNOWN_DOMAIN: &str = "unknown";

const OUTPUT_TEXT_FIELD: &str = "rule_text";

/// One place a record was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Page the record came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Site domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Anything else the extractor attached (title, author, score, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Provenance {
    /// Domain, or [`UNKNOWN_DOMAIN`].
    pub fn domain_or_unknown(&self) -> &str {
        self.domain.as_deref().unwrap_or(UNKNOWN_DOMAIN)
    }
}

/// A candidate rule as produced by extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Upstream identifier, from an `id` string field if present.
    pub id: Option<String>,
    /// The rule text.
    pub text: String,
    /// Where it was found, in order.
    pub sources: Vec<Provenance>,
    /// Pass-through attributes (everything except the text and sources).
    pub attributes: Map<String, Value>,
}

impl RawRecord {
    /// Build a record from a JSON object.
    ///
    /// The text comes from `config.text_field`. Provenance comes from a
    /// `sources` array; extractor output that instead carries flat
    /// `source_url` / `source_domain` fields yields a single entry. A record
    /// must have at least one source.
    ///
    /// `rule_text` and `source_count` are output fields and are dropped from
    /// the pass-through attributes.
    pub fn from_value(value: Value, config: &DistillConfig) -> Result<Self, RecordError> {
        let Value::Object(mut attributes) = value else {
            return Err(RecordError::NotAnObject);
        };
        let text = match attributes.remove(&config.text_field) {
            Some(Value::String(text)) => text,
            _ => return Err(RecordError::MissingText(config.text_field.clone())),
        };
        let sources: Vec<Provenance> = match attributes.remove("sources") {
            Some(sources) => {
                serde_json::from_value(sources).map_err(RecordError::MalformedSources)?
            }
            None => flat_source(&attributes).into_iter().collect(),
        };
        if sources.is_empty() {
            return Err(RecordError::NoSources);
        }
        attributes.remove(OUTPUT_TEXT_FIELD);
        attributes.remove("source_count");
        let id = attributes
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_owned);
        Ok(Self {
            id,
            text,
            sources,
            attributes,
        })
    }
}

fn flat_source(attributes: &Map<String, Value>) -> Option<Provenance> {
    let field = |name: &str| {
        attributes
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    };
    let url = field("source_url");
    let domain = field("source_domain");
    if url.is_none() && domain.is_none() {
        return None;
    }
    Some(Provenance {
        url,
        domain,
        extra: Map::new(),
    })
}

/// The merged representative of one duplicate family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Original text of the first-seen member.
    pub rule_text: String,
    /// Every member's sources, in input order.
    pub sources: Vec<Provenance>,
    /// Always `sources.len()`.
    pub source_count: usize,
    /// Attributes of the first-seen member.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Aggregates over the canonical records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Number of canonical records.
    pub total_rules: usize,
    /// Distinct source domains.
    pub unique_domains: usize,
    /// Sorted distinct source domains.
    pub domains: Vec<String>,
    /// Canonical records per value of the category field.
    pub rule_types: BTreeMap<String, usize>,
    /// Records with more than one source.
    pub multi_source_rules: usize,
    /// `multi_source_rules` as a percentage of `total_rules` (0 when empty).
    pub multi_source_percentage: f64,
    /// `avg_<field>` for each configured numeric field.
    #[serde(flatten)]
    pub averages: BTreeMap<String, f64>,
}

impl Statistics {
    /// Compute statistics over `rules`.
    ///
    /// Averages only count records that carry a numeric value for the field;
    /// a field no record carries averages to 0.
    pub fn compute(rules: &[CanonicalRecord], config: &DistillConfig) -> Self {
        let domains: BTreeSet<&str> = rules
            .iter()
            .flat_map(|r| r.sources.iter().map(Provenance::domain_or_unknown))
            .collect();

        let mut rule_types = BTreeMap::new();
        for category in rules
            .iter()
            .filter_map(|r| category_label(r.attributes.get(&config.category_field)?))
        {
            *rule_types.entry(category).or_insert(0) += 1;
        }

        let total_rules = rules.len();
        let multi_source_rules = rules.iter().filter(|r| r.source_count > 1).count();

        let averages = config
            .numeric_fields
            .iter()
            .map(|field| {
                let values: Vec<f64> = rules
                    .iter()
                    .filter_map(|r| r.attributes.get(field)?.as_f64())
                    .collect();
                (format!("avg_{field}"), mean(&values))
            })
            .collect();

        Self {
            total_rules,
            unique_domains: domains.len(),
            domains: domains.into_iter().map(str::to_owned).collect(),
            rule_types,
            multi_source_rules,
            multi_source_percentage: percentage(multi_source_rules, total_rules),
            averages,
        }
    }
}

fn category_label(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Distillation output: canonical records plus statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Database {
    /// Canonical records in order of first appearance.
    pub rules: Vec<CanonicalRecord>,
    /// Aggregates over `rules`.
    pub statistics: Statistics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> DistillConfig {
        DistillConfig::default()
    }

    fn canonical(sources: usize, attributes: Value) -> CanonicalRecord {
        let Value::Object(attributes) = attributes else {
            unreachable!()
        };
        CanonicalRecord {
            rule_text: "x".into(),
            sources: (0..sources)
                .map(|i| Provenance {
                    url: Some(format!("https://d{i}.com/")),
                    domain: Some(format!("d{i}.com")),
                    extra: Map::new(),
                })
                .collect(),
            source_count: sources,
            attributes,
        }
    }

    #[test]
    fn parses_sources_and_keeps_attributes() {
        let r = RawRecord::from_value(
            json!({
                "rule_text": "Wear a belt.",
                "id": "r1",
                "rule_type": "do",
                "sources": [{"url": "https://a.com/x", "domain": "a.com", "title": "T"}]
            }),
            &config(),
        )
        .unwrap();
        assert_eq!(r.text, "Wear a belt.");
        assert_eq!(r.id.as_deref(), Some("r1"));
        assert_eq!(r.sources[0].domain.as_deref(), Some("a.com"));
        assert_eq!(r.sources[0].extra["title"], "T");
        assert!(r.attributes.contains_key("rule_type"));
        assert!(!r.attributes.contains_key("rule_text"));
    }

    #[test]
    fn flat_source_fields_become_one_entry() {
        let r = RawRecord::from_value(
            json!({"rule_text": "t", "source_url": "https://b.com/p", "source_domain": "b.com"}),
            &config(),
        )
        .unwrap();
        assert_eq!(r.sources.len(), 1);
        assert_eq!(r.sources[0].url.as_deref(), Some("https://b.com/p"));
    }

    #[test]
    fn malformed_records_are_rejected() {
        assert!(matches!(
            RawRecord::from_value(json!("text"), &config()),
            Err(RecordError::NotAnObject)
        ));
        assert!(matches!(
            RawRecord::from_value(json!({"rule_text": 3}), &config()),
            Err(RecordError::MissingText(_))
        ));
        assert!(matches!(
            RawRecord::from_value(json!({"rule_text": "t", "sources": "a.com"}), &config()),
            Err(RecordError::MalformedSources(_))
        ));
    }

    #[test]
    fn records_need_a_source() {
        for value in [
            json!({"rule_text": "Wear a belt with suit trousers."}),
            json!({"rule_text": "Roll sleeves twice.", "sources": []}),
            json!({"rule_text": "Roll sleeves twice.", "source_url": ""}),
        ] {
            assert!(matches!(
                RawRecord::from_value(value, &config()),
                Err(RecordError::NoSources)
            ));
        }
    }

    #[test]
    fn custom_text_field_does_not_duplicate_rule_text() {
        let config = DistillConfig {
            text_field: "text".to_owned(),
            ..DistillConfig::default()
        };
        let r = RawRecord::from_value(
            json!({
                "text": "Wear a belt.",
                "rule_text": "stale copy",
                "sources": [{"url": "https://a.com/", "domain": "a.com"}]
            }),
            &config,
        )
        .unwrap();
        assert!(!r.attributes.contains_key("rule_text"));
        let canonical = CanonicalRecord {
            rule_text: r.text,
            source_count: r.sources.len(),
            sources: r.sources,
            attributes: r.attributes,
        };
        let out = serde_json::to_string(&canonical).unwrap();
        assert_eq!(out.matches("\"rule_text\"").count(), 1);
        assert!(out.contains("\"rule_text\":\"Wear a belt.\""));
    }

    #[test]
    fn empty_statistics_are_zero_not_nan() {
        let s = Statistics::compute(&[], &config());
        assert_eq!(s.total_rules, 0);
        assert_eq!(s.multi_source_percentage, 0.0);
        assert_eq!(s.averages["avg_quality_score"], 0.0);
        assert_eq!(s.averages["avg_word_count"], 0.0);
    }

    #[test]
    fn multi_source_percentage() {
        let mut rules: Vec<_> = (0..6).map(|_| canonical(1, json!({}))).collect();
        rules.extend((0..4).map(|_| canonical(2, json!({}))));
        let s = Statistics::compute(&rules, &config());
        assert_eq!(s.total_rules, 10);
        assert_eq!(s.multi_source_rules, 4);
        assert_eq!(s.multi_source_percentage, 40.0);
        assert_eq!(s.domains, vec!["d0.com", "d1.com"]);
    }

    #[test]
    fn averages_skip_records_without_the_field() {
        let rules = vec![
            canonical(1, json!({"quality_score": 8, "rule_type": "do"})),
            canonical(1, json!({"quality_score": 6.0, "rule_type": "do"})),
            canonical(1, json!({"word_count": "many", "rule_type": "dont"})),
        ];
        let s = Statistics::compute(&rules, &config());
        assert_eq!(s.averages["avg_quality_score"], 7.0);
        assert_eq!(s.averages["avg_word_count"], 0.0);
        assert_eq!(s.rule_types["do"], 2);
        assert_eq!(s.rule_types["dont"], 1);
    }

    #[test]
    fn statistics_serialize_flat() {
        let s = Statistics::compute(&[canonical(1, json!({"word_count": 5}))], &config());
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["avg_word_count"], 5.0);
        assert_eq!(v["unique_domains"], 1);
    }
}
