//! Batch files on disk.
//!
//! Loading is forgiving: a batch file that cannot be read or parsed is
//! skipped with a warning, as is a bad line in a seed store. Only failing to
//! list the batch directory, or to write output, is an error.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Load every `*.json` batch in `dir`, in sorted path order.
///
/// A batch is either `{"rules": [...]}` or a bare array of records.
pub fn load_batch_dir(dir: &Path) -> Result<Vec<Value>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_error(dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut records = Vec::new();
    let mut loaded = 0usize;
    for path in &paths {
        match load_records_file(path) {
            Ok(batch) => {
                debug!(file = %path.display(), records = batch.len(), "loaded batch");
                records.extend(batch);
                loaded += 1;
            }
            Err(e) => warn!(error = %e, "skipping batch file"),
        }
    }
    info!(
        dir = %dir.display(),
        files = loaded,
        skipped = paths.len() - loaded,
        records = records.len(),
        "loaded batches"
    );
    Ok(records)
}

/// Load one batch file.
pub fn load_records_file(path: &Path) -> Result<Vec<Value>> {
    let text = fs::read_to_string(path).map_err(io_error(path))?;
    let value: Value = serde_json::from_str(&text).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Array(records) => Ok(records),
        Value::Object(mut batch) => match batch.remove("rules") {
            Some(Value::Array(records)) => Ok(records),
            _ => Err(not_a_batch(path)),
        },
        _ => Err(not_a_batch(path)),
    }
}

fn not_a_batch(path: &Path) -> Error {
    Error::Json {
        path: path.to_path_buf(),
        source: serde::de::Error::custom("expected an array or an object with a `rules` array"),
    }
}

/// Texts of a JSONL store of already deduplicated records.
///
/// Each line is a record; its `text_field` string is returned. Blank lines
/// are ignored; unparsable lines and lines without the field are skipped.
pub fn load_seed_store(path: &Path, text_field: &str) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).map_err(io_error(path))?;
    let mut texts = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(record) => match record.get(text_field).and_then(Value::as_str) {
                Some(t) => texts.push(t.to_owned()),
                None => warn!(line = lineno + 1, field = text_field, "seed record has no text"),
            },
            Err(e) => warn!(line = lineno + 1, error = %e, "skipping malformed seed line"),
        }
    }
    debug!(file = %path.display(), texts = texts.len(), "loaded seed store");
    Ok(texts)
}

/// Write `value` as pretty JSON, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let mut json = serde_json::to_string_pretty(value).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })?;
    json.push('\n');
    fs::write(path, json).map_err(io_error(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loads_both_batch_shapes_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.json"), r#"[{"rule_text": "second"}]"#).unwrap();
        fs::write(
            dir.path().join("a.json"),
            r#"{"rules": [{"rule_text": "first"}], "meta": 1}"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let records = load_batch_dir(dir.path()).unwrap();
        let texts: Vec<_> = records.iter().map(|r| r["rule_text"].clone()).collect();
        assert_eq!(texts, vec![json!("first"), json!("second")]);
    }

    #[test]
    fn bad_batch_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), "{ not json").unwrap();
        fs::write(dir.path().join("b.json"), r#"{"results": []}"#).unwrap();
        fs::write(dir.path().join("c.json"), r#"[{"rule_text": "ok"}]"#).unwrap();
        assert_eq!(load_batch_dir(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn missing_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_batch_dir(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn seed_store_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.jsonl");
        fs::write(
            &path,
            "{\"rule_text\": \"Wear a belt.\"}\n\nnot json\n{\"other\": 1}\n{\"rule_text\": \"Roll sleeves.\"}\n",
        )
        .unwrap();
        assert_eq!(
            load_seed_store(&path, "rule_text").unwrap(),
            vec!["Wear a belt.", "Roll sleeves."]
        );
    }

    #[test]
    fn write_json_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/db.json");
        write_json(&path, &json!({"rules": []})).unwrap();
        let back: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, json!({"rules": []}));
    }
}
