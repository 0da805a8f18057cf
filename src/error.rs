//! Library error type.

use std::path::PathBuf;

/// Errors raised by index construction, configuration, and batch I/O.
///
/// Per-record problems are [`RecordError`]s instead; callers log and skip
/// them. Empty text is not a problem at all.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A parameter is out of range or inconsistent.
    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),
    /// A configuration field failed validation.
    #[error("invalid config field `{field}`: {message}")]
    Config {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },
    /// A configuration file could not be parsed.
    #[error("failed to parse config {path}: {message}")]
    ConfigParse {
        /// Source of the TOML (a path, or `<string>`).
        path: String,
        /// Parser message.
        message: String,
    },
    /// Reading or writing a file failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A file did not contain the JSON shape we expect.
    #[error("malformed JSON in {}: {source}", path.display())]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// A distillation invariant was broken. This is a bug, not bad input.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
    /// Another thread panicked while holding the shared deduplicator.
    #[error("shared deduplicator lock poisoned")]
    LockPoisoned,
}

/// Why a single input record was skipped.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The record is not a JSON object.
    #[error("record is not an object")]
    NotAnObject,
    /// The text field is absent or not a string.
    #[error("record has no string `{0}` field")]
    MissingText(String),
    /// `sources` is present but not a list of source objects.
    #[error("malformed sources: {0}")]
    MalformedSources(#[source] serde_json::Error),
    /// Neither a non-empty `sources` list nor flat source fields.
    #[error("record has no sources")]
    NoSources,
}

/// Convenience alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
