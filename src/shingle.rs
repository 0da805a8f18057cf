//! Token shingles: the comparison units fed to MinHash.

use std::collections::HashSet;

/// Order-insensitive set of unigram and bigram shingles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShingleSet {
    shingles: HashSet<String>,
}

impl ShingleSet {
    /// Shingle already-normalized text.
    ///
    /// Every whitespace-delimited token is a shingle, and so is every adjacent
    /// token pair joined by a single space.
    pub fn from_normalized(normalized: &str) -> Self {
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        let mut shingles: HashSet<String> = tokens.iter().map(|t| (*t).to_owned()).collect();
        shingles.extend(tokens.windows(2).map(|w| w.join(" ")));
        Self { shingles }
    }

    /// Iterate the shingles (arbitrary order).
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.shingles.iter().map(String::as_str)
    }

    /// Whether `shingle` is in the set.
    pub fn contains(&self, shingle: &str) -> bool {
        self.shingles.contains(shingle)
    }

    /// Number of distinct shingles.
    pub fn len(&self) -> usize {
        self.shingles.len()
    }

    /// True if there are no shingles (empty normalized text).
    pub fn is_empty(&self) -> bool {
        self.shingles.is_empty()
    }
}
