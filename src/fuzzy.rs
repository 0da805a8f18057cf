//! Token-set ratio: the exact similarity check run on LSH candidates.
//!
//! Both inputs are expected to be normalized already. The score favors pairs
//! that share a large token core even when the wording around it differs.

use std::collections::BTreeSet;

/// Token-set similarity of two normalized texts, in `[0, 100]`.
///
/// The shared tokens (sorted, space-joined) form the core. The score is the
/// best indel ratio among core+onlyA vs core+onlyB, core vs core+onlyA and
/// core vs core+onlyB. Symmetric; returns 0 when either side has no tokens.
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0;
    }

    let sect = join(tokens_a.intersection(&tokens_b));
    let only_a = join(tokens_a.difference(&tokens_b));
    let only_b = join(tokens_b.difference(&tokens_a));

    let combined_a = concat(&sect, &only_a);
    let combined_b = concat(&sect, &only_b);

    let best = [
        indel_ratio(&combined_a, &combined_b),
        indel_ratio(&sect, &combined_a),
        indel_ratio(&sect, &combined_b),
    ]
    .into_iter()
    .fold(0.0_f64, f64::max);

    best.round().clamp(0.0, 100.0) as u8
}

fn join<'s, 'x: 's>(tokens: impl Iterator<Item = &'s &'x str>) -> String {
    tokens.copied().collect::<Vec<_>>().join(" ")
}

fn concat(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_owned(),
        (_, true) => head.to_owned(),
        _ => format!("{head} {tail}"),
    }
}

/// `2 * lcs / (len_a + len_b)` scaled to 100, over chars.
fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(&a, &b) as f64 / total as f64
}

/// Longest common subsequence length with two rolling rows.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut prev = vec![0usize; short.len() + 1];
    let mut cur = vec![0usize; short.len() + 1];
    for &ca in long {
        for (j, &cb) in short.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(cur[j])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[short.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use proptest::prelude::*;

    fn score(a: &str, b: &str) -> u8 {
        token_set_ratio(&normalize(a), &normalize(b))
    }

    #[test]
    fn lcs_basics() {
        let c = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(lcs_len(&c("abcde"), &c("ace")), 3);
        assert_eq!(lcs_len(&c(""), &c("abc")), 0);
        assert_eq!(lcs_len(&c("shirt"), &c("shirt")), 5);
    }

    #[test]
    fn subset_scores_full() {
        assert_eq!(token_set_ratio("fuzzy was a bear", "fuzzy fuzzy was a bear"), 100);
        assert_eq!(token_set_ratio("match belt shoes", "always match belt to shoes"), 100);
    }

    #[test]
    fn shared_core_with_different_wording() {
        let s = score(
            "Your tie should always be darker than your shirt.",
            "Always ensure your tie is darker than your shirt.",
        );
        assert_eq!(s, 87);
    }

    #[test]
    fn unrelated_rules_score_low() {
        let s = score(
            "Brown shoes go well with casual outfits.",
            "Black shoes should be worn with dark suits.",
        );
        assert!(s < 80, "got {s}");
    }

    #[test]
    fn empty_side_scores_zero() {
        assert_eq!(token_set_ratio("", "anything"), 0);
        assert_eq!(token_set_ratio("", ""), 0);
    }

    proptest! {
        #[test]
        fn symmetric_and_bounded(a in "[a-e ]{0,30}", b in "[a-e ]{0,30}") {
            let ab = token_set_ratio(&a, &b);
            prop_assert_eq!(ab, token_set_ratio(&b, &a));
            prop_assert!(ab <= 100);
        }

        #[test]
        fn identical_nonempty_is_100(a in "[a-z]{1,8}( [a-z]{1,8}){0,6}") {
            prop_assert_eq!(token_set_ratio(&a, &a), 100);
        }
    }
}
