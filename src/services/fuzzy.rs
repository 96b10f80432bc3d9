//! Fuzzy Matcher (C6) — similarity scores on (title, company) pairs, used
//! by the deduper (C3) and protected transfer (C5).

use std::collections::HashSet;

use strsim::{jaro_winkler, normalized_levenshtein};

use crate::services::cleaner::strip_legal_suffix;

/// Job-title boilerplate tokens excluded from Jaccard overlap when both
/// sides lack them (§4.4).
const TITLE_STOPWORDS: &[&str] = &["senior", "junior", "sr", "jr", "ii", "iii", "iv", "lead", "staff"];

/// Known abbreviation pairs for subset/abbreviation detection (§4.4).
const ALIAS_TABLE: &[(&str, &str)] = &[("swe", "software engineer"), ("pm", "product manager"), ("sde", "software development engineer")];

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Tokenizes and drops job-title boilerplate (seniority qualifiers, roman
/// numerals) so "Senior X" and "X" compare as equal on token overlap.
fn tokens(s: &str, stopwords: &[&str]) -> HashSet<String> {
    normalize(s)
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty() && !stopwords.contains(&w.as_str()))
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 { 0.0 } else { intersection as f64 / union as f64 }
}

/// One string's tokens form a subsequence of the other's token stream, or
/// one is a known alias of the other.
fn subset_or_alias(a: &str, b: &str) -> f64 {
    let norm_a = normalize(a);
    let norm_b = normalize(b);
    for (abbrev, full) in ALIAS_TABLE {
        if (norm_a == *abbrev && norm_b.contains(full)) || (norm_b == *abbrev && norm_a.contains(full)) {
            return 1.0;
        }
    }

    let tokens_a: Vec<&str> = norm_a.split_whitespace().collect();
    let tokens_b: Vec<&str> = norm_b.split_whitespace().collect();
    if is_subsequence(&tokens_a, &tokens_b) || is_subsequence(&tokens_b, &tokens_a) {
        1.0
    } else {
        0.0
    }
}

fn is_subsequence(needle: &[&str], haystack: &[&str]) -> bool {
    if needle.is_empty() {
        return false;
    }
    let mut it = haystack.iter();
    needle.iter().all(|n| it.any(|h| h == n))
}

/// `similarity(a, b) → [0,1]` combining three signals and returning the
/// maximum (§4.4).
pub fn similarity(a: &str, b: &str) -> f64 {
    let stripped_a = strip_legal_suffix(a);
    let stripped_b = strip_legal_suffix(b);
    let norm_a = if stripped_a.is_empty() { normalize(a) } else { stripped_a };
    let norm_b = if stripped_b.is_empty() { normalize(b) } else { stripped_b };

    let sequence = jaro_winkler(&norm_a, &norm_b).max(normalized_levenshtein(&norm_a, &norm_b));
    let token_overlap = jaccard(&tokens(a, TITLE_STOPWORDS), &tokens(b, TITLE_STOPWORDS));
    let alias = subset_or_alias(a, b);

    sequence.max(token_overlap).max(alias)
}

/// Two records describe the same job iff title similarity ≥ title
/// threshold AND company similarity ≥ company threshold (§4.4).
pub fn same_job(title_a: &str, company_a: &str, title_b: &str, company_b: &str, title_threshold: f64, company_threshold: f64) -> bool {
    similarity(title_a, title_b) >= title_threshold && similarity(company_a, company_b) >= company_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(similarity("Software Engineer", "Software Engineer"), 1.0);
    }

    #[test]
    fn title_variants_score_high() {
        let sim = similarity("Senior Marketing Manager", "Sr. Marketing Manager");
        assert!(sim >= 0.85, "expected >= 0.85, got {sim}");
    }

    #[test]
    fn company_legal_suffix_does_not_reduce_similarity() {
        let sim = similarity("Acme Inc", "Acme, Inc.");
        assert!(sim >= 0.90, "expected >= 0.90, got {sim}");
    }

    #[test]
    fn dedup_title_variant_pair_matches() {
        assert!(same_job("Software Engineer", "Acme Inc", "Software Engineer II", "Acme, Inc.", 0.85, 0.90));
    }

    #[test]
    fn unrelated_titles_score_low() {
        let sim = similarity("Software Engineer", "Warehouse Associate");
        assert!(sim < 0.5, "expected < 0.5, got {sim}");
    }
}
