//! String utility functions used by prompting, grounding and validation.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9][a-z0-9+#._-]*").unwrap());
static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[a-zA-Z0-9_-]*\s*(.*?)\s*```\s*$").unwrap());

/// Minimum token length considered a key term.
const MIN_TERM_LENGTH: usize = 3;

/// Minimum term length for stem (prefix) matching.
const MIN_STEM_LENGTH: usize = 6;

/// Function words and generic qualifiers that never carry factual content.
///
/// Qualifiers such as "expert" or "experienced" are excluded so that a claim's
/// support is measured on its subject matter, not on its praise.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "onto", "are", "was", "were",
    "has", "have", "had", "his", "her", "their", "they", "them", "its", "who", "whom", "which",
    "what", "when", "where", "while", "also", "very", "more", "most", "much", "many", "some",
    "such", "than", "then", "there", "these", "those", "using", "used", "uses", "use", "via",
    "across", "over", "under", "about", "between", "within", "without", "through", "based",
    "can", "could", "would", "should", "will", "may", "might", "not", "but", "all", "any",
    "each", "other", "own", "out", "off", "our", "your", "you", "one", "two", "is", "be",
    "been", "being", "does", "did", "doing", "developer", "engineer", "programmer", "author",
    "maintainer", "expert", "expertise", "experienced", "experience", "skilled", "strong",
    "deep", "solid", "proficient", "proficiency", "knowledge", "knowledgeable", "familiar",
    "familiarity", "heavy", "heavily", "primarily", "mainly", "mostly", "likely", "clearly",
    "highly", "significant", "notable", "demonstrates", "demonstrated", "shows", "shown",
    "works", "worked", "working", "builds", "built", "building", "project", "projects",
    "repository", "repositories", "repo", "repos", "codebase", "code", "well", "good",
    "great", "extensive", "extensively", "advanced", "focus", "focused", "focuses",
    "core", "stack", "seen", "appears", "mentions", "mentioned", "evidence", "broader",
    "claims", "verified",
];

/// Collapse all runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Case- and whitespace-insensitive substring test.
pub fn contains_normalized(haystack: &str, needle: &str) -> bool {
    let needle = normalize_whitespace(needle).to_lowercase();
    if needle.is_empty() {
        return false;
    }
    normalize_whitespace(haystack).to_lowercase().contains(&needle)
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Lowercased tokens of `text`, including technology-style tokens such as
/// `c++`, `c#` or `node.js`.
///
/// Compound tokens (`distributed-systems`, `node.js`) are emitted whole and
/// also split into their parts.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut tokens = Vec::new();
    for m in TOKEN.find_iter(&lowered) {
        let token = m.as_str().trim_end_matches(['.', '-', '_']);
        if token.is_empty() {
            continue;
        }
        if token.contains(['.', '-', '_']) {
            tokens.extend(
                token
                    .split(['.', '-', '_'])
                    .filter(|part| !part.is_empty())
                    .map(str::to_string),
            );
        }
        tokens.push(token.to_string());
    }
    tokens
}

/// Content-bearing terms of a statement, deduplicated and sorted.
pub fn key_terms(text: &str) -> BTreeSet<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| is_key_term(t))
        .collect()
}

fn is_numeric(token: &str) -> bool {
    token.chars().all(|c| c.is_ascii_digit())
}

fn is_key_term(token: &str) -> bool {
    // Numbers are facts whatever their length. Short technology names such as
    // "c++", "go" or "r" carry meaning only with punctuation.
    if is_numeric(token) {
        return true;
    }
    let long_enough = token.chars().count() >= MIN_TERM_LENGTH
        || token.contains(['+', '#']);
    long_enough && !STOP_WORDS.contains(&token)
}

/// Whether `term` occurs in the tokenized `corpus` as a whole token or, for
/// longer terms, as the stem of one ("compiler" matches "compilers").
///
/// Short terms and numbers must match exactly so that "java" never matches
/// "javascript" and "5000" never matches "50000".
pub fn term_in_tokens(term: &str, corpus: &BTreeSet<String>) -> bool {
    if corpus.contains(term) {
        return true;
    }
    if is_numeric(term) || term.chars().count() < MIN_STEM_LENGTH {
        return false;
    }
    corpus
        .range(term.to_string()..)
        .next()
        .is_some_and(|candidate| candidate.starts_with(term))
}

/// Strip a surrounding Markdown code fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}

/// Join items as "a, b and c".
pub fn join_human(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b  c "), "a b c");
    }

    #[test]
    fn test_contains_normalized() {
        assert!(contains_normalized("A Raft-based\n  consensus log", "raft-based consensus"));
        assert!(!contains_normalized("anything", "   "));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_key_terms_drop_qualifiers() {
        let terms = key_terms("Expert in distributed consensus");
        assert_eq!(
            terms.into_iter().collect::<Vec<_>>(),
            vec!["consensus".to_string(), "distributed".to_string()]
        );
    }

    #[test]
    fn test_key_terms_keep_short_language_names() {
        let terms = key_terms("Writes C++ and C# services in Go");
        assert!(terms.contains("c++"));
        assert!(terms.contains("c#"));
        assert!(terms.contains("services"));
        assert!(!terms.contains("go"));
    }

    #[test]
    fn test_term_in_tokens_prefix() {
        let corpus: BTreeSet<String> = tokenize("distributed-systems toolkit").into_iter().collect();
        assert!(term_in_tokens("distributed", &corpus));
        assert!(term_in_tokens("toolkit", &corpus));
        assert!(term_in_tokens("systems", &corpus));
        assert!(!term_in_tokens("consensus", &corpus));

        let corpus: BTreeSet<String> = tokenize("JavaScript compilers").into_iter().collect();
        assert!(!term_in_tokens("java", &corpus));
        assert!(term_in_tokens("compiler", &corpus));
    }

    #[test]
    fn test_numbers_are_exact_key_terms() {
        let terms = key_terms("Has 50000 stars and 3 forks");
        assert!(terms.contains("50000"));
        assert!(terms.contains("3"));

        let corpus: BTreeSet<String> = tokenize("500000 downloads").into_iter().collect();
        assert!(!term_in_tokens("500000", &tokenize("5000000").into_iter().collect()));
        assert!(term_in_tokens("500000", &corpus));
        assert!(!term_in_tokens("50000", &corpus));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_join_human() {
        let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(join_human(&items), "a, b and c");
        assert_eq!(join_human(&items[..1]), "a");
    }
}
