//! Type-checker error taxonomy (`spec.md` §6) plus a similarity-based
//! suggestion helper, grounded on `lmlang-check`'s
//! `typecheck/diagnostics.rs` "rich context, accumulated, never thrown"
//! style and on its numeric-scoring helper-function idiom (see
//! `lmlang-server/src/service.rs`'s `vector_cosine_similarity`), applied
//! here to Levenshtein distance over identifier candidates instead of
//! embedding vectors.

use constellation_core::{CType, Span};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum Levenshtein distance (case-insensitive) for a suggestion to be
/// offered, and the maximum number of suggestions returned.
const MAX_SUGGESTION_DISTANCE: usize = 3;
const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
pub enum CheckError {
    #[error("E001 undefined variable '{name}' at {span:?} (candidates: {suggestions:?})")]
    UndefinedVariable {
        name: String,
        span: Span,
        suggestions: Vec<String>,
    },
    #[error("E002 undefined function '{name}' at {span:?} (candidates: {suggestions:?})")]
    UndefinedFunction {
        name: String,
        span: Span,
        suggestions: Vec<String>,
    },
    #[error("E003 undefined type '{name}' at {span:?} (candidates: {suggestions:?})")]
    UndefinedType {
        name: String,
        span: Span,
        suggestions: Vec<String>,
    },
    #[error("E004 undefined namespace '{name}' at {span:?} (candidates: {suggestions:?})")]
    UndefinedNamespace {
        name: String,
        span: Span,
        suggestions: Vec<String>,
    },
    #[error("E005 ambiguous function '{name}' at {span:?}, candidates: {candidates:?}")]
    AmbiguousFunction {
        name: String,
        span: Span,
        candidates: Vec<String>,
    },
    #[error("E006 invalid projection field '{field}' at {span:?} (candidates: {candidates:?})")]
    InvalidProjection {
        field: String,
        span: Span,
        candidates: Vec<String>,
    },
    #[error("E007 invalid field access '{field}' at {span:?} (candidates: {candidates:?})")]
    InvalidFieldAccess {
        field: String,
        span: Span,
        candidates: Vec<String>,
    },
    #[error("E010 type mismatch at {span:?}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        expected: CType,
        actual: CType,
        span: Span,
    },
    #[error("E012 incompatible merge on field '{field}' at {span:?}: {left:?} vs {right:?}")]
    IncompatibleMerge {
        field: String,
        left: CType,
        right: CType,
        span: Span,
    },
    #[error("E013 unsupported comparison at {span:?}")]
    UnsupportedComparison { span: Span },
    #[error("E014 unsupported arithmetic at {span:?}: {detail}")]
    UnsupportedArithmetic { detail: String, span: Span },
    #[error("E015 type error at {span:?}: {message}")]
    TypeError { message: String, span: Span },
    #[error("E020 parse error: {0}")]
    Parse(#[from] constellation_parser::ParseError),
    /// Not one of the numbered `spec.md` §6 codes; `spec.md` §4.5/§9 names
    /// this distinct outcome explicitly for HOF operators the lowering
    /// pass has no transform for (e.g. `sortBy`).
    #[error("unsupported operation '{name}' at {span:?}")]
    UnsupportedOperation { name: String, span: Span },
    #[error("E900 internal error: {detail}")]
    Internal { detail: String },
}

/// Levenshtein edit distance between two strings, compared
/// case-insensitively by the caller.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut prev = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let tmp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev
            } else {
                1 + prev.min(row[j]).min(row[j - 1])
            };
            prev = tmp;
        }
    }
    row[b.len()]
}

/// Candidates within [`MAX_SUGGESTION_DISTANCE`] of `name`, case-insensitive,
/// sorted by distance then alphabetically, capped at [`MAX_SUGGESTIONS`].
pub fn suggest(name: &str, candidates: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
    let needle = name.to_lowercase();
    let mut scored: Vec<(usize, String)> = candidates
        .into_iter()
        .map(|c| c.as_ref().to_string())
        .filter(|c| c.to_lowercase() != needle)
        .map(|c| (levenshtein(&needle, &c.to_lowercase()), c))
        .filter(|(d, _)| *d <= MAX_SUGGESTION_DISTANCE)
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    scored.dedup_by(|a, b| a.1 == b.1);
    scored.into_iter().take(MAX_SUGGESTIONS).map(|(_, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_identical_is_zero() {
        assert_eq!(levenshtein("abc", "abc"), 0);
    }

    #[test]
    fn levenshtein_single_substitution() {
        assert_eq!(levenshtein("cat", "bat"), 1);
    }

    #[test]
    fn suggest_finds_close_match_case_insensitively() {
        let suggestions = suggest("flter", ["filter", "map", "unrelated"]);
        assert_eq!(suggestions, vec!["filter".to_string()]);
    }

    #[test]
    fn suggest_excludes_far_candidates() {
        let suggestions = suggest("filter", ["completely_different_name"]);
        assert!(suggestions.is_empty());
    }

    #[test]
    fn suggest_caps_result_count() {
        let suggestions = suggest("aa", ["ab", "ac", "ad", "ae"]);
        assert!(suggestions.len() <= MAX_SUGGESTIONS);
    }
}
