//! Applicability heuristics
//!
//! A heuristic scores how relevant a tool is to a free-text request, in
//! `[0.0, 1.0]`. Scoring must be pure: the same request always yields the
//! same score, which keeps tool selection deterministic.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}_]+").expect("valid word regex"));

/// Score how relevant a tool is to a request (0.0 to 1.0)
pub trait ApplicabilityHeuristic: Send + Sync {
    fn score(&self, request: &str) -> f32;
}

/// Clamp a raw score into `[0.0, 1.0]`, mapping NaN to zero
pub fn normalize_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Lowercased word tokens of a text
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD.find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Keyword matching heuristic
///
/// Single-word keywords match whole request words; multi-word keywords match
/// as a phrase. Any match yields at least 0.5, rising to 1.0 when every
/// keyword is present.
#[derive(Debug, Clone, Default)]
pub struct KeywordHeuristic {
    keywords: Vec<Vec<String>>,
}

impl KeywordHeuristic {
    /// Create a heuristic from keywords or phrases
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| tokenize(k.as_ref()))
            .filter(|words| !words.is_empty())
            .collect();
        Self { keywords }
    }

    /// Number of keywords that appear in the request
    pub fn matches(&self, request: &str) -> usize {
        let words = tokenize(request);
        let vocabulary: HashSet<&str> = words.iter().map(String::as_str).collect();

        self.keywords
            .iter()
            .filter(|keyword| match keyword.as_slice() {
                [single] => vocabulary.contains(single.as_str()),
                phrase => words.windows(phrase.len()).any(|window| window == phrase),
            })
            .count()
    }
}

impl ApplicabilityHeuristic for KeywordHeuristic {
    fn score(&self, request: &str) -> f32 {
        if self.keywords.is_empty() {
            return 0.0;
        }

        let matched = self.matches(request);
        if matched == 0 {
            return 0.0;
        }

        0.5 + 0.5 * (matched as f32 / self.keywords.len() as f32)
    }
}

/// Heuristic that always returns the same score
#[derive(Debug, Clone, Copy)]
pub struct ConstantHeuristic(pub f32);

impl ApplicabilityHeuristic for ConstantHeuristic {
    fn score(&self, _request: &str) -> f32 {
        self.0
    }
}

/// Heuristic backed by a closure
pub struct FnHeuristic<F>(pub F);

impl<F> ApplicabilityHeuristic for FnHeuristic<F>
where
    F: Fn(&str) -> f32 + Send + Sync,
{
    fn score(&self, request: &str) -> f32 {
        (self.0)(request)
    }
}

/// Shared heuristic handle stored in descriptors
pub type BoxedHeuristic = Arc<dyn ApplicabilityHeuristic>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_single_word() {
        let heuristic = KeywordHeuristic::new(["search", "find"]);

        assert_eq!(heuristic.score("please search the web"), 0.75);
        assert_eq!(heuristic.score("Search and FIND it"), 1.0);
        assert_eq!(heuristic.score("researching"), 0.0);
    }

    #[test]
    fn test_keyword_phrase() {
        let heuristic = KeywordHeuristic::new(["exchange rate"]);

        assert_eq!(heuristic.score("what is the exchange rate today?"), 1.0);
        assert_eq!(heuristic.score("rate the exchange"), 0.0);
    }

    #[test]
    fn test_empty_keywords_never_match() {
        let heuristic = KeywordHeuristic::new(Vec::<String>::new());
        assert_eq!(heuristic.score("anything"), 0.0);
    }

    #[test]
    fn test_normalize_score() {
        assert_eq!(normalize_score(f32::NAN), 0.0);
        assert_eq!(normalize_score(-0.2), 0.0);
        assert_eq!(normalize_score(1.7), 1.0);
        assert_eq!(normalize_score(0.4), 0.4);
    }

    #[test]
    fn test_fn_heuristic() {
        let heuristic = FnHeuristic(|req: &str| if req.contains('?') { 0.3 } else { 0.0 });
        assert_eq!(heuristic.score("why?"), 0.3);
        assert_eq!(heuristic.score("because"), 0.0);
    }
}
