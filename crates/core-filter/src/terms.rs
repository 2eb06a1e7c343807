//! Query-term splitting shared by every strategy.
//!
//! The query is whitespace-separated tokens:
//! * `\-xxx` is the literal positive term `-xxx` (backslash stripped)
//! * `-` or `--` alone is a literal positive term
//! * `-xxx` is the negative term `xxx`
//! * anything else is a positive term
//!
//! Negative terms always match as case-insensitive literal regexes; a line
//! matching any of them is rejected. A query with only negative terms
//! emits every non-excluded line without highlight spans.

use regex::Regex;

use crate::FilterError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryTerms {
    pub positives: Vec<String>,
    pub negatives: Vec<String>,
}

impl QueryTerms {
    pub fn parse(query: &str) -> Self {
        let mut terms = QueryTerms::default();
        for token in query.split_whitespace() {
            if let Some(rest) = token.strip_prefix("\\-") {
                terms.positives.push(format!("-{rest}"));
            } else if token == "-" || token == "--" {
                terms.positives.push(token.to_string());
            } else if let Some(rest) = token.strip_prefix('-') {
                terms.negatives.push(rest.to_string());
            } else {
                terms.positives.push(token.to_string());
            }
        }
        terms
    }

    pub fn is_empty(&self) -> bool {
        self.positives.is_empty() && self.negatives.is_empty()
    }

    /// Compile the negative terms. Escaped literals cannot fail to
    /// compile, but the Result keeps the call shape uniform with the
    /// positive-term paths.
    pub fn compile_negatives(&self) -> Result<Vec<Regex>, FilterError> {
        self.negatives
            .iter()
            .map(|term| Regex::new(&format!("(?i){}", regex::escape(term))).map_err(FilterError::from))
            .collect()
    }
}

/// Whether any negative regex rejects `display`.
pub fn excluded(display: &str, negatives: &[Regex]) -> bool {
    negatives.iter().any(|re| re.is_match(display))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parsed(q: &str) -> (Vec<String>, Vec<String>) {
        let t = QueryTerms::parse(q);
        (t.positives, t.negatives)
    }

    #[test]
    fn plain_tokens_are_positive() {
        let t = QueryTerms::parse("foo bar");
        assert_eq!(t.positives, vec!["foo", "bar"]);
        assert!(t.negatives.is_empty());
    }

    #[test]
    fn dash_prefix_is_negative() {
        let (pos, neg) = parsed("foo -bar");
        assert_eq!(pos, vec!["foo"]);
        assert_eq!(neg, vec!["bar"]);
    }

    #[test]
    fn escaped_dash_is_literal_positive() {
        let (pos, neg) = parsed("\\-v");
        assert_eq!(pos, vec!["-v"]);
        assert!(neg.is_empty());
    }

    #[test]
    fn bare_dashes_are_literal_positives() {
        let (pos, neg) = parsed("- --");
        assert_eq!(pos, vec!["-", "--"]);
        assert!(neg.is_empty());
    }

    #[test]
    fn double_dash_prefix_negates_with_leading_dash() {
        // `--xxx` is "-" stripped once: negative term `-xxx`.
        let (pos, neg) = parsed("--xxx");
        assert!(pos.is_empty());
        assert_eq!(neg, vec!["-xxx"]);
    }

    #[test]
    fn empty_tokens_skipped() {
        let (pos, neg) = parsed("   a   \t b  ");
        assert_eq!(pos, vec!["a", "b"]);
        assert!(neg.is_empty());
    }

    #[test]
    fn negatives_match_case_insensitively() {
        let t = QueryTerms::parse("-BAR");
        let negs = t.compile_negatives().unwrap();
        assert!(excluded("foobar", &negs));
        assert!(excluded("FOOBAR", &negs));
        assert!(!excluded("foobaz", &negs));
    }

    #[test]
    fn negative_terms_are_literal_not_regex() {
        let t = QueryTerms::parse("-a.c");
        let negs = t.compile_negatives().unwrap();
        assert!(excluded("xa.cx", &negs));
        assert!(!excluded("abc", &negs));
    }
}
