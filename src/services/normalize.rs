//! Name normalization: honorific stripping, punctuation removal, tokenization.

use std::collections::{BTreeSet, HashSet};

/// Titles dropped during normalization, matched as whole lowercase tokens
/// after punctuation is removed ("Mr." and "mr" both match `mr`).
///
/// Kinship and social labels ("aunt", "uncle", "widow") are not listed: in
/// fiction they usually form part of the identity itself.
pub const HONORIFICS: &[&str] = &[
    "mr", "mrs", "ms", "miss", "mx", "mister", "missus", "dr", "doctor", "prof", "professor",
    "sir", "dame", "lady", "lord", "madam", "madame", "mme", "mlle", "monsieur", "rev",
    "reverend", "hon",
];

/// Result of normalizing one name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedName {
    /// Lowercase, honorific-free, single-spaced form.
    pub normalized: String,
    /// Whitespace tokens of `normalized`, in order.
    pub tokens: Vec<String>,
}

impl NormalizedName {
    pub fn first_token(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    pub fn last_token(&self) -> Option<&str> {
        self.tokens.last().map(String::as_str)
    }

    pub fn token_set(&self) -> BTreeSet<&str> {
        self.tokens.iter().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Strips honorifics and punctuation, lowercases and tokenizes names.
#[derive(Debug, Clone)]
pub struct NameNormalizer {
    honorifics: HashSet<String>,
}

impl Default for NameNormalizer {
    fn default() -> Self {
        Self::with_honorifics(HONORIFICS.iter().copied())
    }
}

impl NameNormalizer {
    pub fn with_honorifics<'a>(titles: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            honorifics: titles.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    /// Add titles on top of the current set (e.g. genre-specific ranks).
    pub fn extend_honorifics<'a>(&mut self, titles: impl IntoIterator<Item = &'a str>) {
        self.honorifics
            .extend(titles.into_iter().map(|t| t.trim().to_lowercase()));
    }

    pub fn is_honorific(&self, token: &str) -> bool {
        self.honorifics.contains(token)
    }

    /// Normalize a free-form name. Total: never fails, empty in → empty out.
    pub fn analyze(&self, name: &str) -> NormalizedName {
        let cleaned: String = name
            .chars()
            .filter(|c| *c != '\'' && *c != '\u{2019}')
            .flat_map(char::to_lowercase)
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();

        let raw_tokens: Vec<&str> = cleaned.split_whitespace().collect();
        let mut tokens: Vec<String> = raw_tokens
            .iter()
            .filter(|t| !self.is_honorific(t))
            .map(|t| t.to_string())
            .collect();

        // A name made only of titles ("Sir") keeps its tokens so it still
        // has an identity key.
        if tokens.is_empty() && !raw_tokens.is_empty() {
            tokens = raw_tokens.iter().map(|t| t.to_string()).collect();
        }

        NormalizedName {
            normalized: tokens.join(" "),
            tokens,
        }
    }

    /// Normalized string only.
    pub fn normalize(&self, name: &str) -> String {
        self.analyze(name).normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_honorifics_and_punctuation() {
        let normalizer = NameNormalizer::default();
        assert_eq!(normalizer.normalize("Mr. Darcy"), "darcy");
        assert_eq!(normalizer.normalize("DR.  John   Watson"), "john watson");
        assert_eq!(normalizer.normalize("Miss Watson"), "watson");
        assert_eq!(normalizer.normalize("Sir Walter Elliot, Bart."), "walter elliot bart");
    }

    #[test]
    fn test_honorific_match_is_whole_word() {
        let normalizer = NameNormalizer::default();
        // "Drusilla" starts with "dr" but is not a title.
        assert_eq!(normalizer.normalize("Drusilla"), "drusilla");
        assert_eq!(normalizer.normalize("Misty Day"), "misty day");
    }

    #[test]
    fn test_kinship_labels_are_kept() {
        let normalizer = NameNormalizer::default();
        assert_eq!(normalizer.normalize("Aunt Polly"), "aunt polly");
        assert_eq!(normalizer.normalize("Widow Douglas"), "widow douglas");
    }

    #[test]
    fn test_apostrophes_join_tokens() {
        let normalizer = NameNormalizer::default();
        assert_eq!(normalizer.normalize("O'Brien"), "obrien");
        assert_eq!(normalizer.normalize("Mary-Jane Wilks"), "mary jane wilks");
    }

    #[test]
    fn test_title_only_name_keeps_tokens() {
        let normalizer = NameNormalizer::default();
        assert_eq!(normalizer.normalize("Sir"), "sir");
    }

    #[test]
    fn test_empty_input() {
        let normalizer = NameNormalizer::default();
        let analyzed = normalizer.analyze("");
        assert!(analyzed.is_empty());
        assert_eq!(analyzed.normalized, "");
        assert!(normalizer.analyze(" .,; ").tokens.is_empty());
    }

    #[test]
    fn test_first_and_last_tokens() {
        let analyzed = NameNormalizer::default().analyze("Mrs. Elizabeth Bennet");
        assert_eq!(analyzed.first_token(), Some("elizabeth"));
        assert_eq!(analyzed.last_token(), Some("bennet"));
        assert_eq!(analyzed.token_set().len(), 2);
    }

    #[test]
    fn test_extend_honorifics() {
        let mut normalizer = NameNormalizer::default();
        assert_eq!(normalizer.normalize("Captain Ahab"), "captain ahab");
        normalizer.extend_honorifics(["Captain"]);
        assert_eq!(normalizer.normalize("Captain Ahab"), "ahab");
    }

    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_normalize_is_idempotent(name in "[A-Za-z .,'-]{0,40}") {
                let normalizer = NameNormalizer::default();
                let once = normalizer.normalize(&name);
                prop_assert_eq!(normalizer.normalize(&once), once.clone());
            }

            #[test]
            fn prop_tokens_are_lowercase_and_clean(name in "[A-Za-z\u{C0}-\u{FF} .,'-]{0,40}") {
                let analyzed = NameNormalizer::default().analyze(&name);
                for token in &analyzed.tokens {
                    prop_assert!(!token.is_empty());
                    prop_assert!(token.chars().all(|c| c.is_alphanumeric()));
                    prop_assert_eq!(token.to_lowercase(), token.clone());
                }
                prop_assert_eq!(analyzed.tokens.join(" "), analyzed.normalized);
            }
        }
    }
}
