//! Name similarity with a family-member guard.
//!
//! Scores are tiered so that the tier, not fine-grained arithmetic, decides
//! what happens to a pair:
//!
//! | basis        | score            |
//! |--------------|------------------|
//! | exact        | 1.0              |
//! | normalized   | 0.95             |
//! | token subset | [0.9, 0.94]      |
//! | partial      | raw Jaccard × damping (≤ 0.5) |
//! | family guard | 0.0              |

use rapidfuzz::distance::levenshtein;
use serde::Serialize;

use crate::config::ResolverConfig;
use crate::services::normalize::{NameNormalizer, NormalizedName};
use crate::utils::math::{clamp_unit, soft_jaccard};

pub const EXACT_SCORE: f64 = 1.0;
pub const NORMALIZED_SCORE: f64 = 0.95;
pub const SUBSET_BASE_SCORE: f64 = 0.9;
const SUBSET_COVERAGE_BONUS: f64 = 0.04;

/// Shortest token treated as a nickname stem ("Huck" → "Huckleberry").
const NICKNAME_MIN_LEN: usize = 3;
/// Tokens at least this long may match on spelling similarity.
const TYPO_MIN_LEN: usize = 4;
const TYPO_SIMILARITY: f64 = 0.85;

/// Which rule produced a similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchBasis {
    Exact,
    Normalized,
    TokenSubset,
    /// A bare surname against a full name sharing it ("Bennet" / "Jane Bennet").
    SurnameOnly,
    Partial,
    FamilyGuard,
    NoMatch,
}

/// Score in [0, 1] plus the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Similarity {
    pub score: f64,
    pub basis: MatchBasis,
}

impl Similarity {
    fn new(score: f64, basis: MatchBasis) -> Self {
        Self {
            score: clamp_unit(score),
            basis,
        }
    }

    fn none() -> Self {
        Self::new(0.0, MatchBasis::NoMatch)
    }
}

/// A raw name paired with its normalized analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedName {
    pub raw: String,
    pub norm: NormalizedName,
}

impl AnalyzedName {
    pub fn new(raw: &str, normalizer: &NameNormalizer) -> Self {
        Self {
            raw: raw.trim().to_string(),
            norm: normalizer.analyze(raw),
        }
    }
}

/// Decides whether two name strings plausibly denote one identity.
#[derive(Debug, Clone)]
pub struct SimilarityScorer {
    normalizer: NameNormalizer,
    damping: f64,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new(NameNormalizer::default(), 0.5)
    }
}

impl SimilarityScorer {
    pub fn new(normalizer: NameNormalizer, damping: f64) -> Self {
        Self {
            normalizer,
            damping: damping.clamp(0.0, 0.5),
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        let mut normalizer = NameNormalizer::default();
        normalizer.extend_honorifics(config.extra_honorifics.iter().map(String::as_str));
        Self::new(normalizer, config.jaccard_damping)
    }

    pub fn normalizer(&self) -> &NameNormalizer {
        &self.normalizer
    }

    pub fn analyze(&self, name: &str) -> AnalyzedName {
        AnalyzedName::new(name, &self.normalizer)
    }

    /// Confidence in [0, 1] that `a` and `b` name the same identity.
    pub fn score(&self, a: &str, b: &str) -> f64 {
        self.compare(a, b).score
    }

    pub fn compare(&self, a: &str, b: &str) -> Similarity {
        self.compare_analyzed(&self.analyze(a), &self.analyze(b))
    }

    /// Whether `a` and `b` look like two members of one family: same
    /// surname, different first names, nothing else shared.
    pub fn family_conflict(&self, a: &str, b: &str) -> bool {
        is_family_conflict(&self.normalizer.analyze(a), &self.normalizer.analyze(b))
    }

    pub fn compare_analyzed(&self, a: &AnalyzedName, b: &AnalyzedName) -> Similarity {
        if a.raw.is_empty() || b.raw.is_empty() {
            return Similarity::none();
        }
        if a.raw.to_lowercase() == b.raw.to_lowercase() {
            return Similarity::new(EXACT_SCORE, MatchBasis::Exact);
        }
        if a.norm.is_empty() || b.norm.is_empty() {
            return Similarity::none();
        }
        if a.norm.normalized == b.norm.normalized {
            return Similarity::new(NORMALIZED_SCORE, MatchBasis::Normalized);
        }
        if is_family_conflict(&a.norm, &b.norm) {
            return Similarity::new(0.0, MatchBasis::FamilyGuard);
        }

        let (shorter, longer) = if a.norm.token_set().len() <= b.norm.token_set().len() {
            (&a.norm, &b.norm)
        } else {
            (&b.norm, &a.norm)
        };
        let short_set = shorter.token_set();
        let long_set = longer.token_set();

        if short_set.is_subset(&long_set) {
            if is_bare_surname(shorter, longer) {
                let raw = short_set.len() as f64 / long_set.len() as f64;
                return Similarity::new(raw * self.damping, MatchBasis::SurnameOnly);
            }
            let coverage = short_set.len() as f64 / long_set.len() as f64;
            return Similarity::new(
                SUBSET_BASE_SCORE + SUBSET_COVERAGE_BONUS * coverage,
                MatchBasis::TokenSubset,
            );
        }

        let a_tokens: Vec<&str> = a.norm.tokens.iter().map(String::as_str).collect();
        let b_tokens: Vec<&str> = b.norm.tokens.iter().map(String::as_str).collect();
        // Greedy pairing depends on iteration order; taking both directions
        // keeps the score symmetric.
        let raw = soft_jaccard(&a_tokens, &b_tokens, tokens_equivalent)
            .max(soft_jaccard(&b_tokens, &a_tokens, tokens_equivalent));
        if raw == 0.0 {
            return Similarity::none();
        }
        Similarity::new(raw * self.damping, MatchBasis::Partial)
    }

    /// Best similarity between two identities, each given as a primary name
    /// followed by aliases.
    ///
    /// A family conflict between the primary names wins over any alias
    /// evidence: shared aliases such as "Miss Bennet" are exactly how
    /// siblings get conflated.
    pub fn compare_identities(&self, a: &[AnalyzedName], b: &[AnalyzedName]) -> Similarity {
        let (Some(a_primary), Some(b_primary)) = (a.first(), b.first()) else {
            return Similarity::none();
        };
        if is_family_conflict(&a_primary.norm, &b_primary.norm) {
            return Similarity::new(0.0, MatchBasis::FamilyGuard);
        }

        let mut best = Similarity::none();
        for x in a {
            for y in b {
                let sim = self.compare_analyzed(x, y);
                if sim.score > best.score {
                    best = sim;
                    if best.score >= EXACT_SCORE {
                        return best;
                    }
                }
            }
        }
        best
    }
}

/// Token-level equivalence for partial matching: equal, nickname stem, or
/// a close spelling variant.
fn tokens_equivalent(x: &str, y: &str) -> bool {
    if x == y {
        return true;
    }
    let (short, long) = if x.chars().count() <= y.chars().count() {
        (x, y)
    } else {
        (y, x)
    };
    if short.chars().count() >= NICKNAME_MIN_LEN && long.starts_with(short) {
        return true;
    }
    short.chars().count() >= TYPO_MIN_LEN
        && levenshtein::normalized_similarity(short.chars(), long.chars()) >= TYPO_SIMILARITY
}

fn is_bare_surname(shorter: &NormalizedName, longer: &NormalizedName) -> bool {
    shorter.tokens.len() == 1 && longer.tokens.len() >= 2 && shorter.last_token() == longer.last_token()
}

/// Same surname, differing first names, and the surname is the only token
/// the two names share.
fn is_family_conflict(a: &NormalizedName, b: &NormalizedName) -> bool {
    if a.tokens.len() < 2 || b.tokens.len() < 2 {
        return false;
    }
    let (Some(a_first), Some(b_first)) = (a.first_token(), b.first_token()) else {
        return false;
    };
    if a.last_token() != b.last_token() || tokens_equivalent(a_first, b_first) {
        return false;
    }
    let shared: Vec<&str> = a
        .token_set()
        .intersection(&b.token_set())
        .copied()
        .collect();
    shared.len() == 1
}
