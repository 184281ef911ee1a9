//! Inverted name index for candidate retrieval.
//!
//! Replaces exhaustive pairwise comparison: each entry is reachable through
//! its exact name, normalized name, first token, last token, first-token
//! prefix (nicknames) and aliases. Lookup cost is proportional to the hits,
//! not to the number of entries.

use std::collections::{BTreeSet, HashMap};

use crate::models::RawMention;
use crate::services::similarity::{AnalyzedName, Similarity, SimilarityScorer};

/// Length of the first-token prefix key ("huc" for both "Huck" and "Huckleberry").
const PREFIX_LEN: usize = 3;

/// A candidate entry with its similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub index: usize,
    pub similarity: Similarity,
}

#[derive(Debug, Default)]
pub struct CandidateIndex {
    /// Primary name followed by aliases, per entry.
    entries: Vec<Vec<AnalyzedName>>,
    exact: HashMap<String, Vec<usize>>,
    normalized: HashMap<String, Vec<usize>>,
    first_token: HashMap<String, Vec<usize>>,
    last_token: HashMap<String, Vec<usize>>,
    prefix: HashMap<String, Vec<usize>>,
    alias: HashMap<String, Vec<usize>>,
}

fn push_key(map: &mut HashMap<String, Vec<usize>>, key: &str, idx: usize) {
    if key.is_empty() {
        return;
    }
    let bucket = map.entry(key.to_string()).or_default();
    if bucket.last() != Some(&idx) {
        bucket.push(idx);
    }
}

fn prefix_key(name: &AnalyzedName) -> Option<String> {
    let first = name.norm.first_token()?;
    if first.chars().count() < PREFIX_LEN {
        return None;
    }
    Some(first.chars().take(PREFIX_LEN).collect())
}

/// Analyze a mention's name followed by its aliases.
pub fn analyze_mention(mention: &RawMention, scorer: &SimilarityScorer) -> Vec<AnalyzedName> {
    std::iter::once(mention.name.as_str())
        .chain(mention.aliases.iter().map(String::as_str))
        .map(|name| scorer.analyze(name))
        .filter(|name| !name.raw.is_empty())
        .collect()
}

impl CandidateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of an indexed entry, primary first.
    pub fn names(&self, idx: usize) -> &[AnalyzedName] {
        self.entries.get(idx).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Index an entry given as primary name followed by aliases. Returns its index.
    pub fn insert(&mut self, names: Vec<AnalyzedName>) -> usize {
        let idx = self.entries.len();

        if let Some(primary) = names.first() {
            push_key(&mut self.exact, &primary.raw.to_lowercase(), idx);
            push_key(&mut self.normalized, &primary.norm.normalized, idx);
            if let Some(first) = primary.norm.first_token() {
                push_key(&mut self.first_token, first, idx);
            }
            if let Some(last) = primary.norm.last_token() {
                push_key(&mut self.last_token, last, idx);
            }
            if let Some(prefix) = prefix_key(primary) {
                push_key(&mut self.prefix, &prefix, idx);
            }
        }
        for alias in names.iter().skip(1) {
            push_key(&mut self.alias, &alias.raw.to_lowercase(), idx);
            push_key(&mut self.alias, &alias.norm.normalized, idx);
        }

        self.entries.push(names);
        idx
    }

    pub fn insert_mention(&mut self, mention: &RawMention, scorer: &SimilarityScorer) -> usize {
        self.insert(analyze_mention(mention, scorer))
    }

    /// Unfiltered candidate set for a query identity, excluding `exclude`.
    pub fn lookup(&self, query: &[AnalyzedName], exclude: Option<usize>) -> BTreeSet<usize> {
        let mut hits = BTreeSet::new();
        let mut collect = |map: &HashMap<String, Vec<usize>>, key: &str| {
            if let Some(bucket) = map.get(key) {
                hits.extend(bucket.iter().copied());
            }
        };

        for name in query {
            let lower = name.raw.to_lowercase();
            collect(&self.exact, &lower);
            collect(&self.alias, &lower);
            if name.norm.is_empty() {
                continue;
            }
            collect(&self.normalized, &name.norm.normalized);
            collect(&self.alias, &name.norm.normalized);
            if let Some(first) = name.norm.first_token() {
                collect(&self.first_token, first);
            }
            if let Some(last) = name.norm.last_token() {
                collect(&self.last_token, last);
            }
            if let Some(prefix) = prefix_key(name) {
                collect(&self.prefix, &prefix);
            }
        }

        if let Some(own) = exclude {
            hits.remove(&own);
        }
        hits
    }

    /// Unfiltered candidates for a single free-form name.
    pub fn lookup_name(&self, name: &str, scorer: &SimilarityScorer) -> BTreeSet<usize> {
        self.lookup(&[scorer.analyze(name)], None)
    }

    /// Candidates for a query identity scoring at least `floor`, best first.
    pub fn candidates_for(
        &self,
        query: &[AnalyzedName],
        exclude: Option<usize>,
        scorer: &SimilarityScorer,
        floor: f64,
    ) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = self
            .lookup(query, exclude)
            .into_iter()
            .map(|index| ScoredCandidate {
                index,
                similarity: scorer.compare_identities(query, self.names(index)),
            })
            .filter(|c| c.similarity.score > 0.0 && c.similarity.score >= floor)
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .score
                .partial_cmp(&a.similarity.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });
        scored
    }

    /// Candidates for an already indexed entry. Never returns `idx` itself.
    pub fn candidates(
        &self,
        idx: usize,
        scorer: &SimilarityScorer,
        floor: f64,
    ) -> Vec<ScoredCandidate> {
        self.candidates_for(self.names(idx), Some(idx), scorer, floor)
    }
}
