//! Character registry: owns the canonical list and drives resolution passes.
//!
//! The registry is an explicit value with a single writer: both resolution
//! entry points take `&mut self`, so only one pass touches the character
//! list at a time.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::models::{Character, RawMention, RegistryRecord};
use crate::services::candidate_index::CandidateIndex;
use crate::services::clustering::cluster_mentions;
use crate::services::merger::{GroupMerger, MergeOutcome};
use crate::services::similarity::{Similarity, SimilarityScorer};
use crate::services::stats::RegistryStats;
use crate::services::verifier::Verifier;
use crate::DramatisError;

/// A registry character that plausibly answers a name query.
#[derive(Debug, Clone)]
pub struct Suggestion<'a> {
    pub character: &'a Character,
    pub similarity: Similarity,
}

#[derive(Debug, Clone)]
pub struct Registry {
    config: ResolverConfig,
    scorer: SimilarityScorer,
    characters: Vec<Character>,
    stats: RegistryStats,
}

impl Registry {
    pub fn new(config: ResolverConfig) -> Self {
        let scorer = SimilarityScorer::from_config(&config);
        Self {
            config,
            scorer,
            characters: Vec::new(),
            stats: RegistryStats::new(),
        }
    }

    /// A registry holding previously resolved characters.
    pub fn with_characters(config: ResolverConfig, characters: Vec<Character>) -> Self {
        let mut registry = Self::new(config);
        registry.characters = characters;
        for character in &mut registry.characters {
            if character.enforce_alias_invariant() {
                warn!(name = %character.name, "Loaded character listed its own name as an alias");
            }
        }
        registry
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn scorer(&self) -> &SimilarityScorer {
        &self.scorer
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    /// Counters accumulated over every pass on this registry.
    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Resolve `mentions` from scratch, replacing the current characters.
    ///
    /// Returns this pass's counters.
    pub async fn resolve_batch(
        &mut self,
        mentions: &[RawMention],
        verifier: &dyn Verifier,
    ) -> RegistryStats {
        let (outcome, pass) = self.run_pass(mentions, 0, verifier).await;
        self.characters = outcome.characters;
        self.stats.accumulate(&pass);
        info!(
            mentions = mentions.len(),
            characters = self.characters.len(),
            "batch resolution complete"
        );
        pass
    }

    /// Resolve `mentions` against the existing characters.
    ///
    /// Existing characters enter the pass as seed mentions ahead of the new
    /// ones, so they can absorb new surface forms. A character that absorbs
    /// nothing is kept exactly as it was, and the verifier is only asked
    /// about pairs that involve a new mention.
    pub async fn resolve_incremental(
        &mut self,
        mentions: &[RawMention],
        verifier: &dyn Verifier,
    ) -> RegistryStats {
        if self.characters.is_empty() {
            return self.resolve_batch(mentions, verifier).await;
        }

        let seeds = self.characters.len();
        let mut all: Vec<RawMention> = self
            .characters
            .iter()
            .map(Character::to_seed_mention)
            .collect();
        all.extend(mentions.iter().cloned());

        let (outcome, mut pass) = self.run_pass(&all, seeds, verifier).await;
        pass.total_checked = mentions.len();

        let previous = std::mem::take(&mut self.characters);
        self.characters = reconcile(previous, seeds, outcome);
        self.stats.accumulate(&pass);
        info!(
            mentions = mentions.len(),
            characters = self.characters.len(),
            "incremental resolution complete"
        );
        pass
    }

    /// Cluster and merge one pass. Mentions `0..seeds` are settled characters
    /// and are never verified against each other again.
    async fn run_pass(
        &self,
        mentions: &[RawMention],
        seeds: usize,
        verifier: &dyn Verifier,
    ) -> (MergeOutcome, RegistryStats) {
        let mut pass = RegistryStats {
            passes: 1,
            ..Default::default()
        };
        let clustering = cluster_mentions(mentions, &self.scorer, &self.config);
        pass.record_clustering(&clustering.stats);
        let outcome = GroupMerger::new(verifier, &self.config)
            .with_frozen(seeds)
            .merge(mentions, &clustering, &mut pass)
            .await;
        (outcome, pass)
    }

    /// Find a character by canonical name or alias, ignoring case and
    /// honorifics. Canonical names win over aliases.
    pub fn lookup(&self, name: &str) -> Option<&Character> {
        let query = name.trim();
        let wanted = self.scorer.normalizer().normalize(query);
        if wanted.is_empty() {
            return None;
        }
        let normalizer = self.scorer.normalizer();
        let same = |candidate: &str| {
            candidate.trim().eq_ignore_ascii_case(query) || normalizer.normalize(candidate) == wanted
        };

        self.characters
            .iter()
            .find(|c| same(&c.name))
            .or_else(|| self.characters.iter().find(|c| c.aliases.iter().any(|a| same(a))))
    }

    /// Characters resembling `name`, best first.
    pub fn suggest(&self, name: &str, limit: usize) -> Vec<Suggestion<'_>> {
        let mut index = CandidateIndex::new();
        for character in &self.characters {
            index.insert_mention(&character.to_seed_mention(), &self.scorer);
        }
        index
            .candidates_for(&[self.scorer.analyze(name)], None, &self.scorer, f64::MIN_POSITIVE)
            .into_iter()
            .take(limit)
            .map(|c| Suggestion {
                character: &self.characters[c.index],
                similarity: c.similarity,
            })
            .collect()
    }

    pub fn record(&self) -> RegistryRecord {
        RegistryRecord::new(self.characters.clone())
    }

    /// Write the registry record as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), DramatisError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.record())?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), characters = self.characters.len(), "registry saved");
        Ok(())
    }

    /// Read a registry record written by [`save`](Self::save).
    pub fn load(path: &Path, config: ResolverConfig) -> Result<Self, DramatisError> {
        let contents = std::fs::read_to_string(path)?;
        let record: RegistryRecord = serde_json::from_str(&contents)?;
        if record.metadata.total != record.characters.len() {
            warn!(
                path = %path.display(),
                "Registry metadata counts {} characters but {} are stored",
                record.metadata.total,
                record.characters.len()
            );
        }
        Ok(Self::with_characters(config, record.characters))
    }
}

/// Map an incremental pass back onto the characters that seeded it.
///
/// Mentions `0..seeds` of the pass are the previous characters, in order.
fn reconcile(previous: Vec<Character>, seeds: usize, outcome: MergeOutcome) -> Vec<Character> {
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); outcome.characters.len()];
    for (mention, &character) in outcome.assignment.iter().enumerate() {
        members[character].push(mention);
    }

    let mut previous: Vec<Option<Character>> = previous.into_iter().map(Some).collect();
    outcome
        .characters
        .into_iter()
        .zip(members)
        .map(|(mut character, members)| {
            let seed_ids: Vec<usize> = members.iter().copied().filter(|&m| m < seeds).collect();
            if members.len() == 1 && seed_ids.len() == 1 {
                if let Some(old) = previous[seed_ids[0]].take() {
                    return old;
                }
            }

            for &seed in &seed_ids {
                if let Some(old) = previous[seed].take() {
                    character.source_chunks.extend(old.source_chunks);
                    character.confidence = character.confidence.max(old.confidence);
                    let mut extra: BTreeSet<String> = old.aliases;
                    extra.insert(old.name);
                    character.aliases.extend(extra);
                }
            }
            let name = character.name.clone();
            character.aliases.retain(|a| !a.eq_ignore_ascii_case(&name));
            character
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::verifier::{
        DecisionTableVerifier, NoopVerifier, VerificationItem, VerificationVerdict,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn huck_table() -> DecisionTableVerifier {
        let mut table = DecisionTableVerifier::new();
        table.insert("Huckleberry Finn", ["Huck", "Huckleberry"]);
        table.insert("Tom Sawyer", ["Tom"]);
        table
    }

    #[tokio::test]
    async fn test_resolve_batch_replaces_characters() {
        let mut registry = Registry::new(ResolverConfig::default());
        registry
            .resolve_batch(&[RawMention::new("Jim", 0)], &NoopVerifier)
            .await;
        registry
            .resolve_batch(&[RawMention::new("Aunt Polly", 1)], &NoopVerifier)
            .await;
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.characters()[0].name, "Aunt Polly");
        assert_eq!(registry.stats().passes, 2);
    }

    #[tokio::test]
    async fn test_incremental_absorbs_new_surface_forms() {
        let table = huck_table();
        let mut registry = Registry::new(ResolverConfig::default());
        registry
            .resolve_incremental(
                &[RawMention::new("Huckleberry Finn", 0), RawMention::new("Jim", 0)],
                &table,
            )
            .await;
        let pass = registry
            .resolve_incremental(&[RawMention::new("Huck", 1), RawMention::new("Jim", 1)], &table)
            .await;

        assert_eq!(pass.total_checked, 2);
        assert_eq!(registry.len(), 2);
        let huck = registry.lookup("Huck").expect("huck");
        assert_eq!(huck.name, "Huckleberry Finn");
        assert_eq!(huck.source_chunks, BTreeSet::from([0, 1]));
        let jim = registry.lookup("jim").expect("jim");
        assert_eq!(jim.source_chunks, BTreeSet::from([0, 1]));
    }

    #[tokio::test]
    async fn test_untouched_characters_are_kept_verbatim() {
        let mut registry = Registry::with_characters(
            ResolverConfig::default(),
            vec![Character::from_mention(&RawMention::new("Widow Douglas", 3), 0.42)],
        );
        registry
            .resolve_incremental(&[RawMention::new("Jim", 4)], &NoopVerifier)
            .await;
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.characters()[0].confidence, 0.42);
        assert_eq!(registry.characters()[0].source_chunks, BTreeSet::from([3]));
    }

    #[test]
    fn test_lookup_prefers_canonical_name() {
        let registry = Registry::with_characters(
            ResolverConfig::default(),
            vec![
                Character::from_mention(&RawMention::new("Tom Sawyer", 0).with_alias("Tom"), 0.9),
                Character::from_mention(&RawMention::new("Tom", 1), 0.7),
            ],
        );
        assert_eq!(registry.lookup("tom").map(|c| c.confidence), Some(0.7));
        assert_eq!(registry.lookup("Mr. Sawyer"), None);
        assert_eq!(
            registry.lookup("Mr. Tom Sawyer").map(|c| c.name.as_str()),
            Some("Tom Sawyer")
        );
        assert!(registry.lookup("   ").is_none());
    }

    #[test]
    fn test_suggest_ranks_similar_names() {
        let registry = Registry::with_characters(
            ResolverConfig::default(),
            vec![
                Character::from_mention(&RawMention::new("Huckleberry Finn", 0), 0.9),
                Character::from_mention(&RawMention::new("Tom Sawyer", 0), 0.9),
            ],
        );
        let found = registry.suggest("Huck", 5);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].character.name, "Huckleberry Finn");
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("registry.json");

        let mut registry = Registry::new(ResolverConfig::default());
        registry
            .resolve_batch(
                &[
                    RawMention::new("Huckleberry Finn", 0),
                    RawMention::new("Huck", 1),
                    RawMention::new("Miss Watson", 1),
                ],
                &huck_table(),
            )
            .await;
        registry.save(&path).expect("save");

        let loaded = Registry::load(&path, ResolverConfig::default()).expect("load");
        assert_eq!(loaded.characters(), registry.characters());
        let record = loaded.record();
        assert_eq!(record.metadata.total, 2);
    }

    /// Rejects everything and counts the calls it receives.
    #[derive(Default)]
    struct CountingNoop {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Verifier for CountingNoop {
        async fn batch_verify(
            &self,
            items: &[VerificationItem],
        ) -> Result<Vec<VerificationVerdict>, DramatisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            NoopVerifier.batch_verify(items).await
        }
    }

    #[tokio::test]
    async fn test_rejected_seeds_are_not_asked_again() {
        let verifier = CountingNoop::default();
        let mut registry = Registry::new(ResolverConfig::default());
        registry
            .resolve_incremental(
                &[RawMention::new("Tom Sawyer", 0), RawMention::new("Tom", 0)],
                &verifier,
            )
            .await;
        registry
            .resolve_incremental(&[RawMention::new("Jim", 1)], &verifier)
            .await;
        registry
            .resolve_incremental(&[RawMention::new("Aunt Polly", 2)], &verifier)
            .await;

        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.stats().rejected_components, 1);
        assert_eq!(registry.stats().verifier_calls, 1);
        let names: Vec<&str> = registry.characters().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Tom Sawyer", "Tom", "Jim", "Aunt Polly"]);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Registry::load(&dir.path().join("absent.json"), ResolverConfig::default())
            .expect_err("missing");
        assert!(matches!(err, DramatisError::Io(_)));
    }
}
