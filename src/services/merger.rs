//! Component merging and attribute fusion.
//!
//! Components that need confirmation are resolved in rounds. Each round a
//! component asks whether its anchor group is the same identity as each of
//! its open groups, at most `max_representatives - 1` per item, and a match
//! fuses the anchor with the one group the verdict names. Items from every
//! component share verifier calls (up to `max_batch_items`), so round-trips
//! scale with batches, not components. A failed or malformed batch leaves
//! its components unmerged and the pass carries on.
//!
//! Mentions below the frozen boundary are settled characters from earlier
//! passes. They are never anchors, so a component made only of them is
//! emitted as it came in without asking the verifier.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::models::{Character, Gender, RawMention};
use crate::services::clustering::{Clustering, Component};
use crate::services::stats::RegistryStats;
use crate::services::verifier::{VerificationItem, VerificationVerdict, Verifier};
use crate::utils::text::truncate_chars;
use crate::DramatisError;

/// Characters produced by one merge pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub characters: Vec<Character>,
    /// `assignment[i]` is the index in `characters` that mention `i` became.
    pub assignment: Vec<usize>,
}

/// Characters built for one component, with the mentions each absorbed.
type Emitted = Vec<(Character, Vec<usize>)>;

/// Atoms the verifier has tied together, or a lone atom.
#[derive(Debug, Clone)]
struct Group {
    /// Mention indices, ascending.
    members: Vec<usize>,
    atoms: usize,
    /// Name the verifier affirmed for this identity.
    canonical: Option<String>,
    /// Weakest confirming verdict.
    confidence: Option<f64>,
    /// Holds a mention this pass may still decide about.
    fresh: bool,
    alive: bool,
    /// Already asked against every other open group.
    settled: bool,
}

impl Group {
    fn confirmed(&self) -> bool {
        self.confidence.is_some()
    }
}

/// Verification progress of one component across rounds.
///
/// Each round one fresh group (the anchor) is asked against the other open
/// groups. A verdict ties the anchor to the single group it names; groups
/// shown in a rejected item are settled against the anchor, and groups
/// shown beside a match are asked again next round.
#[derive(Debug)]
struct ComponentState {
    slot: usize,
    groups: Vec<Group>,
    anchor: Option<usize>,
    undecided: Vec<usize>,
    asked: bool,
    merged: bool,
    failed: bool,
    done: bool,
}

/// One verification item and the groups it showed.
struct Question {
    state: usize,
    shown: Vec<usize>,
    item: VerificationItem,
}

impl ComponentState {
    fn new(slot: usize, component: &Component, frozen: usize) -> Self {
        let groups = component
            .atoms
            .iter()
            .map(|atom| {
                let mut members = atom.clone();
                members.sort_unstable();
                Group {
                    fresh: members.iter().any(|&m| m >= frozen),
                    members,
                    atoms: 1,
                    canonical: None,
                    confidence: None,
                    alive: true,
                    settled: false,
                }
            })
            .collect();
        Self {
            slot,
            groups,
            anchor: None,
            undecided: Vec::new(),
            asked: false,
            merged: false,
            failed: false,
            done: false,
        }
    }

    /// Groups to show beside the anchor this round, in slices of `per_item`.
    /// Empty once nothing is left to ask.
    fn next_slices(&mut self, mentions: &[RawMention], per_item: usize) -> Vec<Vec<usize>> {
        if self.done {
            return Vec::new();
        }
        loop {
            let anchor = match self.anchor {
                Some(anchor) => anchor,
                None => {
                    let Some(anchor) = (0..self.groups.len())
                        .filter(|&g| {
                            let group = &self.groups[g];
                            group.alive && !group.settled && group.fresh
                        })
                        .min_by_key(|&g| shortest_name_len(mentions, &self.groups[g].members))
                    else {
                        self.done = true;
                        return Vec::new();
                    };
                    self.anchor = Some(anchor);
                    self.undecided = (0..self.groups.len())
                        .filter(|&g| g != anchor && self.groups[g].alive && !self.groups[g].settled)
                        .collect();
                    anchor
                }
            };
            if self.undecided.is_empty() {
                self.groups[anchor].settled = true;
                self.anchor = None;
                continue;
            }
            return self.undecided.chunks(per_item).map(<[usize]>::to_vec).collect();
        }
    }

    /// Tie `other` to the current anchor.
    fn absorb(&mut self, other: usize, name: Option<String>, confidence: f64) {
        let Some(anchor) = self.anchor else {
            return;
        };
        let taken = std::mem::take(&mut self.groups[other].members);
        self.groups[other].alive = false;
        let other_group = self.groups[other].clone();

        let group = &mut self.groups[anchor];
        group.members.extend(taken);
        group.members.sort_unstable();
        group.atoms += other_group.atoms;
        group.fresh |= other_group.fresh;
        group.canonical = group.canonical.take().or(other_group.canonical).or(name);
        let weakest = [group.confidence, other_group.confidence]
            .into_iter()
            .flatten()
            .fold(confidence, f64::min);
        group.confidence = Some(weakest);

        self.undecided.retain(|&g| g != other);
        self.merged = true;
    }

    fn settle_against_anchor(&mut self, shown: &[usize]) {
        self.undecided.retain(|g| !shown.contains(g));
    }

    /// Mentions that never got a confirmed merge.
    fn unconfirmed_mentions(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| g.alive && !g.confirmed())
            .map(|g| g.members.len())
            .sum()
    }
}

fn shortest_name_len(mentions: &[RawMention], members: &[usize]) -> (usize, usize) {
    let len = members
        .iter()
        .map(|&m| mentions[m].name.trim().chars().count())
        .min()
        .unwrap_or(usize::MAX);
    (len, members.first().copied().unwrap_or(usize::MAX))
}

pub struct GroupMerger<'a> {
    verifier: &'a dyn Verifier,
    config: &'a ResolverConfig,
    frozen: usize,
}

impl<'a> GroupMerger<'a> {
    pub fn new(verifier: &'a dyn Verifier, config: &'a ResolverConfig) -> Self {
        Self {
            verifier,
            config,
            frozen: 0,
        }
    }

    /// Treat mentions `0..seeds` as already resolved: the verifier is never
    /// asked to relate two of them to each other.
    pub fn with_frozen(mut self, seeds: usize) -> Self {
        self.frozen = seeds;
        self
    }

    /// Turn every component of `clustering` into one or more characters.
    pub async fn merge(
        &self,
        mentions: &[RawMention],
        clustering: &Clustering,
        stats: &mut RegistryStats,
    ) -> MergeOutcome {
        let mut emitted: Vec<Option<Emitted>> = vec![None; clustering.components.len()];
        let mut states: Vec<ComponentState> = Vec::new();

        for (slot, component) in clustering.components.iter().enumerate() {
            stats.fast_matches += component
                .atoms
                .iter()
                .map(|atom| atom.len() - 1)
                .sum::<usize>();

            if component.needs_verification() {
                states.push(ComponentState::new(slot, component, self.frozen));
            } else {
                emitted[slot] = Some(self.emit_atoms(mentions, component));
            }
        }

        let per_item = self.config.max_representatives.saturating_sub(1).max(1);
        let mut round = 0;
        loop {
            let mut questions: Vec<Question> = Vec::new();
            for (idx, state) in states.iter_mut().enumerate() {
                let slices = state.next_slices(mentions, per_item);
                push_questions(&mut questions, idx, state, slices, mentions, self.config);
            }
            if questions.is_empty() {
                break;
            }
            round += 1;
            debug!(round, items = questions.len(), "verification round");

            let mut answers: Vec<Option<VerificationVerdict>> = vec![None; questions.len()];
            let batch_size = self.config.max_batch_items.max(1);
            for (batch_no, batch) in questions.chunks(batch_size).enumerate() {
                let offset = batch_no * batch_size;
                match self.ask(batch).await {
                    Some(verdicts) => {
                        for (i, verdict) in verdicts.into_iter().enumerate() {
                            answers[offset + i] = Some(verdict);
                        }
                    }
                    None => {
                        stats.failed_batches += 1;
                        for question in batch {
                            states[question.state].failed = true;
                        }
                    }
                }
                stats.verifier_calls += 1;
                stats.items_verified += batch.len();
            }

            for (question, answer) in questions.iter().zip(answers) {
                let state = &mut states[question.state];
                if state.failed {
                    continue;
                }
                let Some(verdict) = answer else {
                    continue;
                };
                state.asked = true;
                match resolve_named(mentions, state, &question.shown, &verdict) {
                    Some((group, name)) => {
                        debug!(
                            new_name = %question.item.new_name,
                            matching = name.as_deref().unwrap_or_default(),
                            "pair confirmed"
                        );
                        stats.mentions_merged += state.groups[group].atoms;
                        let confidence = if verdict.confidence > 0.0 {
                            verdict.confidence
                        } else {
                            self.config.auto_accept
                        };
                        state.absorb(group, name, confidence);
                    }
                    None => {
                        debug!(new_name = %question.item.new_name, "candidates rejected");
                        state.settle_against_anchor(&question.shown);
                    }
                }
            }

            for state in states.iter_mut().filter(|s| s.failed && !s.done) {
                state.done = true;
                stats.degraded_components += 1;
                stats.unresolved_mentions += state.unconfirmed_mentions();
            }
        }

        for state in states {
            if state.asked && !state.merged && !state.failed {
                stats.rejected_components += 1;
            }
            let slot = state.slot;
            emitted[slot] = Some(self.emit_groups(mentions, state));
        }

        let outcome = assemble(mentions, emitted, self.config.singleton_confidence);
        info!(
            mentions = mentions.len(),
            characters = outcome.characters.len(),
            verifier_calls = stats.verifier_calls,
            rounds = round,
            merged = stats.mentions_merged,
            degraded = stats.degraded_components,
            "merge pass complete"
        );
        outcome
    }

    /// One verifier call. `None` when the batch failed or came back malformed.
    async fn ask(&self, batch: &[Question]) -> Option<Vec<VerificationVerdict>> {
        let items: Vec<VerificationItem> = batch.iter().map(|q| q.item.clone()).collect();
        match self.verifier.batch_verify(&items).await {
            Ok(verdicts) if verdicts.len() == items.len() => Some(verdicts),
            Ok(verdicts) => {
                warn!(
                    verifier = self.verifier.name(),
                    "Verifier returned {} verdicts for {} items. Leaving batch unmerged.",
                    verdicts.len(),
                    items.len()
                );
                None
            }
            Err(e) => {
                warn!(
                    verifier = self.verifier.name(),
                    items = items.len(),
                    "Verification batch failed: {}. Leaving batch unmerged.",
                    e
                );
                None
            }
        }
    }

    fn emit_groups(&self, mentions: &[RawMention], state: ComponentState) -> Emitted {
        if state.failed {
            debug!(
                groups = state.groups.iter().filter(|g| g.alive).count(),
                "component left unmerged after verifier failure"
            );
        }
        let mut groups: Vec<Group> = state.groups.into_iter().filter(|g| g.alive).collect();
        groups.sort_by_key(|g| g.members.first().copied());
        groups
            .into_iter()
            .map(|group| {
                let members: Vec<&RawMention> = group.members.iter().map(|&m| &mentions[m]).collect();
                let confidence = group.confidence.unwrap_or(if group.members.len() == 1 {
                    self.config.singleton_confidence
                } else {
                    self.config.fast_confidence
                });
                (fuse(&members, group.canonical.as_deref(), confidence), group.members)
            })
            .collect()
    }

    fn emit_atoms(&self, mentions: &[RawMention], component: &Component) -> Emitted {
        component
            .atoms
            .iter()
            .map(|atom| {
                let members: Vec<&RawMention> = atom.iter().map(|&m| &mentions[m]).collect();
                let confidence = if atom.len() == 1 {
                    self.config.singleton_confidence
                } else {
                    self.config.fast_confidence
                };
                (fuse(&members, None, confidence), atom.clone())
            })
            .collect()
    }
}

/// Queue one item per slice: the anchor's shortest name against one
/// representative per shown group, with bounded context.
fn push_questions(
    questions: &mut Vec<Question>,
    idx: usize,
    state: &ComponentState,
    slices: Vec<Vec<usize>>,
    mentions: &[RawMention],
    config: &ResolverConfig,
) {
    let Some(anchor) = state.anchor else {
        return;
    };
    let anchor_members = &state.groups[anchor].members;
    let new_name = distinct_names(anchor_members.iter().map(|&m| mentions[m].name.as_str()))
        .into_iter()
        .min_by_key(|n| n.chars().count())
        .unwrap_or_default();

    for shown in slices {
        let candidate_names: Vec<String> = shown
            .iter()
            .map(|&g| {
                distinct_names(state.groups[g].members.iter().map(|&m| mentions[m].name.as_str()))
                    .into_iter()
                    .fold(String::new(), |best, n| {
                        if n.chars().count() > best.chars().count() {
                            n
                        } else {
                            best
                        }
                    })
            })
            .collect();

        let descriptions = distinct_names(
            anchor_members
                .iter()
                .chain(shown.iter().flat_map(|&g| state.groups[g].members.iter()))
                .map(|&m| mentions[m].description.as_str()),
        );
        let context = truncate_chars(&descriptions.join("; "), config.max_context_chars);

        questions.push(Question {
            state: idx,
            shown,
            item: VerificationItem {
                new_name: new_name.clone(),
                candidate_names,
                context,
            },
        });
    }
}

/// The shown group a positive verdict names, and the spelling it used.
///
/// A verdict naming nothing counts only when a single group was shown; a
/// name outside the shown groups confirms nothing.
fn resolve_named(
    mentions: &[RawMention],
    state: &ComponentState,
    shown: &[usize],
    verdict: &VerificationVerdict,
) -> Option<(usize, Option<String>)> {
    if !verdict.is_match {
        return None;
    }
    let live: Vec<usize> = shown
        .iter()
        .copied()
        .filter(|&g| state.groups[g].alive)
        .collect();
    match verdict.matching_candidate.as_deref().map(str::trim) {
        Some(wanted) if !wanted.is_empty() => live.into_iter().find_map(|g| {
            state.groups[g]
                .members
                .iter()
                .flat_map(|&m| {
                    std::iter::once(mentions[m].name.as_str())
                        .chain(mentions[m].aliases.iter().map(String::as_str))
                })
                .map(str::trim)
                .find(|name| name.eq_ignore_ascii_case(wanted))
                .map(|name| (g, Some(name.to_string())))
        }),
        _ if live.len() == 1 => Some((live[0], None)),
        _ => None,
    }
}

/// Flatten per-component output in component order and record which
/// character every mention became.
fn assemble(
    mentions: &[RawMention],
    emitted: Vec<Option<Emitted>>,
    fallback_confidence: f64,
) -> MergeOutcome {
    let mut outcome = MergeOutcome {
        characters: Vec::new(),
        assignment: vec![usize::MAX; mentions.len()],
    };
    for (character, members) in emitted.into_iter().flatten().flatten() {
        let idx = outcome.characters.len();
        for m in members {
            outcome.assignment[m] = idx;
        }
        outcome.characters.push(character);
    }

    let unassigned: Vec<usize> = (0..mentions.len())
        .filter(|&m| outcome.assignment[m] == usize::MAX)
        .collect();
    debug_assert!(unassigned.is_empty(), "mentions left unassigned: {:?}", unassigned);
    for m in unassigned {
        warn!(
            mention = m,
            "{}. Emitting it alone.",
            DramatisError::InvariantViolation("mention was not assigned to a character".into())
        );
        outcome.assignment[m] = outcome.characters.len();
        outcome
            .characters
            .push(Character::from_mention(&mentions[m], fallback_confidence));
    }
    outcome
}

/// Distinct non-empty strings, case-insensitively, in first-seen order.
/// Case variants collapse into the first spelling seen, so "JIM" after
/// "Jim" leaves no alias and is found again only by a case-insensitive
/// lookup.
fn distinct_names<'m>(names: impl Iterator<Item = &'m str>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    names
        .map(str::trim)
        .filter(|n| !n.is_empty() && seen.insert(n.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Fuse several mentions of one identity into a character.
///
/// - name: `canonical` when given, otherwise the longest name seen
/// - aliases: every other name and alias
/// - description: the longest non-empty one
/// - gender: first value that is not `unknown`
/// - importance: highest rank
pub fn fuse(members: &[&RawMention], canonical: Option<&str>, confidence: f64) -> Character {
    let names = distinct_names(members.iter().map(|m| m.name.as_str()));
    let name = canonical
        .map(str::to_string)
        .or_else(|| {
            names
                .iter()
                .fold(None::<&String>, |best, n| match best {
                    Some(b) if b.chars().count() >= n.chars().count() => Some(b),
                    _ => Some(n),
                })
                .cloned()
        })
        .unwrap_or_default();

    let aliases: BTreeSet<String> = distinct_names(
        members
            .iter()
            .flat_map(|m| std::iter::once(m.name.as_str()).chain(m.aliases.iter().map(String::as_str))),
    )
    .into_iter()
    .filter(|n| !n.eq_ignore_ascii_case(&name))
    .collect();

    let description = members
        .iter()
        .map(|m| m.description.trim())
        .fold("", |best, d| if d.chars().count() > best.chars().count() { d } else { best })
        .to_string();

    let gender = members
        .iter()
        .map(|m| m.gender_guess)
        .find(Gender::is_known)
        .unwrap_or_default();

    let importance = members
        .iter()
        .filter_map(|m| m.importance)
        .max()
        .unwrap_or_default();

    let mut pronouns = crate::models::Pronouns::new();
    for member in members {
        for (role, pronoun) in &member.pronouns {
            pronouns.entry(role.clone()).or_insert_with(|| pronoun.clone());
        }
    }

    let mut character = Character {
        name,
        gender,
        pronouns,
        aliases,
        description,
        importance,
        confidence: confidence.clamp(0.0, 1.0),
        source_chunks: members.iter().map(|m| m.source_chunk).collect(),
    };

    let corrected = character.enforce_alias_invariant();
    debug_assert!(!corrected, "alias set of {} held its own name", character.name);
    if corrected {
        warn!(
            "{}",
            DramatisError::InvariantViolation(format!(
                "alias set of {} held its own name; removed it",
                character.name
            ))
        );
    }
    character
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Importance;
    use crate::services::clustering::cluster_mentions;
    use crate::services::similarity::SimilarityScorer;
    use crate::services::verifier::{DecisionTableVerifier, NoopVerifier};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every batch and answers with a fixed result.
    struct Recording {
        batches: Mutex<Vec<Vec<VerificationItem>>>,
        answer: fn(&[VerificationItem]) -> Result<Vec<VerificationVerdict>, DramatisError>,
    }

    impl Recording {
        fn new(
            answer: fn(&[VerificationItem]) -> Result<Vec<VerificationVerdict>, DramatisError>,
        ) -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                answer,
            }
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().expect("lock").iter().map(Vec::len).collect()
        }
    }

    #[async_trait]
    impl Verifier for Recording {
        async fn batch_verify(
            &self,
            items: &[VerificationItem],
        ) -> Result<Vec<VerificationVerdict>, DramatisError> {
            self.batches.lock().expect("lock").push(items.to_vec());
            (self.answer)(items)
        }
    }

    fn accept_all(items: &[VerificationItem]) -> Result<Vec<VerificationVerdict>, DramatisError> {
        Ok(items
            .iter()
            .map(|i| VerificationVerdict::matched(i.candidate_names[0].clone(), 0.9))
            .collect())
    }

    fn always_fail(_: &[VerificationItem]) -> Result<Vec<VerificationVerdict>, DramatisError> {
        Err(DramatisError::Transport("provider unavailable".into()))
    }

    fn short_answer(_: &[VerificationItem]) -> Result<Vec<VerificationVerdict>, DramatisError> {
        Ok(vec![VerificationVerdict::rejected(1.0)])
    }

    /// Always names Huckleberry Finn, whatever it was shown.
    fn insists_on_finn(items: &[VerificationItem]) -> Result<Vec<VerificationVerdict>, DramatisError> {
        Ok(items
            .iter()
            .map(|_| VerificationVerdict::matched("Huckleberry Finn", 0.9))
            .collect())
    }

    /// "Huck" is any Huckleberry it is shown, and nobody else.
    fn huck_is_huckleberry(
        items: &[VerificationItem],
    ) -> Result<Vec<VerificationVerdict>, DramatisError> {
        Ok(items
            .iter()
            .map(|item| {
                match item
                    .candidate_names
                    .iter()
                    .find(|c| item.new_name == "Huck" && c.starts_with("Huckleberry"))
                {
                    Some(name) => VerificationVerdict::matched(name.clone(), 0.9),
                    None => VerificationVerdict::rejected(0.9),
                }
            })
            .collect())
    }

    async fn resolve(
        mentions: &[RawMention],
        verifier: &dyn Verifier,
        config: &ResolverConfig,
    ) -> (MergeOutcome, RegistryStats) {
        resolve_frozen(mentions, verifier, config, 0).await
    }

    async fn resolve_frozen(
        mentions: &[RawMention],
        verifier: &dyn Verifier,
        config: &ResolverConfig,
        seeds: usize,
    ) -> (MergeOutcome, RegistryStats) {
        let scorer = SimilarityScorer::from_config(config);
        let clustering = cluster_mentions(mentions, &scorer, config);
        let mut stats = RegistryStats::new();
        stats.record_clustering(&clustering.stats);
        let outcome = GroupMerger::new(verifier, config)
            .with_frozen(seeds)
            .merge(mentions, &clustering, &mut stats)
            .await;
        (outcome, stats)
    }

    fn names(outcome: &MergeOutcome) -> Vec<&str> {
        outcome.characters.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_fuse_attributes() {
        let a = RawMention::new("Huck", 1)
            .with_description("a boy")
            .with_importance(Importance::Supporting);
        let b = RawMention::new("Huckleberry Finn", 0)
            .with_gender(Gender::Male)
            .with_alias("Huck")
            .with_description("son of the town drunkard")
            .with_importance(Importance::Main)
            .with_pronoun("subject", "he");
        let c = RawMention::new("Huckleberry", 2).with_gender(Gender::Female);

        let fused = fuse(&[&a, &b, &c], Some("Huckleberry Finn"), 0.9);
        assert_eq!(fused.name, "Huckleberry Finn");
        assert_eq!(
            fused.aliases,
            BTreeSet::from(["Huck".to_string(), "Huckleberry".to_string()])
        );
        assert_eq!(fused.description, "son of the town drunkard");
        assert_eq!(fused.gender, Gender::Male);
        assert_eq!(fused.importance, Importance::Main);
        assert_eq!(fused.pronouns.get("subject").map(String::as_str), Some("he"));
        assert_eq!(fused.source_chunks, BTreeSet::from([0, 1, 2]));
    }

    #[test]
    fn test_fuse_defaults_to_longest_name() {
        let a = RawMention::new("Darcy", 0);
        let b = RawMention::new("Mr. Darcy", 3);
        let fused = fuse(&[&a, &b], None, 0.95);
        assert_eq!(fused.name, "Mr. Darcy");
        assert!(fused.aliases.contains("Darcy"));
        assert!(!fused.aliases.contains("Mr. Darcy"));
    }

    #[tokio::test]
    async fn test_singletons_pass_through() {
        let mentions = vec![RawMention::new("Jim", 0), RawMention::new("Aunt Polly", 1)];
        let verifier = Recording::new(accept_all);
        let config = ResolverConfig::default();
        let (outcome, stats) = resolve(&mentions, &verifier, &config).await;
        assert_eq!(names(&outcome), vec!["Jim", "Aunt Polly"]);
        assert!(outcome.characters.iter().all(|c| c.confidence == 0.7));
        assert_eq!(outcome.assignment, vec![0, 1]);
        assert!(verifier.batch_sizes().is_empty());
        assert_eq!(stats.verifier_calls, 0);
    }

    #[tokio::test]
    async fn test_exact_matches_skip_verifier() {
        let mentions = vec![RawMention::new("Mr. Darcy", 0), RawMention::new("Darcy", 1)];
        let verifier = Recording::new(always_fail);
        let config = ResolverConfig::default();
        let (outcome, stats) = resolve(&mentions, &verifier, &config).await;
        assert_eq!(outcome.characters.len(), 1);
        assert_eq!(outcome.characters[0].confidence, 0.95);
        assert_eq!(stats.fast_matches, 1);
        assert_eq!(stats.verifier_calls, 0);
        assert!((stats.efficiency_rate() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_components_share_batches() {
        let mentions = vec![
            RawMention::new("Huckleberry Finn", 0),
            RawMention::new("Tom Sawyer", 0),
            RawMention::new("Huck", 1),
            RawMention::new("Tom", 2),
            RawMention::new("Becky Thatcher", 2),
            RawMention::new("Becky", 3),
        ];
        let verifier = Recording::new(accept_all);
        let config = ResolverConfig {
            max_batch_items: 2,
            ..Default::default()
        };
        let (outcome, stats) = resolve(&mentions, &verifier, &config).await;
        assert_eq!(verifier.batch_sizes(), vec![2, 1]);
        assert_eq!(stats.verifier_calls, 2);
        assert_eq!(stats.mentions_merged, 3);
        assert_eq!(outcome.characters.len(), 3);
        assert_eq!(outcome.assignment, vec![0, 1, 0, 1, 2, 2]);
    }

    #[tokio::test]
    async fn test_verifier_picks_canonical_name() {
        let mentions = vec![RawMention::new("Huck", 0), RawMention::new("Huckleberry Finn", 1)];
        let mut table = DecisionTableVerifier::new();
        table.insert("Huckleberry Finn", ["Huck"]);
        let config = ResolverConfig::default();
        let (outcome, _) = resolve(&mentions, &table, &config).await;
        assert_eq!(names(&outcome), vec!["Huckleberry Finn"]);
        assert_eq!(outcome.characters[0].aliases, BTreeSet::from(["Huck".to_string()]));
        assert_eq!(outcome.characters[0].confidence, 1.0);
    }

    #[tokio::test]
    async fn test_rejection_splits_component() {
        let mentions = vec![RawMention::new("Tom Sawyer", 0), RawMention::new("Tom", 1)];
        let config = ResolverConfig::default();
        let (outcome, stats) = resolve(&mentions, &NoopVerifier, &config).await;
        assert_eq!(names(&outcome), vec!["Tom Sawyer", "Tom"]);
        assert_eq!(stats.rejected_components, 1);
        assert_eq!(stats.mentions_merged, 0);
    }

    #[tokio::test]
    async fn test_failed_batch_degrades_to_unmerged() {
        let mentions = vec![
            RawMention::new("Huckleberry Finn", 0),
            RawMention::new("Huck", 1),
            RawMention::new("Huckleberry", 2),
        ];
        let verifier = Recording::new(always_fail);
        let config = ResolverConfig::default();
        let (outcome, stats) = resolve(&mentions, &verifier, &config).await;
        assert_eq!(outcome.characters.len(), 3);
        assert_eq!(stats.mentions_merged, 0);
        assert_eq!(stats.degraded_components, 1);
        assert_eq!(stats.unresolved_mentions, 3);
        assert_eq!(stats.failed_batches, 1);
    }

    #[tokio::test]
    async fn test_length_mismatch_degrades_only_its_batch() {
        let mentions = vec![
            RawMention::new("Tom Sawyer", 0),
            RawMention::new("Tom", 1),
            RawMention::new("Becky Thatcher", 2),
            RawMention::new("Becky", 3),
        ];
        let verifier = Recording::new(short_answer);
        let config = ResolverConfig::default();
        let (outcome, stats) = resolve(&mentions, &verifier, &config).await;
        assert_eq!(verifier.batch_sizes(), vec![2]);
        assert_eq!(outcome.characters.len(), 4);
        assert_eq!(stats.degraded_components, 2);
    }

    #[tokio::test]
    async fn test_context_is_bounded() {
        let long = "x".repeat(1000);
        let mentions = vec![
            RawMention::new("Tom Sawyer", 0).with_description(long.clone()),
            RawMention::new("Tom", 1).with_description("a boy"),
        ];
        let verifier = Recording::new(accept_all);
        let config = ResolverConfig::default();
        resolve(&mentions, &verifier, &config).await;
        let batches = verifier.batches.lock().expect("lock");
        let item = &batches[0][0];
        assert_eq!(item.new_name, "Tom");
        assert_eq!(item.candidate_names, vec!["Tom Sawyer".to_string()]);
        assert!(item.context.chars().count() <= 300);
    }

    #[tokio::test]
    async fn test_verdict_fuses_only_the_named_candidate() {
        let mentions = vec![
            RawMention::new("Huckleberry Finn", 0),
            RawMention::new("Huck", 1),
            RawMention::new("Huckabee", 2),
        ];
        let verifier = Recording::new(insists_on_finn);
        let config = ResolverConfig::default();
        let (outcome, stats) = resolve(&mentions, &verifier, &config).await;

        assert_eq!(names(&outcome), vec!["Huckleberry Finn", "Huckabee"]);
        assert_eq!(
            outcome.characters[0].aliases,
            BTreeSet::from(["Huck".to_string()])
        );
        assert_eq!(outcome.assignment, vec![0, 0, 1]);
        assert_eq!(stats.mentions_merged, 1);
        // The second round shows Huckabee alone; naming Finn again confirms nothing.
        assert_eq!(verifier.batch_sizes(), vec![1, 1]);
        let batches = verifier.batches.lock().expect("lock");
        assert_eq!(batches[1][0].candidate_names, vec!["Huckabee".to_string()]);
    }

    #[tokio::test]
    async fn test_large_component_is_split_across_items() {
        let mentions = vec![
            RawMention::new("Huckleberry Finn", 0),
            RawMention::new("Huck", 1),
            RawMention::new("Huckleberry", 2),
            RawMention::new("Huckabee", 3),
        ];
        let verifier = Recording::new(huck_is_huckleberry);
        let config = ResolverConfig {
            max_representatives: 2,
            ..Default::default()
        };
        let (outcome, stats) = resolve(&mentions, &verifier, &config).await;

        let batches = verifier.batches.lock().expect("lock");
        let items: Vec<&VerificationItem> = batches.iter().flatten().collect();
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| i.candidate_names.len() == 1));
        assert!(items.iter().all(|i| i.new_name == "Huck"));

        assert_eq!(names(&outcome), vec!["Huckleberry Finn", "Huckabee"]);
        assert_eq!(stats.mentions_merged, 2);
        let shown: BTreeSet<&str> = items
            .iter()
            .flat_map(|i| std::iter::once(i.new_name.as_str()).chain(i.candidate_names.iter().map(String::as_str)))
            .collect();
        for name in outcome.characters[0].all_names() {
            assert!(shown.contains(name), "{} fused without being shown", name);
        }
    }

    #[tokio::test]
    async fn test_frozen_mentions_are_not_verified_again() {
        let mentions = vec![
            RawMention::new("Tom Sawyer", 0),
            RawMention::new("Tom", 1),
            RawMention::new("Huckleberry Finn", 2),
            RawMention::new("Huck", 2),
        ];
        let verifier = Recording::new(huck_is_huckleberry);
        let config = ResolverConfig::default();
        let (outcome, stats) = resolve_frozen(&mentions, &verifier, &config, 2).await;

        assert_eq!(verifier.batch_sizes(), vec![1]);
        assert_eq!(names(&outcome), vec!["Tom Sawyer", "Tom", "Huckleberry Finn"]);
        assert_eq!(stats.rejected_components, 0);
        assert_eq!(stats.degraded_components, 0);

        let silent = Recording::new(always_fail);
        let (outcome, stats) = resolve_frozen(&mentions[..2], &silent, &config, 2).await;
        assert!(silent.batch_sizes().is_empty());
        assert_eq!(outcome.characters.len(), 2);
        assert_eq!(stats.failed_batches, 0);
    }
}
