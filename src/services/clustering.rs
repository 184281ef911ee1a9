//! Mention clustering: Union-Find over candidate pairs.
//!
//! Pairs come from the [`CandidateIndex`], so the work is O(N·k) for k
//! candidates per mention instead of O(N²). Pairs are applied best-first:
//!
//! - score ≥ `fast_accept`: same surface identity; joins the component and
//!   the mention's *atom* (atoms are merged without verification).
//! - score ≥ `auto_accept`: joins the component.
//! - score ≥ `verify_floor`: queued; attached afterwards so the verifier
//!   can confirm or reject the resulting component.
//!
//! Every union is refused when it would place two incompatible primary
//! names (e.g. "Elizabeth Bennet" and "Jane Bennet") in one component.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::config::ResolverConfig;
use crate::models::RawMention;
use crate::services::candidate_index::CandidateIndex;
use crate::services::similarity::{AnalyzedName, MatchBasis, SimilarityScorer};

/// Disjoint-set forest with path compression and union by rank.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
    components: usize,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
            components: n,
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Merge the sets holding `a` and `b`. Returns `false` if already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        let before = self.components;
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            }
        }
        self.components -= 1;
        debug_assert!(self.components < before, "component count must not increase");
        true
    }

    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    pub fn component_count(&self) -> usize {
        self.components
    }

    /// The partition, groups ordered by smallest member, members ascending.
    pub fn groups(&mut self) -> Vec<Vec<usize>> {
        let mut by_root: HashMap<usize, Vec<usize>> = HashMap::new();
        for x in 0..self.parent.len() {
            let root = self.find(x);
            by_root.entry(root).or_default().push(x);
        }
        let mut groups: Vec<Vec<usize>> = by_root.into_values().collect();
        groups.sort_by_key(|g| g[0]);
        groups
    }
}

/// A scored mention pair below auto-accept, awaiting verification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PendingPair {
    pub a: usize,
    pub b: usize,
    pub score: f64,
    pub basis: MatchBasis,
}

/// One connected component of mentions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Component {
    /// Mention indices, ascending.
    pub members: Vec<usize>,
    /// Sub-partition of `members` joined by fast (exact/normalized) links.
    pub atoms: Vec<Vec<usize>>,
}

impl Component {
    /// Whether the component joins distinct surface identities and must be
    /// confirmed by the verifier.
    pub fn needs_verification(&self) -> bool {
        self.atoms.len() > 1
    }

    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }
}

/// Counters from one clustering pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterStats {
    pub mentions: usize,
    /// Distinct candidate pairs scored.
    pub pairs_scored: usize,
    pub fast_links: usize,
    pub auto_links: usize,
    pub queued: usize,
    pub attached: usize,
    /// Unions refused because they would join incompatible names.
    pub refused: usize,
}

/// Output of [`ClusterBuilder`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct Clustering {
    pub components: Vec<Component>,
    pub pending: Vec<PendingPair>,
    pub stats: ClusterStats,
}

impl Clustering {
    /// Index partition, one group per component.
    pub fn groups(&self) -> Vec<Vec<usize>> {
        self.components.iter().map(|c| c.members.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct ScoredPair {
    a: usize,
    b: usize,
    score: f64,
    basis: MatchBasis,
}

/// Partitions raw mentions into connected components.
pub struct ClusterBuilder<'a> {
    scorer: &'a SimilarityScorer,
    config: &'a ResolverConfig,
    index: CandidateIndex,
    uf: UnionFind,
    atoms: UnionFind,
    /// Per component root: members with distinct normalized primary names.
    reps: HashMap<usize, Vec<usize>>,
    pending: Vec<PendingPair>,
    stats: ClusterStats,
}

impl<'a> ClusterBuilder<'a> {
    /// Index every mention. Nothing is unioned until [`run`](Self::run).
    pub fn new(
        mentions: &[RawMention],
        scorer: &'a SimilarityScorer,
        config: &'a ResolverConfig,
    ) -> Self {
        let mut index = CandidateIndex::new();
        for mention in mentions {
            index.insert_mention(mention, scorer);
        }
        let n = mentions.len();
        Self {
            scorer,
            config,
            index,
            uf: UnionFind::new(n),
            atoms: UnionFind::new(n),
            reps: (0..n).map(|i| (i, vec![i])).collect(),
            pending: Vec::new(),
            stats: ClusterStats {
                mentions: n,
                ..Default::default()
            },
        }
    }

    /// Score candidate pairs and apply unions, best evidence first.
    pub fn run(&mut self) {
        let mut pairs = self.collect_pairs();
        pairs.sort_by(|x, y| {
            y.score
                .partial_cmp(&x.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(x.a.cmp(&y.a))
                .then(x.b.cmp(&y.b))
        });

        for pair in pairs {
            if pair.score >= self.config.auto_accept {
                let fast = pair.score >= self.config.fast_accept;
                if self.try_union(pair.a, pair.b) {
                    if fast {
                        self.stats.fast_links += 1;
                    } else {
                        self.stats.auto_links += 1;
                    }
                }
                if fast && self.uf.connected(pair.a, pair.b) {
                    self.atoms.union(pair.a, pair.b);
                }
            } else {
                self.stats.queued += 1;
                self.pending.push(PendingPair {
                    a: pair.a,
                    b: pair.b,
                    score: pair.score,
                    basis: pair.basis,
                });
                if self.try_union(pair.a, pair.b) {
                    self.stats.attached += 1;
                }
            }
        }

        debug!(
            mentions = self.stats.mentions,
            pairs = self.stats.pairs_scored,
            fast = self.stats.fast_links,
            auto = self.stats.auto_links,
            queued = self.stats.queued,
            refused = self.stats.refused,
            components = self.uf.component_count(),
            "clustering pass complete"
        );
    }

    /// The current index partition.
    pub fn get_groups(&mut self) -> Vec<Vec<usize>> {
        self.uf.groups()
    }

    pub fn component_count(&self) -> usize {
        self.uf.component_count()
    }

    pub fn into_clustering(mut self) -> Clustering {
        let groups = self.uf.groups();
        let components = groups
            .into_iter()
            .map(|members| {
                let mut by_atom: HashMap<usize, Vec<usize>> = HashMap::new();
                for &m in &members {
                    let root = self.atoms.find(m);
                    by_atom.entry(root).or_default().push(m);
                }
                let mut atoms: Vec<Vec<usize>> = by_atom.into_values().collect();
                atoms.sort_by_key(|a| a[0]);
                Component { members, atoms }
            })
            .collect();

        Clustering {
            components,
            pending: self.pending,
            stats: self.stats,
        }
    }

    fn collect_pairs(&mut self) -> Vec<ScoredPair> {
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut pairs = Vec::new();
        for i in 0..self.index.len() {
            for candidate in self
                .index
                .candidates(i, self.scorer, self.config.verify_floor)
            {
                let key = (i.min(candidate.index), i.max(candidate.index));
                if !seen.insert(key) {
                    continue;
                }
                pairs.push(ScoredPair {
                    a: key.0,
                    b: key.1,
                    score: candidate.similarity.score,
                    basis: candidate.similarity.basis,
                });
            }
        }
        self.stats.pairs_scored = pairs.len();
        pairs
    }

    /// Union `a` and `b` unless their components hold incompatible names.
    fn try_union(&mut self, a: usize, b: usize) -> bool {
        let ra = self.uf.find(a);
        let rb = self.uf.find(b);
        if ra == rb {
            return false;
        }
        if !self.compatible(ra, rb) {
            self.stats.refused += 1;
            debug!(a, b, "union refused: incompatible names");
            return false;
        }

        let before = self.uf.component_count();
        self.uf.union(ra, rb);
        debug_assert!(self.uf.component_count() < before);

        let root = self.uf.find(ra);
        let mut merged = self.reps.remove(&ra).unwrap_or_default();
        merged.extend(self.reps.remove(&rb).unwrap_or_default());
        let mut seen_names = BTreeSet::new();
        merged.retain(|&m| {
            let key = self
                .index
                .names(m)
                .first()
                .map(|n| n.norm.normalized.clone())
                .unwrap_or_default();
            seen_names.insert(key)
        });
        self.reps.insert(root, merged);
        true
    }

    /// Two components are compatible when no pair of their multi-token
    /// primary names scores below the verification floor.
    fn compatible(&self, ra: usize, rb: usize) -> bool {
        let empty = Vec::new();
        let left = self.reps.get(&ra).unwrap_or(&empty);
        let right = self.reps.get(&rb).unwrap_or(&empty);
        for &x in left {
            let x_names = self.index.names(x);
            if !is_full_name(x_names) {
                continue;
            }
            for &y in right {
                let y_names = self.index.names(y);
                if !is_full_name(y_names) {
                    continue;
                }
                let sim = self.scorer.compare_identities(x_names, y_names);
                if sim.score < self.config.verify_floor {
                    return false;
                }
            }
        }
        true
    }
}

fn is_full_name(names: &[AnalyzedName]) -> bool {
    names.first().is_some_and(|n| n.norm.tokens.len() >= 2)
}

/// Cluster `mentions` in one pass.
pub fn cluster_mentions(
    mentions: &[RawMention],
    scorer: &SimilarityScorer,
    config: &ResolverConfig,
) -> Clustering {
    let mut builder = ClusterBuilder::new(mentions, scorer, config);
    builder.run();
    builder.into_clustering()
}
