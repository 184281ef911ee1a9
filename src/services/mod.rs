pub mod candidate_index;
pub mod clustering;
pub mod extractor;
pub mod merger;
pub mod normalize;
pub mod registry;
pub mod similarity;
pub mod stats;
pub mod verifier;

pub use candidate_index::{CandidateIndex, ScoredCandidate};
pub use clustering::{
    cluster_mentions, ClusterBuilder, ClusterStats, Clustering, Component, PendingPair, UnionFind,
};
pub use extractor::{extract_chunks, ExtractionReport, Extractor, PreExtracted};
pub use merger::{fuse, GroupMerger, MergeOutcome};
pub use normalize::{NameNormalizer, NormalizedName};
pub use registry::{Registry, Suggestion};
pub use similarity::{AnalyzedName, MatchBasis, Similarity, SimilarityScorer};
pub use stats::RegistryStats;
pub use verifier::{
    parse_verdicts, retry_delay, CommandVerifier, DecisionTableVerifier, NoopVerifier,
    RetryingVerifier, VerificationItem, VerificationVerdict, Verifier,
};
