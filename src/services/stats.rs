//! Match/merge counters for a registry.

use serde::{Deserialize, Serialize};

use crate::services::clustering::ClusterStats;

/// Counters aggregated over one or more resolution passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Mentions fed through resolution.
    pub total_checked: usize,
    /// Mentions merged on index evidence alone (exact/normalized names).
    pub fast_matches: usize,
    pub verifier_calls: usize,
    /// Items sent across all verifier calls.
    pub items_verified: usize,
    /// Surface identities folded into another by a confirmed verdict.
    pub mentions_merged: usize,
    /// Components the verifier rejected, split back into their atoms.
    pub rejected_components: usize,
    /// Components left unmerged because their batch failed.
    pub degraded_components: usize,
    /// Mentions in degraded components.
    pub unresolved_mentions: usize,
    pub failed_batches: usize,
    /// Worth-asking pairs found by clustering.
    pub pending_pairs: usize,
    /// Unions refused to keep incompatible names apart.
    pub refused_unions: usize,
    pub passes: usize,
}

impl RegistryStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of checked mentions resolved without the verifier.
    pub fn efficiency_rate(&self) -> f64 {
        if self.total_checked == 0 {
            return 0.0;
        }
        self.fast_matches as f64 / self.total_checked as f64
    }

    /// Share of checked mentions that could not be confidently resolved.
    pub fn unresolved_rate(&self) -> f64 {
        if self.total_checked == 0 {
            return 0.0;
        }
        self.unresolved_mentions as f64 / self.total_checked as f64
    }

    pub fn record_clustering(&mut self, clustering: &ClusterStats) {
        self.total_checked += clustering.mentions;
        self.pending_pairs += clustering.queued;
        self.refused_unions += clustering.refused;
    }

    /// Add another pass's counters to these.
    pub fn accumulate(&mut self, other: &RegistryStats) {
        self.total_checked += other.total_checked;
        self.fast_matches += other.fast_matches;
        self.verifier_calls += other.verifier_calls;
        self.items_verified += other.items_verified;
        self.mentions_merged += other.mentions_merged;
        self.rejected_components += other.rejected_components;
        self.degraded_components += other.degraded_components;
        self.unresolved_mentions += other.unresolved_mentions;
        self.failed_batches += other.failed_batches;
        self.pending_pairs += other.pending_pairs;
        self.refused_unions += other.refused_unions;
        self.passes += other.passes;
    }
}
