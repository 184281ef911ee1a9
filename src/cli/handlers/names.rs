//! Name inspection commands: score and normalize.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use crate::cli::output::{output_json, print_kv, OutputMode};
use crate::config::ResolverConfig;
use crate::init::AppContext;
use crate::services::{MatchBasis, SimilarityScorer};

/// What the resolver would do with a pair at a given score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Same surface identity, merged without asking.
    FastMerge,
    /// Unioned, then confirmed by the verifier when names differ.
    AutoAccept,
    /// Queued for the verifier.
    Verify,
    Reject,
}

impl Decision {
    pub fn for_score(score: f64, config: &ResolverConfig) -> Self {
        if score >= config.fast_accept {
            Decision::FastMerge
        } else if score >= config.auto_accept {
            Decision::AutoAccept
        } else if score >= config.verify_floor {
            Decision::Verify
        } else {
            Decision::Reject
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Decision::FastMerge => "fast merge",
            Decision::AutoAccept => "auto-accept",
            Decision::Verify => "ask verifier",
            Decision::Reject => "reject",
        }
    }
}

#[derive(Serialize)]
struct ScoreReport<'a> {
    a: &'a str,
    b: &'a str,
    score: f64,
    basis: MatchBasis,
    decision: Decision,
    family_conflict: bool,
}

pub fn handle_score(ctx: &AppContext, a: &str, b: &str, mode: OutputMode) -> Result<()> {
    let scorer = SimilarityScorer::from_config(&ctx.config);
    let similarity = scorer.compare(a, b);
    let report = ScoreReport {
        a,
        b,
        score: similarity.score,
        basis: similarity.basis,
        decision: Decision::for_score(similarity.score, &ctx.config),
        family_conflict: scorer.family_conflict(a, b),
    };

    match mode {
        OutputMode::Json => output_json(&report),
        OutputMode::Human => {
            println!("{} {} {}", a.bold(), "vs".dimmed(), b.bold());
            print_kv("Score", &format!("{:.3}", report.score));
            print_kv("Basis", &format!("{:?}", report.basis));
            let decision = match report.decision {
                Decision::FastMerge | Decision::AutoAccept => report.decision.label().green(),
                Decision::Verify => report.decision.label().yellow(),
                Decision::Reject => report.decision.label().red(),
            };
            print_kv("Decision", &decision.to_string());
            if report.family_conflict {
                print_kv("Family guard", &"same surname, different people".yellow().to_string());
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct NormalizeReport<'a> {
    name: &'a str,
    normalized: String,
    tokens: Vec<String>,
}

pub fn handle_normalize(ctx: &AppContext, name: &str, mode: OutputMode) -> Result<()> {
    let scorer = SimilarityScorer::from_config(&ctx.config);
    let analyzed = scorer.normalizer().analyze(name);
    let report = NormalizeReport {
        name,
        normalized: analyzed.normalized,
        tokens: analyzed.tokens,
    };

    match mode {
        OutputMode::Json => output_json(&report),
        OutputMode::Human => {
            print_kv("Normalized", &report.normalized);
            print_kv("Tokens", &report.tokens.join(" | "));
        }
    }
    Ok(())
}
