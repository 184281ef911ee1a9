//! `resolve` command: mentions file in, registry file out.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::cli::output::{
    create_spinner, output_json, print_characters, print_header, print_kv, print_success,
    print_warning, OutputMode,
};
use crate::cli::VerifierKind;
use crate::init::AppContext;
use crate::models::{Character, RawMention};
use crate::services::{
    extract_chunks, CommandVerifier, DecisionTableVerifier, NoopVerifier, PreExtracted, Registry,
    RegistryStats, RetryingVerifier, Verifier,
};

/// Mentions grouped by the chunk they were extracted from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MentionsInput {
    #[serde(default)]
    pub chunks: Vec<Vec<RawMention>>,
}

impl MentionsInput {
    /// Parse JSON for `.json` files, YAML otherwise.
    pub fn parse(path: &Path, contents: &str) -> Result<Self> {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let input = if is_json {
            serde_json::from_str(contents)
                .map_err(|e| anyhow::anyhow!("Failed to parse JSON: {}", e))?
        } else {
            serde_yaml_ng::from_str(contents)
                .map_err(|e| anyhow::anyhow!("Failed to parse YAML: {}", e))?
        };
        Ok(input)
    }
}

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub out: Option<PathBuf>,
    pub incremental: bool,
    pub verifier: VerifierKind,
    pub table: Option<PathBuf>,
    pub command: Option<String>,
    pub workers: usize,
}

#[derive(Serialize)]
struct ResolveReport<'a> {
    registry_path: String,
    mentions: usize,
    failed_chunks: &'a [usize],
    characters: &'a [Character],
    stats: &'a RegistryStats,
    efficiency_rate: f64,
}

/// Build the configured verifier, wrapped with timeout and retry.
pub fn build_verifier(ctx: &AppContext, options: &ResolveOptions) -> Result<Box<dyn Verifier>> {
    let inner: Box<dyn Verifier> = match options.verifier {
        VerifierKind::None => Box::new(NoopVerifier),
        VerifierKind::Table => {
            let path = options
                .table
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("--verifier table requires --table <FILE>"))?;
            let contents = std::fs::read_to_string(path).map_err(|e| {
                anyhow::anyhow!("Failed to read table '{}': {}", path.display(), e)
            })?;
            Box::new(DecisionTableVerifier::from_document(&contents)?)
        }
        VerifierKind::Command => {
            let command = options
                .command
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("--verifier command requires --command <CMD>"))?;
            Box::new(CommandVerifier::from_command_line(command)?)
        }
    };
    Ok(Box::new(RetryingVerifier::new(inner, ctx.config.retry.clone())))
}

pub async fn handle_resolve(
    ctx: &AppContext,
    file: &Path,
    options: &ResolveOptions,
    mode: OutputMode,
) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("Failed to read file '{}': {}", file.display(), e))?;
    let input = MentionsInput::parse(file, &contents)?;
    let verifier = build_verifier(ctx, options)?;
    let out = options
        .out
        .clone()
        .unwrap_or_else(|| ctx.default_registry_path());

    let spinner = create_spinner(mode, "Resolving characters...");

    let replay = PreExtracted::new(input.chunks);
    let extraction = extract_chunks(&replay, &replay.windows(), options.workers).await;

    let mut registry = if options.incremental && out.exists() {
        Registry::load(&out, ctx.config.clone())?
    } else {
        Registry::new(ctx.config.clone())
    };

    if options.incremental {
        let mut by_chunk: Vec<Vec<RawMention>> = vec![Vec::new(); extraction.chunks];
        for mention in extraction.mentions.iter().cloned() {
            let chunk = mention.source_chunk;
            if let Some(bucket) = by_chunk.get_mut(chunk) {
                bucket.push(mention);
            }
        }
        for (chunk, mentions) in by_chunk.iter().enumerate() {
            spinner.set_message(format!("Resolving chunk {}/{}...", chunk + 1, by_chunk.len()));
            registry.resolve_incremental(mentions, verifier.as_ref()).await;
        }
    } else {
        registry
            .resolve_batch(&extraction.mentions, verifier.as_ref())
            .await;
    }
    spinner.finish_and_clear();

    registry.save(&out)?;

    let stats = registry.stats();
    match mode {
        OutputMode::Json => {
            output_json(&ResolveReport {
                registry_path: out.display().to_string(),
                mentions: extraction.mentions.len(),
                failed_chunks: &extraction.failed_chunks,
                characters: registry.characters(),
                stats,
                efficiency_rate: stats.efficiency_rate(),
            });
        }
        OutputMode::Human => {
            print_characters(registry.characters());
            print_header("Resolution");
            print_kv("Mentions", &extraction.mentions.len().to_string());
            print_kv("Characters", &registry.len().to_string());
            print_kv("Fast matches", &stats.fast_matches.to_string());
            print_kv("Verifier calls", &stats.verifier_calls.to_string());
            print_kv("Merged", &stats.mentions_merged.to_string());
            print_kv(
                "Efficiency",
                &format!("{:.0}%", stats.efficiency_rate() * 100.0),
            );
            if stats.degraded_components > 0 {
                print_warning(&format!(
                    "{} component(s) ({} mentions) left unmerged after verifier failures",
                    stats.degraded_components, stats.unresolved_mentions
                ));
            }
            if !extraction.failed_chunks.is_empty() {
                print_warning(&format!("Chunks skipped: {:?}", extraction.failed_chunks));
            }
            print_success(&format!("Registry written to {}", out.display()));
        }
    }

    Ok(())
}
