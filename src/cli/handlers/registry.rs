//! Registry inspection commands: show and lookup.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::cli::output::{
    output_json, print_characters, print_header, print_hint, print_kv, OutputMode,
};
use crate::init::AppContext;
use crate::services::Registry;

const SUGGESTION_LIMIT: usize = 5;

fn open_registry(ctx: &AppContext, path: Option<&Path>) -> Result<Registry> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ctx.default_registry_path());
    Registry::load(&path, ctx.config.clone())
        .map_err(|e| anyhow::anyhow!("Failed to open registry '{}': {}", path.display(), e))
}

pub fn handle_show(ctx: &AppContext, path: Option<&Path>, mode: OutputMode) -> Result<()> {
    let registry = open_registry(ctx, path)?;
    let record = registry.record();

    match mode {
        OutputMode::Json => output_json(&record),
        OutputMode::Human => {
            print_characters(&record.characters);
            print_header(&format!("{} characters", record.metadata.total));
            for (gender, count) in &record.metadata.by_gender {
                print_kv(gender, &count.to_string());
            }
            println!();
            for (importance, count) in &record.metadata.by_importance {
                print_kv(importance, &count.to_string());
            }
        }
    }
    Ok(())
}

pub fn handle_lookup(
    ctx: &AppContext,
    path: Option<&Path>,
    name: &str,
    mode: OutputMode,
) -> Result<()> {
    let registry = open_registry(ctx, path)?;

    if let Some(character) = registry.lookup(name) {
        match mode {
            OutputMode::Json => output_json(character),
            OutputMode::Human => {
                println!("{}", character.name.bold());
                if !character.aliases.is_empty() {
                    let aliases: Vec<&str> = character.aliases.iter().map(String::as_str).collect();
                    print_kv("Aliases", &aliases.join(", "));
                }
                print_kv("Gender", character.gender.as_str());
                print_kv("Importance", character.importance.as_str());
                print_kv("Confidence", &format!("{:.2}", character.confidence));
                if !character.pronouns.is_empty() {
                    let pronouns: Vec<String> = character
                        .pronouns
                        .iter()
                        .map(|(role, p)| format!("{}={}", role, p))
                        .collect();
                    print_kv("Pronouns", &pronouns.join(" "));
                }
                if !character.description.is_empty() {
                    print_kv("Description", &character.description);
                }
            }
        }
        return Ok(());
    }

    let suggestions = registry.suggest(name, SUGGESTION_LIMIT);
    match mode {
        OutputMode::Json => {
            let names: Vec<&str> = suggestions
                .iter()
                .map(|s| s.character.name.as_str())
                .collect();
            output_json(&serde_json::json!({
                "found": false,
                "query": name,
                "suggestions": names,
            }));
        }
        OutputMode::Human => {
            println!("No character named '{}'.", name);
            if !suggestions.is_empty() {
                print_hint("Did you mean:");
                for s in &suggestions {
                    print_hint(&format!("  {} ({:.2})", s.character.name, s.similarity.score));
                }
            }
        }
    }
    Ok(())
}
