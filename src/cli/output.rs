//! Output formatting infrastructure for CLI commands.

use std::time::Duration;

use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::models::Character;

/// Output mode for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

/// Print a single item as pretty-printed JSON.
pub fn output_json<T: Serialize>(item: &T) {
    match serde_json::to_string_pretty(item) {
        Ok(json) => println!("{}", json),
        Err(e) => print_error(&format!("Failed to serialize to JSON: {}", e)),
    }
}

/// Print a formatted table with headers and rows.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    if rows.is_empty() {
        println!("{}", "No characters found.".dimmed());
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(headers);

    for row in rows {
        table.add_row(row);
    }

    println!("{table}");
}

/// One table row per character.
pub fn print_characters(characters: &[Character]) {
    let rows = characters
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.aliases.iter().cloned().collect::<Vec<_>>().join(", "),
                c.gender.to_string(),
                c.importance.to_string(),
                format!("{:.2}", c.confidence),
                c.source_chunks
                    .iter()
                    .map(|chunk| chunk.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ]
        })
        .collect();
    print_table(
        &["Name", "Aliases", "Gender", "Importance", "Confidence", "Chunks"],
        rows,
    );
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("{} {}", "OK".green().bold(), msg);
}

/// Print a warning message to stderr.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "Warning:".yellow().bold(), msg);
}

/// Print an error message to stderr.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "Error:".red().bold(), msg);
}

/// Print a bold section header.
pub fn print_header(title: &str) {
    println!("\n{}\n", title.bold());
}

/// Print a key-value pair line.
pub fn print_kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a dimmed hint/suggestion message.
pub fn print_hint(msg: &str) {
    println!("{}", msg.dimmed());
}

/// Spinner on stderr for long-running work. Hidden in JSON mode.
pub fn create_spinner(mode: OutputMode, message: &str) -> ProgressBar {
    if mode == OutputMode::Json {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
