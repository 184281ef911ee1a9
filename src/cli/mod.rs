//! CLI interface for Dramatis.

pub mod handlers;
pub mod output;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use output::OutputMode;

/// Dramatis - character identity resolution for long documents
#[derive(Parser)]
#[command(name = "dramatis", version, about, long_about = None)]
pub struct Cli {
    /// Override data directory (default: ~/.dramatis)
    #[arg(long, env = "DRAMATIS_DATA_PATH", global = true)]
    pub data_path: Option<PathBuf>,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which verifier confirms ambiguous merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VerifierKind {
    /// Reject every ambiguous merge (exact/normalized matches only)
    None,
    /// Answer from a `canonical: [aliases]` file (--table)
    Table,
    /// Pipe batches to an external program (--command)
    Command,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve extracted mentions into a character registry
    Resolve {
        /// JSON or YAML file with `chunks: [[mention, ...], ...]`
        file: PathBuf,
        /// Registry output path (default: <data-path>/registry.json)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Resolve chunk by chunk against the existing registry
        #[arg(long)]
        incremental: bool,
        /// Verifier used for ambiguous components
        #[arg(long, value_enum, default_value = "none")]
        verifier: VerifierKind,
        /// Decision table for `--verifier table`
        #[arg(long)]
        table: Option<PathBuf>,
        /// Command line for `--verifier command`
        #[arg(long)]
        command: Option<String>,
        /// Concurrent chunk extractions
        #[arg(long, default_value = "4")]
        workers: usize,
    },

    /// Score two names and show the resulting decision
    Score {
        a: String,
        b: String,
    },

    /// Show the normalized form and tokens of a name
    Normalize {
        name: String,
    },

    /// Show a saved registry
    Show {
        /// Registry file (default: <data-path>/registry.json)
        registry: Option<PathBuf>,
    },

    /// Find a character by name or alias
    Lookup {
        name: String,
        /// Registry file (default: <data-path>/registry.json)
        #[arg(long)]
        registry: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell type (bash, zsh, fish, elvish, powershell)
        shell: clap_complete::Shell,
    },
}

/// Execute a CLI command.
pub async fn execute(
    command: &Commands,
    ctx: &crate::init::AppContext,
    mode: OutputMode,
) -> anyhow::Result<()> {
    match command {
        Commands::Resolve {
            file,
            out,
            incremental,
            verifier,
            table,
            command,
            workers,
        } => {
            let options = handlers::resolve::ResolveOptions {
                out: out.clone(),
                incremental: *incremental,
                verifier: *verifier,
                table: table.clone(),
                command: command.clone(),
                workers: *workers,
            };
            handlers::resolve::handle_resolve(ctx, file, &options, mode).await?
        }

        Commands::Score { a, b } => handlers::names::handle_score(ctx, a, b, mode)?,

        Commands::Normalize { name } => handlers::names::handle_normalize(ctx, name, mode)?,

        Commands::Show { registry } => {
            handlers::registry::handle_show(ctx, registry.as_deref(), mode)?
        }

        Commands::Lookup { name, registry } => {
            handlers::registry::handle_lookup(ctx, registry.as_deref(), name, mode)?
        }

        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "dramatis", &mut std::io::stdout());
        }
    }

    Ok(())
}
