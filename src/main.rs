//! Dramatis - character identity resolution for long documents
//!
//! Usage:
//!   dramatis resolve mentions.yaml       Resolve mentions into a registry
//!   dramatis score "Huck" "Huckleberry Finn"
//!   dramatis normalize "Mr. Darcy"
//!   dramatis show                        Show the saved registry
//!   dramatis lookup Huck                 Find a character by name or alias
//!   dramatis --help                      Show all commands

use anyhow::Result;
use clap::Parser;

use dramatis::cli::output::OutputMode;
use dramatis::cli::{Cli, Commands};
use dramatis::init::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Tracing to stderr so stdout stays clean for --json
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dramatis=info".parse()?),
        )
        .init();

    let mode = OutputMode::from_json_flag(cli.json);

    match &cli.command {
        Commands::Completions { .. } => {
            let ctx = AppContext {
                data_path: cli.data_path.clone().unwrap_or_default(),
                config: Default::default(),
            };
            dramatis::cli::execute(&cli.command, &ctx, mode).await?;
        }
        cmd => {
            let ctx = AppContext::new(cli.data_path.clone());
            dramatis::cli::execute(cmd, &ctx, mode).await?;
        }
    }

    Ok(())
}
