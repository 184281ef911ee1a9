//! Shared initialization logic for CLI commands.

use std::path::{Path, PathBuf};

use crate::config::{load_config, ResolverConfig};

/// File name of the default registry inside the data directory.
pub const REGISTRY_FILE_NAME: &str = "registry.json";

/// Application context shared by CLI commands.
pub struct AppContext {
    pub data_path: PathBuf,
    pub config: ResolverConfig,
}

impl AppContext {
    /// Initialize application context.
    ///
    /// Data path priority: explicit path > DRAMATIS_DATA_PATH env > ./.dramatis (if exists) > ~/.dramatis
    pub fn new(explicit_path: Option<PathBuf>) -> Self {
        let data_path = explicit_path
            .or_else(|| std::env::var("DRAMATIS_DATA_PATH").ok().map(PathBuf::from))
            .or_else(|| {
                let local_path = Path::new(".dramatis");
                if local_path.exists() && local_path.is_dir() {
                    Some(local_path.to_path_buf())
                } else {
                    None
                }
            })
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".dramatis"))
                    .unwrap_or_else(|| PathBuf::from(".dramatis"))
            });

        tracing::debug!("Using data path: {}", data_path.display());
        let config = load_config(&data_path);

        Self { data_path, config }
    }

    /// Where `resolve` writes when no `--out` is given.
    pub fn default_registry_path(&self) -> PathBuf {
        self.data_path.join(REGISTRY_FILE_NAME)
    }
}
