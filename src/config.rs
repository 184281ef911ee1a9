//! Resolver configuration.
//!
//! Thresholds are tunable defaults rather than ground truth. Loaded from
//! `{data_path}/resolver.toml` or the `DRAMATIS_RESOLVER_CONFIG` env var
//! (JSON), falling back to defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::DramatisError;

pub const CONFIG_FILE_NAME: &str = "resolver.toml";
pub const CONFIG_ENV_VAR: &str = "DRAMATIS_RESOLVER_CONFIG";

/// Retry policy for verifier calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Down-jitter factor (0.25 = delay reduced by up to 25%).
    pub jitter_factor: f64,
    /// Per-attempt timeout.
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter_factor: 0.25,
            timeout_secs: 60,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Identity-resolution tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// At or above: same surface identity, merged without the verifier.
    pub fast_accept: f64,
    /// At or above: pair is unioned by the cluster builder.
    pub auto_accept: f64,
    /// At or above (and below `auto_accept`): pair is queued for verification.
    pub verify_floor: f64,
    /// Multiplier applied to partial-match Jaccard scores. Capped at 0.5.
    pub jaccard_damping: f64,
    /// Distinct names sent per verification item.
    pub max_representatives: usize,
    /// Items per verifier call.
    pub max_batch_items: usize,
    /// Context characters sent per item.
    pub max_context_chars: usize,
    pub singleton_confidence: f64,
    pub fast_confidence: f64,
    /// Titles stripped in addition to the built-in honorifics.
    pub extra_honorifics: Vec<String>,
    pub retry: RetryConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fast_accept: 0.95,
            auto_accept: 0.9,
            verify_floor: 0.2,
            jaccard_damping: 0.5,
            max_representatives: 5,
            max_batch_items: 8,
            max_context_chars: 300,
            singleton_confidence: 0.7,
            fast_confidence: 0.95,
            extra_honorifics: Vec::new(),
            retry: RetryConfig::default(),
        }
    }
}

impl ResolverConfig {
    /// Reject configurations that would break the accept/verify ordering.
    pub fn validate(&self) -> Result<(), DramatisError> {
        let unit = [
            ("fast_accept", self.fast_accept),
            ("auto_accept", self.auto_accept),
            ("verify_floor", self.verify_floor),
            ("jaccard_damping", self.jaccard_damping),
            ("singleton_confidence", self.singleton_confidence),
            ("fast_confidence", self.fast_confidence),
            ("retry.jitter_factor", self.retry.jitter_factor),
        ];
        for (field, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(DramatisError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    field, value
                )));
            }
        }
        if self.verify_floor > self.auto_accept {
            return Err(DramatisError::Config(format!(
                "verify_floor ({}) must not exceed auto_accept ({})",
                self.verify_floor, self.auto_accept
            )));
        }
        if self.auto_accept > self.fast_accept {
            return Err(DramatisError::Config(format!(
                "auto_accept ({}) must not exceed fast_accept ({})",
                self.auto_accept, self.fast_accept
            )));
        }
        if self.verify_floor <= 0.0 {
            return Err(DramatisError::Config(
                "verify_floor must be positive, or every unrelated pair is queued".into(),
            ));
        }
        if self.max_batch_items == 0 || self.max_representatives < 2 {
            return Err(DramatisError::Config(
                "max_batch_items must be >= 1 and max_representatives >= 2".into(),
            ));
        }
        if self.retry.timeout_secs == 0 {
            return Err(DramatisError::Config("retry.timeout_secs must be >= 1".into()));
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, DramatisError> {
        let config: ResolverConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }
}

/// Load resolver config with priority:
/// 1. `{data_path}/resolver.toml` file
/// 2. `DRAMATIS_RESOLVER_CONFIG` env var (JSON)
/// 3. Defaults
///
/// Unreadable or invalid sources are logged and skipped.
pub fn load_config(data_path: &Path) -> ResolverConfig {
    let config_path = data_path.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match ResolverConfig::from_toml_str(&contents) {
                Ok(config) => {
                    info!("Loaded resolver config from {}", config_path.display());
                    return config;
                }
                Err(e) => {
                    warn!(
                        "Failed to load {}: {}. Using default.",
                        config_path.display(),
                        e
                    );
                }
            },
            Err(e) => {
                warn!(
                    "Failed to read {}: {}. Using default.",
                    config_path.display(),
                    e
                );
            }
        }
    }

    if let Ok(json) = std::env::var(CONFIG_ENV_VAR) {
        match serde_json::from_str::<ResolverConfig>(&json)
            .map_err(DramatisError::from)
            .and_then(|config| config.validate().map(|_| config))
        {
            Ok(config) => {
                info!("Loaded resolver config from {} env", CONFIG_ENV_VAR);
                return config;
            }
            Err(e) => {
                warn!("Failed to parse {}: {}. Using default.", CONFIG_ENV_VAR, e);
            }
        }
    }

    ResolverConfig::default()
}
