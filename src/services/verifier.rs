//! External identity verification.
//!
//! The resolution engine only depends on the [`Verifier`] trait. Concrete
//! implementations:
//!
//! - [`NoopVerifier`]: rejects everything (heuristic merges only).
//! - [`DecisionTableVerifier`]: answers from a curated `canonical → aliases` table.
//! - [`CommandVerifier`]: pipes the batch to an external program (any LLM client).
//! - [`RetryingVerifier`]: wraps another verifier with a timeout and backoff.

use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::services::normalize::NameNormalizer;
use crate::utils::math::clamp_unit;
use crate::DramatisError;

/// One question for the verifier: is `new_name` the same identity as one
/// of `candidate_names`?
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationItem {
    pub new_name: String,
    pub candidate_names: Vec<String>,
    /// Surrounding descriptions, bounded in length.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context: String,
}

impl VerificationItem {
    /// Every name in the item, `new_name` first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.new_name.as_str()).chain(self.candidate_names.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationVerdict {
    pub is_match: bool,
    #[serde(default)]
    pub matching_candidate: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

impl VerificationVerdict {
    pub fn rejected(confidence: f64) -> Self {
        Self {
            is_match: false,
            matching_candidate: None,
            confidence: clamp_unit(confidence),
        }
    }

    pub fn matched(candidate: impl Into<String>, confidence: f64) -> Self {
        Self {
            is_match: true,
            matching_candidate: Some(candidate.into()),
            confidence: clamp_unit(confidence),
        }
    }
}

/// Capability that authoritatively resolves ambiguous identity matches.
///
/// Implementations must return exactly one verdict per item, in order, and
/// treat an empty batch as a no-op.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn batch_verify(
        &self,
        items: &[VerificationItem],
    ) -> Result<Vec<VerificationVerdict>, DramatisError>;

    /// Short label for logs.
    fn name(&self) -> &str {
        "verifier"
    }
}

#[async_trait]
impl<V: Verifier + ?Sized> Verifier for Box<V> {
    async fn batch_verify(
        &self,
        items: &[VerificationItem],
    ) -> Result<Vec<VerificationVerdict>, DramatisError> {
        (**self).batch_verify(items).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<V: Verifier + ?Sized> Verifier for Arc<V> {
    async fn batch_verify(
        &self,
        items: &[VerificationItem],
    ) -> Result<Vec<VerificationVerdict>, DramatisError> {
        (**self).batch_verify(items).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// ============================================================================
// Response parsing
// ============================================================================

/// Parse a verifier's raw text response into exactly `expected` verdicts.
///
/// Accepts a JSON array, optionally inside a fenced code block, or an object
/// wrapping the array (`{"results": [...]}`). Anything else, including a
/// length mismatch, is a [`DramatisError::MalformedVerifierResponse`].
pub fn parse_verdicts(raw: &str, expected: usize) -> Result<Vec<VerificationVerdict>, DramatisError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        if expected == 0 {
            return Ok(Vec::new());
        }
        return Err(DramatisError::malformed("empty response"));
    }

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| DramatisError::malformed(format!("invalid JSON: {}", e)))?;
    let array = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(map) => map
            .into_iter()
            .find_map(|(_, v)| match v {
                serde_json::Value::Array(items) => Some(items),
                _ => None,
            })
            .ok_or_else(|| DramatisError::malformed("object response holds no array"))?,
        other => {
            return Err(DramatisError::malformed(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            )))
        }
    };

    if array.len() != expected {
        return Err(DramatisError::malformed(format!(
            "expected {} verdicts, got {}",
            expected,
            array.len()
        )));
    }

    array
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value::<VerificationVerdict>(item)
                .map(|mut verdict| {
                    verdict.confidence = clamp_unit(verdict.confidence);
                    verdict
                })
                .map_err(|e| DramatisError::malformed(format!("verdict {}: {}", i, e)))
        })
        .collect()
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

// ============================================================================
// Retry wrapper
// ============================================================================

/// Backoff before retry number `backoff_step + 1`: `initial * 2^step`,
/// capped at `max`, then down-jittered by up to `jitter_factor`.
pub fn retry_delay(backoff_step: u32, config: &RetryConfig) -> Duration {
    let base = config.initial_delay().as_secs_f64() * 2.0_f64.powi(backoff_step as i32);
    let capped = base.min(config.max_delay().as_secs_f64());
    let jitter = 1.0 - rand::random::<f64>() * config.jitter_factor.clamp(0.0, 1.0);
    Duration::from_secs_f64(capped * jitter)
}

/// Adds a per-attempt timeout and exponential backoff to another verifier.
///
/// Only retryable errors (timeouts, transport failures) are retried; a
/// malformed response is returned immediately.
pub struct RetryingVerifier<V> {
    inner: V,
    config: RetryConfig,
}

impl<V: Verifier> RetryingVerifier<V> {
    pub fn new(inner: V, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &V {
        &self.inner
    }
}

#[async_trait]
impl<V: Verifier> Verifier for RetryingVerifier<V> {
    async fn batch_verify(
        &self,
        items: &[VerificationItem],
    ) -> Result<Vec<VerificationVerdict>, DramatisError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let timeout = self.config.timeout();
        let mut attempt: u32 = 0;
        loop {
            let result = match tokio::time::timeout(timeout, self.inner.batch_verify(items)).await {
                Ok(result) => result,
                Err(_) => Err(DramatisError::VerifierTimeout {
                    attempts: attempt + 1,
                    timeout,
                }),
            };

            match result {
                Ok(verdicts) => return Ok(verdicts),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = retry_delay(attempt, &self.config);
                    warn!(
                        verifier = self.inner.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Verifier call failed: {}. Retrying.",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

// ============================================================================
// Implementations
// ============================================================================

/// Rejects every item. Resolution then relies on fast matches only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopVerifier;

#[async_trait]
impl Verifier for NoopVerifier {
    async fn batch_verify(
        &self,
        items: &[VerificationItem],
    ) -> Result<Vec<VerificationVerdict>, DramatisError> {
        Ok(items.iter().map(|_| VerificationVerdict::rejected(0.0)).collect())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Deterministic verifier backed by known equivalences.
///
/// Every name resolves to its canonical entry (names absent from the table
/// resolve to themselves). An item matches when a candidate resolves to the
/// same identity as `new_name`; that candidate is the one named, preferring
/// the canonical spelling when it was shown.
#[derive(Debug, Clone, Default)]
pub struct DecisionTableVerifier {
    normalizer: NameNormalizer,
    /// normalized name → canonical display name
    canonical: HashMap<String, String>,
}

impl DecisionTableVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `canonical name → [aliases]` groups.
    pub fn from_groups(groups: &BTreeMap<String, Vec<String>>) -> Self {
        let mut table = Self::new();
        for (canonical, aliases) in groups {
            table.insert(canonical, aliases.iter().map(String::as_str));
        }
        table
    }

    /// Parse a JSON or YAML `canonical: [aliases]` document.
    pub fn from_document(contents: &str) -> Result<Self, DramatisError> {
        let groups: BTreeMap<String, Vec<String>> = match serde_json::from_str(contents) {
            Ok(groups) => groups,
            Err(_) => serde_yaml_ng::from_str(contents).map_err(|e| {
                DramatisError::Config(format!("Invalid decision table: {}", e))
            })?,
        };
        Ok(Self::from_groups(&groups))
    }

    pub fn insert<'a>(&mut self, canonical: &str, aliases: impl IntoIterator<Item = &'a str>) {
        let canonical = canonical.trim().to_string();
        for name in std::iter::once(canonical.as_str()).chain(aliases.into_iter().map(|a| a)) {
            let key = self.normalizer.normalize(name);
            if !key.is_empty() {
                self.canonical.insert(key, canonical.clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    fn resolve(&self, name: &str) -> String {
        let key = self.normalizer.normalize(name);
        self.canonical
            .get(&key)
            .map(|c| self.normalizer.normalize(c))
            .unwrap_or(key)
    }

    fn decide(&self, item: &VerificationItem) -> VerificationVerdict {
        let target = self.resolve(&item.new_name);
        if target.is_empty() {
            return VerificationVerdict::rejected(1.0);
        }
        let same: Vec<&str> = item
            .candidate_names
            .iter()
            .map(String::as_str)
            .filter(|c| self.resolve(c) == target)
            .collect();
        let Some(&first) = same.first() else {
            return VerificationVerdict::rejected(1.0);
        };

        let canonical = self.canonical.get(&self.normalizer.normalize(&item.new_name));
        let matching = canonical
            .and_then(|c| same.iter().copied().find(|n| n.trim().eq_ignore_ascii_case(c)))
            .unwrap_or(first);
        VerificationVerdict::matched(matching, 1.0)
    }
}

#[async_trait]
impl Verifier for DecisionTableVerifier {
    async fn batch_verify(
        &self,
        items: &[VerificationItem],
    ) -> Result<Vec<VerificationVerdict>, DramatisError> {
        Ok(items.iter().map(|item| self.decide(item)).collect())
    }

    fn name(&self) -> &str {
        "decision-table"
    }
}

/// Runs an external program per batch.
///
/// The program receives the items as a JSON array on stdin and must print
/// one verdict per item (a JSON array) on stdout.
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    program: String,
    args: Vec<String>,
}

impl CommandVerifier {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a shell-like command line on whitespace.
    pub fn from_command_line(command: &str) -> Result<Self, DramatisError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| DramatisError::Config("Verifier command is empty".to_string()))?;
        Ok(Self::new(program, parts.collect()))
    }
}

#[async_trait]
impl Verifier for CommandVerifier {
    async fn batch_verify(
        &self,
        items: &[VerificationItem],
    ) -> Result<Vec<VerificationVerdict>, DramatisError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let payload = serde_json::to_vec(items)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DramatisError::Transport(format!("spawning {}: {}", self.program, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DramatisError::Transport("no stdin from verifier process".into()))?;
        // Feed stdin while stdout is drained, so neither pipe can fill up.
        let writer = tokio::spawn(async move {
            let written = stdin.write_all(&payload).await;
            drop(stdin);
            written
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| DramatisError::Transport(format!("waiting for {}: {}", self.program, e)))?;
        match writer.await {
            Ok(Ok(())) => {}
            // The program may answer without reading all of its input.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!(program = %self.program, "verifier closed stdin early");
            }
            Ok(Err(e)) => {
                return Err(DramatisError::Transport(format!(
                    "writing to {}: {}",
                    self.program, e
                )))
            }
            Err(e) => {
                return Err(DramatisError::Transport(format!(
                    "stdin writer for {}: {}",
                    self.program, e
                )))
            }
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DramatisError::Transport(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(program = %self.program, bytes = stdout.len(), "verifier responded");
        parse_verdicts(&stdout, items.len())
    }

    fn name(&self) -> &str {
        &self.program
    }
}
