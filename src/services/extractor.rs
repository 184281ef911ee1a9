//! Upstream mention extraction.
//!
//! Chunks are extracted concurrently through a bounded worker pool; results
//! come back in chunk order so the resolution pass sees one ordered list.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use tracing::{info, warn};

use crate::models::RawMention;
use crate::DramatisError;

/// Capability that finds character mentions in one text window.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Mentions found in `window`, possibly none.
    async fn extract(
        &self,
        window: &str,
        chunk_index: usize,
    ) -> Result<Vec<RawMention>, DramatisError>;
}

/// Replays mentions extracted earlier, one list per chunk.
#[derive(Debug, Clone, Default)]
pub struct PreExtracted {
    chunks: Vec<Vec<RawMention>>,
}

impl PreExtracted {
    pub fn new(chunks: Vec<Vec<RawMention>>) -> Self {
        Self { chunks }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Placeholder windows, one per stored chunk.
    pub fn windows(&self) -> Vec<String> {
        vec![String::new(); self.chunks.len()]
    }
}

#[async_trait]
impl Extractor for PreExtracted {
    async fn extract(
        &self,
        _window: &str,
        chunk_index: usize,
    ) -> Result<Vec<RawMention>, DramatisError> {
        Ok(self.chunks.get(chunk_index).cloned().unwrap_or_default())
    }
}

/// Result of extracting every window.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionReport {
    /// All mentions, in chunk order.
    pub mentions: Vec<RawMention>,
    pub chunks: usize,
    pub failed_chunks: Vec<usize>,
}

/// Extract all `windows` with at most `workers` calls in flight.
///
/// A failed chunk is logged and contributes no mentions. Every returned
/// mention carries the index of the chunk it came from.
pub async fn extract_chunks(
    extractor: &dyn Extractor,
    windows: &[String],
    workers: usize,
) -> ExtractionReport {
    let results: Vec<(usize, Result<Vec<RawMention>, DramatisError>)> =
        futures::stream::iter(windows.iter().enumerate())
            .map(|(chunk, window)| async move { (chunk, extractor.extract(window, chunk).await) })
            .buffered(workers.max(1))
            .collect()
            .await;

    let mut report = ExtractionReport {
        chunks: windows.len(),
        ..Default::default()
    };
    for (chunk, result) in results {
        match result {
            Ok(mentions) => {
                report.mentions.extend(mentions.into_iter().map(|mut m| {
                    m.source_chunk = chunk;
                    m
                }));
            }
            Err(e) => {
                warn!(chunk, "Extraction failed: {}. Chunk contributes no mentions.", e);
                report.failed_chunks.push(chunk);
            }
        }
    }

    info!(
        chunks = report.chunks,
        mentions = report.mentions.len(),
        failed = report.failed_chunks.len(),
        "extraction complete"
    );
    report
}
