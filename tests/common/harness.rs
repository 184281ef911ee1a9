//! Verifier doubles for resolution tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use dramatis::services::{
    DecisionTableVerifier, VerificationItem, VerificationVerdict, Verifier,
};
use dramatis::DramatisError;

/// Decision table that knows Huck and Tom by their short names.
pub fn huck_table() -> DecisionTableVerifier {
    let mut table = DecisionTableVerifier::new();
    table.insert("Huckleberry Finn", ["Huck", "Huckleberry"]);
    table.insert("Tom Sawyer", ["Tom"]);
    table
}

/// Wraps a verifier and records every batch it sees.
pub struct Recording<V> {
    inner: V,
    calls: AtomicUsize,
    batches: Mutex<Vec<Vec<VerificationItem>>>,
}

impl<V: Verifier> Recording<V> {
    pub fn new(inner: V) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> Vec<Vec<VerificationItem>> {
        self.batches.lock().expect("lock").clone()
    }
}

#[async_trait]
impl<V: Verifier> Verifier for Recording<V> {
    async fn batch_verify(
        &self,
        items: &[VerificationItem],
    ) -> Result<Vec<VerificationVerdict>, DramatisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().expect("lock").push(items.to_vec());
        self.inner.batch_verify(items).await
    }
}

/// Fails every call with a transport error.
pub struct Unreachable;

#[async_trait]
impl Verifier for Unreachable {
    async fn batch_verify(
        &self,
        _items: &[VerificationItem],
    ) -> Result<Vec<VerificationVerdict>, DramatisError> {
        Err(DramatisError::Transport("connection refused".to_string()))
    }
}

/// Answers with a fixed raw response, parsed like a real model reply.
pub struct CannedResponse(pub &'static str);

#[async_trait]
impl Verifier for CannedResponse {
    async fn batch_verify(
        &self,
        items: &[VerificationItem],
    ) -> Result<Vec<VerificationVerdict>, DramatisError> {
        dramatis::services::parse_verdicts(self.0, items.len())
    }
}

/// Accepts every item, naming the first candidate.
pub struct AcceptAll;

#[async_trait]
impl Verifier for AcceptAll {
    async fn batch_verify(
        &self,
        items: &[VerificationItem],
    ) -> Result<Vec<VerificationVerdict>, DramatisError> {
        Ok(items
            .iter()
            .map(|item| match item.candidate_names.first() {
                Some(first) => VerificationVerdict::matched(first.clone(), 0.9),
                None => VerificationVerdict::rejected(0.0),
            })
            .collect())
    }
}
