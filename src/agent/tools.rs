//! Evidence retrieval and the per-worker tool budget
//!
//! Evidence search is advisory. A provider that fails or stalls degrades
//! to "no evidence found" rather than failing the worker; only exhausting
//! the call budget or calling after cancellation is a worker failure.

use super::cancel::CancellationToken;
use super::worker::WorkerFailure;
use crate::graph::EvidenceRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// One retrieved piece of evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: String,
    pub content: String,
    /// Free-form origin tag (`paper`, `web`, `dataset`, ...)
    pub source_type: String,
    /// How much the provider trusts this item, in [0, 1]
    pub confidence_hint: f64,
}

impl Evidence {
    pub fn new(id: impl Into<String>, content: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            source_type: source_type.into(),
            confidence_hint: 0.5,
        }
    }

    pub fn with_confidence_hint(mut self, hint: f64) -> Self {
        self.confidence_hint = hint.clamp(0.0, 1.0);
        self
    }

    /// Citation to attach to a node or edge
    pub fn to_ref(&self) -> EvidenceRef {
        EvidenceRef::new(&self.id, &self.source_type)
    }
}

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("evidence provider unavailable: {0}")]
    Unavailable(String),
    #[error("malformed evidence response: {0}")]
    Malformed(String),
}

/// External evidence source
#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Evidence>, EvidenceError>;
}

/// In-memory corpus matched by query terms
#[derive(Debug, Clone, Default)]
pub struct StaticEvidence {
    items: Vec<Evidence>,
}

impl StaticEvidence {
    pub fn new(items: Vec<Evidence>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl EvidenceProvider for StaticEvidence {
    async fn search(&self, query: &str) -> Result<Vec<Evidence>, EvidenceError> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .filter(|t| t.len() > 2)
            .collect();
        Ok(self
            .items
            .iter()
            .filter(|e| {
                let content = e.content.to_lowercase();
                terms.iter().any(|t| content.contains(t.as_str()))
            })
            .cloned()
            .collect())
    }
}

/// The tools one worker may use, with its call budget.
///
/// Clones share the budget counter.
#[derive(Clone)]
pub struct ToolBox {
    evidence: Option<Arc<dyn EvidenceProvider>>,
    max_calls: usize,
    calls: Arc<AtomicUsize>,
    call_timeout: Duration,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ToolBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBox")
            .field("has_evidence", &self.evidence.is_some())
            .field("max_calls", &self.max_calls)
            .field("calls", &self.calls.load(Ordering::Relaxed))
            .finish()
    }
}

impl ToolBox {
    pub fn new(
        evidence: Option<Arc<dyn EvidenceProvider>>,
        max_calls: usize,
        call_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            evidence,
            max_calls,
            calls: Arc::new(AtomicUsize::new(0)),
            call_timeout,
            cancel,
        }
    }

    /// A toolbox with no evidence provider
    pub fn offline(max_calls: usize) -> Self {
        Self::new(None, max_calls, Duration::from_secs(10), CancellationToken::new())
    }

    /// Search for evidence, spending one call from the budget
    pub async fn search(&self, query: &str) -> Result<Vec<Evidence>, WorkerFailure> {
        if self.cancel.is_cancelled() {
            return Err(WorkerFailure::ToolError("round cancelled".to_string()));
        }
        let used = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if used > self.max_calls {
            return Err(WorkerFailure::ToolError(format!(
                "tool budget of {} calls exhausted",
                self.max_calls
            )));
        }
        let Some(provider) = &self.evidence else {
            return Ok(Vec::new());
        };
        match tokio::time::timeout(self.call_timeout, provider.search(query)).await {
            Ok(Ok(found)) => Ok(found),
            Ok(Err(e)) => {
                warn!(query, error = %e, "evidence search failed; continuing without evidence");
                Ok(Vec::new())
            }
            Err(_) => {
                warn!(
                    query,
                    timeout_ms = self.call_timeout.as_millis() as u64,
                    "evidence search timed out; continuing without evidence"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Calls spent so far (including refused ones)
    pub fn calls_made(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.max_calls.saturating_sub(self.calls_made())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    #[async_trait]
    impl EvidenceProvider for FailingProvider {
        async fn search(&self, _query: &str) -> Result<Vec<Evidence>, EvidenceError> {
            Err(EvidenceError::Unavailable("connection refused".to_string()))
        }
    }

    struct StalledProvider;

    #[async_trait]
    impl EvidenceProvider for StalledProvider {
        async fn search(&self, _query: &str) -> Result<Vec<Evidence>, EvidenceError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    fn toolbox(provider: Arc<dyn EvidenceProvider>, max_calls: usize) -> ToolBox {
        ToolBox::new(
            Some(provider),
            max_calls,
            Duration::from_secs(5),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn static_corpus_matches_terms() {
        let corpus = StaticEvidence::new(vec![
            Evidence::new("e1", "Drug A reduced mortality by 12%", "paper"),
            Evidence::new("e2", "Unrelated weather report", "web"),
        ]);
        let tools = toolbox(Arc::new(corpus), 10);
        let found = tools.search("mortality drug").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].to_ref().source_id, "e1");
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_empty() {
        let tools = toolbox(Arc::new(FailingProvider), 10);
        assert!(tools.search("anything").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn provider_stall_degrades_to_empty() {
        let tools = toolbox(Arc::new(StalledProvider), 10);
        assert!(tools.search("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn budget_is_enforced_across_clones() {
        let tools = ToolBox::offline(2);
        let clone = tools.clone();
        assert!(tools.search("a").await.is_ok());
        assert!(clone.search("b").await.is_ok());
        let err = tools.search("c").await.unwrap_err();
        assert!(matches!(err, WorkerFailure::ToolError(_)));
        assert_eq!(clone.remaining(), 0);
    }

    #[tokio::test]
    async fn cancelled_round_refuses_calls() {
        let cancel = CancellationToken::new();
        let tools = ToolBox::new(None, 5, Duration::from_secs(1), cancel.clone());
        cancel.cancel();
        assert!(tools.search("a").await.is_err());
        assert_eq!(tools.calls_made(), 0);
    }
}
