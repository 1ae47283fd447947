//! Retrieval strategies
//!
//! Load-and-search retrievers drive one tool each:
//! - Flat (one index that grows across calls)
//! - Auto-merging (fresh hierarchy per call, leaves merged into parents)
//! - Simple (tool output order is the ranking)
//!
//! Corpus retrievers (dense, BM25) search a fixed unit set, and the hybrid
//! and multi retrievers compose other retrievers.

mod auto_merging;
mod corpus;
mod flat;
mod hybrid;
mod multi;
mod simple;
mod state;

pub use auto_merging::{merge_into_parents, AutoMergingRetriever, DEFAULT_MERGE_THRESHOLD};
pub use corpus::{BM25Retriever, Corpus, VectorRetriever};
pub use flat::FlatRetriever;
pub use hybrid::{dedup_by_identity, HybridRetriever};
pub use multi::MultiRetriever;
pub use simple::SimpleRetriever;
pub use state::RetrievalState;

use crate::evidence::{normalize, EvidenceUnit, MetadataMode};
use crate::hierarchy::EvidenceNode;
use crate::index::by_score_desc;
use crate::rewrite::QueryRewriter;
use crate::tools::Tool;
use crate::trace::TraceEmitter;
use async_trait::async_trait;
use augment_common::errors::Result;
use state::CallState;
use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

/// What a result points at
#[derive(Debug, Clone)]
pub enum Evidence {
    Unit(EvidenceUnit),
    Node(EvidenceNode),
}

/// A retrieved unit or hierarchy node with its relevance
#[derive(Debug, Clone)]
pub struct ScoredResult {
    pub evidence: Evidence,
    /// Higher is more relevant; `None` when the strategy does not score
    pub score: Option<f32>,
}

impl ScoredResult {
    pub fn from_unit(unit: EvidenceUnit, score: Option<f32>) -> Self {
        Self {
            evidence: Evidence::Unit(unit),
            score,
        }
    }

    pub fn from_node(node: EvidenceNode, score: Option<f32>) -> Self {
        Self {
            evidence: Evidence::Node(node),
            score,
        }
    }

    /// Underlying unit
    pub fn unit(&self) -> &EvidenceUnit {
        match &self.evidence {
            Evidence::Unit(unit) => unit,
            Evidence::Node(node) => node.unit(),
        }
    }

    /// Stable identity used for deduplication
    pub fn identity(&self) -> Uuid {
        self.unit().id()
    }

    pub fn content(&self, mode: MetadataMode) -> String {
        self.unit().content(mode)
    }
}

/// Sort best-first; equal scores keep their input order
///
/// NaN scores rank after every real score, and unscored results go last.
pub fn sort_by_score(results: &mut [ScoredResult]) {
    results.sort_by(|a, b| match (a.score, b.score) {
        (Some(x), Some(y)) => by_score_desc(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Common trait for all retrievers
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve results for the query
    async fn retrieve(&self, query: &str) -> Result<Vec<ScoredResult>>;

    /// Name used in logs, metrics and traces
    fn name(&self) -> &str;
}

/// Synchronous entry point for callers outside a runtime
pub trait RetrieveBlocking {
    /// Drive `retrieve` on a private current-thread runtime
    ///
    /// Panics if called from inside an async context.
    fn retrieve_blocking(&self, query: &str) -> Result<Vec<ScoredResult>>;
}

impl<R: Retriever + ?Sized> RetrieveBlocking for R {
    fn retrieve_blocking(&self, query: &str) -> Result<Vec<ScoredResult>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.retrieve(query))
    }
}

/// Evidence loaded for one call
pub(crate) struct Loaded {
    /// Query actually sent to the tool
    pub tool_query: String,
    pub units: Vec<EvidenceUnit>,
}

/// Rewrite, invoke and normalize: the front half shared by every
/// load-and-search strategy
#[derive(Clone)]
pub struct ToolSearch {
    name: String,
    tool: Arc<dyn Tool>,
    rewriter: QueryRewriter,
    skip_rewrite: bool,
    tracer: Option<TraceEmitter>,
}

impl ToolSearch {
    pub fn new(name: impl Into<String>, tool: Arc<dyn Tool>, rewriter: QueryRewriter) -> Self {
        Self {
            name: name.into(),
            tool,
            rewriter,
            skip_rewrite: false,
            tracer: None,
        }
    }

    /// Send the question to the tool unchanged
    pub fn skip_rewrite(mut self, skip: bool) -> Self {
        self.skip_rewrite = skip;
        self
    }

    /// Emit a start trace when a call begins and an end trace with the
    /// rewritten query once it has results
    ///
    /// For a retriever used on its own; inside a `MultiRetriever` the multi
    /// tracer already covers every sub-retriever.
    pub fn with_tracer(mut self, tracer: TraceEmitter) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tool(&self) -> &Arc<dyn Tool> {
        &self.tool
    }

    pub(crate) async fn load(&self, query: &str, call: &mut CallState) -> Result<Loaded> {
        if let Some(tracer) = &self.tracer {
            tracer.start(self.tool.name());
        }

        call.advance(RetrievalState::Rewriting);
        let tool_query = self
            .rewriter
            .rewrite(query, self.tool.description(), self.skip_rewrite)
            .await?;

        call.advance(RetrievalState::ToolInvoked);
        tracing::info!(retriever = %self.name, tool = self.tool.name(), query = %tool_query, "Invoking tool");
        let raw = self.tool.invoke(&tool_query).await?;

        call.advance(RetrievalState::Indexing);
        let units = normalize(raw);
        Ok(Loaded { tool_query, units })
    }

    pub(crate) fn begin(&self) -> CallState {
        CallState::new(&self.name)
    }

    pub(crate) fn trace_results(&self, tool_query: &str, results: &[ScoredResult]) {
        if let Some(tracer) = &self.tracer {
            tracer.end(self.tool.name(), tool_query, results);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(text: &str, score: Option<f32>) -> ScoredResult {
        ScoredResult::from_unit(EvidenceUnit::text(text), score)
    }

    #[test]
    fn test_sort_is_stable_and_unscored_last() {
        let mut results = vec![
            scored("none", None),
            scored("low", Some(0.1)),
            scored("tie-a", Some(0.5)),
            scored("tie-b", Some(0.5)),
        ];
        sort_by_score(&mut results);
        let order: Vec<&str> = results.iter().map(|r| r.unit().text_content()).collect();
        assert_eq!(order, vec!["tie-a", "tie-b", "low", "none"]);
    }

    #[test]
    fn test_sort_orders_nan_after_real_scores() {
        let mut results: Vec<ScoredResult> = (0..40)
            .map(|i| {
                let score = if i % 3 == 0 { f32::NAN } else { i as f32 };
                scored(&i.to_string(), Some(score))
            })
            .collect();
        results.push(scored("none", None));

        sort_by_score(&mut results);

        let order: Vec<&str> = results.iter().map(|r| r.unit().text_content()).collect();
        assert_eq!(order[0], "38");
        assert_eq!(order[25], "1");
        assert_eq!(&order[26..29], &["0", "3", "6"]);
        assert_eq!(order[40], "none");
        assert!(results[..26].iter().all(|r| r.score.is_some_and(|s| !s.is_nan())));
    }

    #[test]
    fn test_identity_follows_unit() {
        let result = scored("x", None);
        assert_eq!(result.identity(), result.unit().id());
    }
}
