//! Flat strategy: one vector index that grows with every call
//!
//! The index is the only retrieval state that outlives a call. Units are
//! never evicted; `indexed_len` exposes the growth and `reset` drops it.

use super::state::CallState;
use super::{RetrievalState, Retriever, ScoredResult, ToolSearch};
use crate::evidence::{EvidenceUnit, MetadataMode};
use crate::index::VectorIndex;
use crate::trace::TraceEmitter;
use async_trait::async_trait;
use augment_common::embeddings::Embedder;
use augment_common::errors::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Load-and-search over a cumulative vector index
pub struct FlatRetriever {
    search: ToolSearch,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    index: Mutex<Option<VectorIndex<EvidenceUnit>>>,
}

impl FlatRetriever {
    pub fn new(search: ToolSearch, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self {
            search,
            embedder,
            top_k,
            index: Mutex::new(None),
        }
    }

    pub fn with_tracer(self, tracer: TraceEmitter) -> Self {
        Self {
            search: self.search.with_tracer(tracer),
            ..self
        }
    }

    /// Units accumulated so far
    pub async fn indexed_len(&self) -> usize {
        self.index.lock().await.as_ref().map_or(0, VectorIndex::len)
    }

    /// Drop the index; the next call starts a new one
    pub async fn reset(&self) {
        *self.index.lock().await = None;
    }

    async fn run(&self, query: &str, call: &mut CallState) -> Result<Vec<ScoredResult>> {
        let loaded = self.search.load(query, call).await?;

        let texts: Vec<String> = loaded
            .units
            .iter()
            .map(|u| u.content(MetadataMode::Embed))
            .collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        let query_embedding = self.embedder.embed(query).await?;

        // Insert and search under one lock so concurrent calls never see a
        // half-extended index
        let mut guard = self.index.lock().await;
        let index = guard.get_or_insert_with(VectorIndex::new);
        index.extend(loaded.units, embeddings)?;

        call.advance(RetrievalState::Retrieving);
        let results: Vec<ScoredResult> = index
            .search(&query_embedding, self.top_k)
            .into_iter()
            .map(|(unit, score)| ScoredResult::from_unit(unit.clone(), Some(score)))
            .collect();
        let indexed = index.len();
        drop(guard);

        debug!(retriever = self.search.name(), indexed, results = results.len(), "Flat search");
        self.search.trace_results(&loaded.tool_query, &results);
        Ok(results)
    }
}

#[async_trait]
impl Retriever for FlatRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<ScoredResult>> {
        let mut call = self.search.begin();
        let outcome = self.run(query, &mut call).await;
        call.finish(&outcome);
        outcome
    }

    fn name(&self) -> &str {
        self.search.name()
    }
}
