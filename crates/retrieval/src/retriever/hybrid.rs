//! Hybrid retrieval combining lexical and dense search
//!
//! Lexical runs first, then dense; results are concatenated and
//! deduplicated by unit identity, first occurrence wins. Scores from the
//! two sides are not renormalized and are not comparable.

use super::{BM25Retriever, Corpus, Retriever, ScoredResult, VectorRetriever};
use async_trait::async_trait;
use augment_common::embeddings::Embedder;
use augment_common::errors::Result;
use std::collections::HashSet;
use std::sync::Arc;

/// Hybrid retriever over a lexical and a dense retriever
pub struct HybridRetriever {
    name: String,
    lexical: Arc<dyn Retriever>,
    dense: Arc<dyn Retriever>,
}

impl HybridRetriever {
    pub fn new(name: impl Into<String>, lexical: Arc<dyn Retriever>, dense: Arc<dyn Retriever>) -> Self {
        Self {
            name: name.into(),
            lexical,
            dense,
        }
    }

    /// BM25 plus vector search over one corpus
    pub async fn from_corpus(
        name: impl Into<String>,
        corpus: &Corpus,
        embedder: Arc<dyn Embedder>,
        top_k: usize,
    ) -> Result<Self> {
        let lexical = BM25Retriever::new(corpus, top_k)?;
        let dense = VectorRetriever::build(corpus, embedder, top_k).await?;
        Ok(Self::new(name, Arc::new(lexical), Arc::new(dense)))
    }
}

/// Keep the first result for each identity, preserving order
pub fn dedup_by_identity(results: Vec<ScoredResult>) -> Vec<ScoredResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.identity()))
        .collect()
}

#[async_trait]
impl Retriever for HybridRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<ScoredResult>> {
        // Sequential so the dedup tie-break is deterministic
        let mut results = self.lexical.retrieve(query).await?;
        let lexical = results.len();
        results.extend(self.dense.retrieve(query).await?);

        let merged = dedup_by_identity(results);
        tracing::debug!(
            retriever = %self.name,
            lexical,
            merged = merged.len(),
            "Hybrid retrieval"
        );
        Ok(merged)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
