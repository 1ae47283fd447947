//! Dense and lexical retrievers over a fixed corpus
//!
//! Both index clones of the same units, so results from either side share
//! identities and can be deduplicated by the hybrid retriever.

use super::{Retriever, ScoredResult};
use crate::evidence::{EvidenceUnit, MetadataMode};
use crate::index::{LexicalIndex, VectorIndex};
use async_trait::async_trait;
use augment_common::embeddings::Embedder;
use augment_common::errors::Result;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Units shared by corpus retrievers
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    units: Arc<Vec<EvidenceUnit>>,
}

impl Corpus {
    pub fn new(units: Vec<EvidenceUnit>) -> Self {
        Self {
            units: Arc::new(units),
        }
    }

    pub fn units(&self) -> &[EvidenceUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    fn embed_texts(&self) -> Vec<String> {
        self.units.iter().map(|u| u.content(MetadataMode::Embed)).collect()
    }
}

impl From<Vec<EvidenceUnit>> for Corpus {
    fn from(units: Vec<EvidenceUnit>) -> Self {
        Self::new(units)
    }
}

/// Vector retriever using embedding similarity
pub struct VectorRetriever {
    index: VectorIndex<EvidenceUnit>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl VectorRetriever {
    /// Embed the corpus and build the index
    pub async fn build(corpus: &Corpus, embedder: Arc<dyn Embedder>, top_k: usize) -> Result<Self> {
        let embeddings = embedder.embed_batch(&corpus.embed_texts()).await?;
        let mut index = VectorIndex::new();
        index.extend(corpus.units().to_vec(), embeddings)?;
        Ok(Self {
            index,
            embedder,
            top_k,
        })
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<ScoredResult>> {
        let embedding = self.embedder.embed(query).await?;
        Ok(self
            .index
            .search(&embedding, self.top_k)
            .into_iter()
            .map(|(unit, score)| ScoredResult::from_unit(unit.clone(), Some(score)))
            .collect())
    }

    fn name(&self) -> &str {
        "vector"
    }
}

/// BM25 retriever over the corpus text
pub struct BM25Retriever {
    index: LexicalIndex,
    units: HashMap<Uuid, EvidenceUnit>,
    top_k: usize,
}

impl BM25Retriever {
    pub fn new(corpus: &Corpus, top_k: usize) -> Result<Self> {
        let index = LexicalIndex::build(
            corpus
                .units()
                .iter()
                .map(|unit| (unit.id(), unit.content(MetadataMode::Embed))),
        )?;
        let units = corpus.units().iter().map(|u| (u.id(), u.clone())).collect();
        Ok(Self { index, units, top_k })
    }
}

#[async_trait]
impl Retriever for BM25Retriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<ScoredResult>> {
        Ok(self
            .index
            .search(query, self.top_k)?
            .into_iter()
            .filter_map(|(id, score)| {
                let unit = self.units.get(&id)?;
                Some(ScoredResult::from_unit(unit.clone(), Some(score)))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "bm25"
    }
}
