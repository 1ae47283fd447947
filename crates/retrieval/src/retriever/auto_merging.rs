//! Auto-merging strategy
//!
//! Every call builds a fresh hierarchy from that call's evidence, retrieves
//! the best leaves and then replaces sibling groups with their parent when
//! more than `threshold` of the parent's children were retrieved. Merging
//! repeats until nothing changes, so a grandparent can absorb merged parents.

use super::state::CallState;
use super::{sort_by_score, RetrievalState, Retriever, ScoredResult, ToolSearch};
use crate::evidence::MetadataMode;
use crate::hierarchy::{Hierarchy, HierarchyBuilder};
use crate::index::VectorIndex;
use crate::trace::TraceEmitter;
use async_trait::async_trait;
use augment_common::embeddings::Embedder;
use augment_common::errors::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Default fraction of children that must be retrieved to merge
pub const DEFAULT_MERGE_THRESHOLD: f32 = 0.5;

/// Merge retrieved nodes into their parents
///
/// A parent replaces its retrieved children when the retrieved fraction of
/// its children is strictly above `threshold`; its score is the mean of
/// those children's scores and it takes the position of the first of them.
/// Repeats until a pass makes no merge.
pub fn merge_into_parents(hierarchy: &Hierarchy, hits: Vec<(Uuid, f32)>, threshold: f32) -> Vec<(Uuid, f32)> {
    let mut current = hits;

    loop {
        let present: HashSet<Uuid> = current.iter().map(|(id, _)| *id).collect();
        let scores: HashMap<Uuid, f32> = current.iter().copied().collect();

        // parent id -> retrieved children, for parents that merge this pass
        let mut merges: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut decided: HashSet<Uuid> = HashSet::new();
        for (id, _) in &current {
            let Some(parent) = hierarchy.parent_of(id) else {
                continue;
            };
            if !decided.insert(parent.id) || present.contains(&parent.id) {
                continue;
            }

            let retrieved: Vec<Uuid> = parent
                .child_ids
                .iter()
                .filter(|c| present.contains(c))
                .copied()
                .collect();
            let ratio = retrieved.len() as f32 / parent.child_ids.len() as f32;
            if ratio > threshold {
                merges.insert(parent.id, retrieved);
            }
        }

        if merges.is_empty() {
            return current;
        }

        let absorbed: HashMap<Uuid, Uuid> = merges
            .iter()
            .flat_map(|(parent, children)| children.iter().map(move |c| (*c, *parent)))
            .collect();

        let mut next = Vec::with_capacity(current.len());
        let mut placed: HashSet<Uuid> = HashSet::new();
        for (id, score) in current {
            match absorbed.get(&id) {
                Some(parent) => {
                    if placed.insert(*parent) {
                        let children = &merges[parent];
                        let total: f32 = children.iter().map(|c| scores[c]).sum();
                        next.push((*parent, total / children.len() as f32));
                    }
                }
                None => next.push((id, score)),
            }
        }

        debug!(merged = merges.len(), remaining = next.len(), "Merged into parents");
        current = next;
    }
}

/// Load-and-search over a per-call evidence hierarchy
pub struct AutoMergingRetriever {
    search: ToolSearch,
    embedder: Arc<dyn Embedder>,
    builder: HierarchyBuilder,
    top_k: usize,
    threshold: f32,
}

impl AutoMergingRetriever {
    pub fn new(search: ToolSearch, embedder: Arc<dyn Embedder>, builder: HierarchyBuilder, top_k: usize) -> Self {
        Self {
            search,
            embedder,
            builder,
            top_k,
            threshold: DEFAULT_MERGE_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_tracer(self, tracer: TraceEmitter) -> Self {
        Self {
            search: self.search.with_tracer(tracer),
            ..self
        }
    }

    async fn run(&self, query: &str, call: &mut CallState) -> Result<Vec<ScoredResult>> {
        let loaded = self.search.load(query, call).await?;
        let hierarchy = self.builder.build(&loaded.units)?;

        let (leaf_ids, texts): (Vec<Uuid>, Vec<String>) = hierarchy
            .leaves()
            .map(|leaf| (leaf.id, leaf.unit().content(MetadataMode::Embed)))
            .unzip();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        let query_embedding = self.embedder.embed(query).await?;

        let mut index = VectorIndex::new();
        index.extend(leaf_ids, embeddings)?;

        call.advance(RetrievalState::Retrieving);
        let hits: Vec<(Uuid, f32)> = index
            .search(&query_embedding, self.top_k)
            .into_iter()
            .map(|(id, score)| (*id, score))
            .collect();
        let leaves = hits.len();

        let mut results: Vec<ScoredResult> = merge_into_parents(&hierarchy, hits, self.threshold)
            .into_iter()
            .filter_map(|(id, score)| {
                hierarchy
                    .get(&id)
                    .map(|node| ScoredResult::from_node(node.clone(), Some(score)))
            })
            .collect();
        sort_by_score(&mut results);

        debug!(
            retriever = self.search.name(),
            nodes = hierarchy.len(),
            leaves,
            results = results.len(),
            "Auto-merging search"
        );
        self.search.trace_results(&loaded.tool_query, &results);
        Ok(results)
    }
}

#[async_trait]
impl Retriever for AutoMergingRetriever {
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
