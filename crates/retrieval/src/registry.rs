//! Configured retriever set
//!
//! Built once at startup from [`AppConfig`] and passed to whatever composes
//! the fan-out. Sources keep their configured order.

use crate::hierarchy::HierarchyBuilder;
use crate::retriever::{
    AutoMergingRetriever, FlatRetriever, MultiRetriever, Retriever, SimpleRetriever, ToolSearch,
};
use crate::rewrite::QueryRewriter;
use crate::tools::{build_tool, Tool};
use crate::trace::TraceEmitter;
use augment_common::config::{AppConfig, RetrievalConfig, SourceConfig, StrategyKind};
use augment_common::embeddings::Embedder;
use augment_common::errors::{AppError, Result};
use augment_common::llm::Completer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A named retriever with the description shown to planners
#[derive(Clone)]
pub struct RetrieverEntry {
    pub name: String,
    pub description: String,
    pub retriever: Arc<dyn Retriever>,
}

/// Build the retriever for one source around an already constructed tool
pub fn build_retriever(
    source: &SourceConfig,
    tool: Arc<dyn Tool>,
    completer: Arc<dyn Completer>,
    embedder: Arc<dyn Embedder>,
    retrieval: &RetrievalConfig,
) -> Result<Arc<dyn Retriever>> {
    let search = ToolSearch::new(source.name.clone(), tool, QueryRewriter::new(completer))
        .skip_rewrite(source.skip_rewrite);

    let retriever: Arc<dyn Retriever> = match source.strategy {
        StrategyKind::Flat => Arc::new(FlatRetriever::new(search, embedder, source.top_k)),
        StrategyKind::AutoMerging => {
            let builder = HierarchyBuilder::new(&retrieval.chunk_sizes)?;
            Arc::new(
                AutoMergingRetriever::new(search, embedder, builder, source.top_k)
                    .with_threshold(retrieval.merge_threshold),
            )
        }
        StrategyKind::Simple => Arc::new(SimpleRetriever::new(search)),
    };
    Ok(retriever)
}

pub struct RetrieverRegistry {
    entries: Vec<RetrieverEntry>,
    deadline: Option<Duration>,
}

impl RetrieverRegistry {
    pub fn new(entries: Vec<RetrieverEntry>) -> Self {
        Self {
            entries,
            deadline: None,
        }
    }

    /// Build every configured source
    ///
    /// A source whose tool cannot be constructed (usually missing
    /// credentials) is skipped with a warning. Fails when nothing is left.
    pub fn from_config(
        config: &AppConfig,
        completer: Arc<dyn Completer>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let mut entries = Vec::with_capacity(config.retrieval.sources.len());

        for source in &config.retrieval.sources {
            let tool = match build_tool(source.tool, &config.tools) {
                Ok(tool) => tool,
                Err(e) => {
                    warn!(retriever = %source.name, tool = source.tool.as_str(), error = %e, "Skipping retriever");
                    continue;
                }
            };

            let retriever = build_retriever(
                source,
                tool,
                completer.clone(),
                embedder.clone(),
                &config.retrieval,
            )?;
            info!(retriever = %source.name, strategy = ?source.strategy, "Retriever ready");
            entries.push(RetrieverEntry {
                name: source.name.clone(),
                description: source.description.clone(),
                retriever,
            });
        }

        if entries.is_empty() {
            return Err(AppError::Configuration {
                message: "no retriever could be built from retrieval.sources".to_string(),
            });
        }

        Ok(Self {
            entries,
            deadline: config.fanout_timeout(),
        })
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn get(&self, name: &str) -> Option<&RetrieverEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn entries(&self) -> &[RetrieverEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fan-out over every entry in configured order
    pub fn multi(&self, tracer: Option<TraceEmitter>) -> MultiRetriever {
        let retrievers = self.entries.iter().map(|e| e.retriever.clone()).collect();
        let multi = MultiRetriever::new(retrievers).with_deadline(self.deadline);
        match tracer {
            Some(tracer) => multi.with_tracer(tracer),
            None => multi,
        }
    }
}
