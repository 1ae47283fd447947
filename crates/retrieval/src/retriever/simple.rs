//! Pass-through strategy for pre-ranked tools

use super::state::CallState;
use super::{RetrievalState, Retriever, ScoredResult, ToolSearch};
use crate::trace::TraceEmitter;
use async_trait::async_trait;
use augment_common::errors::Result;

/// Returns the tool's units unscored, in the tool's order
pub struct SimpleRetriever {
    search: ToolSearch,
}

impl SimpleRetriever {
    pub fn new(search: ToolSearch) -> Self {
        Self { search }
    }

    pub fn with_tracer(self, tracer: TraceEmitter) -> Self {
        Self {
            search: self.search.with_tracer(tracer),
        }
    }

    async fn run(&self, query: &str, call: &mut CallState) -> Result<Vec<ScoredResult>> {
        let loaded = self.search.load(query, call).await?;
        call.advance(RetrievalState::Retrieving);
        let results: Vec<ScoredResult> = loaded
            .units
            .into_iter()
            .map(|unit| ScoredResult::from_unit(unit, None))
            .collect();
        self.search.trace_results(&loaded.tool_query, &results);
        Ok(results)
    }
}

#[async_trait]
impl Retriever for SimpleRetriever {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::RawOutput;
    use crate::rewrite::QueryRewriter;
    use crate::testing::{MockCompleter, MockTool};
    use crate::trace::{spawn_trace_publisher, MemoryPublisher};
    use std::sync::Arc;

    fn listed(texts: &[&str]) -> RawOutput {
        RawOutput::Sequence(texts.iter().map(|t| RawOutput::Text(t.to_string())).collect())
    }

    #[tokio::test]
    async fn test_units_keep_tool_order_without_scores() {
        let tool = Arc::new(MockTool::new(
            "image_search",
            RawOutput::Sequence(vec![RawOutput::Text("first".into()), RawOutput::Text("second".into())]),
        ));
        let rewriter = QueryRewriter::new(Arc::new(MockCompleter::fixed("short query")));
        let retriever = SimpleRetriever::new(ToolSearch::new("images", tool.clone(), rewriter));

        let results = retriever.retrieve("a long question").await.unwrap();

        let texts: Vec<&str> = results.iter().map(|r| r.unit().text_content()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert!(results.iter().all(|r| r.score.is_none()));
        assert_eq!(tool.queries(), vec!["short query".to_string()]);
    }

    #[tokio::test]
    async fn test_tool_failure_fails_the_call() {
        let rewriter = QueryRewriter::new(Arc::new(MockCompleter::fixed("q")));
        let retriever = SimpleRetriever::new(ToolSearch::new(
            "images",
            Arc::new(MockTool::failing("image_search")),
            rewriter,
        ));
        assert!(retriever.retrieve("question").await.is_err());
    }

    #[tokio::test]
    async fn test_tracer_pairs_start_and_end_with_rewritten_query() {
        let sink = Arc::new(MemoryPublisher::new());
        let (emitter, handle) = spawn_trace_publisher(sink.clone(), "tools");
        let tool = Arc::new(MockTool::new("image_search", listed(&["first", "second"])));
        let rewriter = QueryRewriter::new(Arc::new(MockCompleter::fixed("short query")));
        let retriever = SimpleRetriever::new(ToolSearch::new("images", tool, rewriter)).with_tracer(emitter);

        retriever.retrieve("a long question").await.unwrap();
        retriever.retrieve("another long question").await.unwrap();
        drop(retriever);
        assert_eq!(handle.await.unwrap(), 4);

        let traces = sink.traces();
        let starts: Vec<bool> = traces.iter().map(|t| t.is_start()).collect();
        assert_eq!(starts, vec![true, false, true, false]);
        assert!(traces.iter().all(|t| t.tool_name == "image_search"));
        assert_eq!(traces[1].query.as_deref(), Some("short query"));
        assert_eq!(traces[1].results.len(), 2);
    }

    #[tokio::test]
    async fn test_tracer_starts_before_rewrite() {
        let sink = Arc::new(MemoryPublisher::new());
        let (emitter, handle) = spawn_trace_publisher(sink.clone(), "tools");
        let tool = Arc::new(MockTool::new("image_search", listed(&["first"])));
        let rewriter = QueryRewriter::new(Arc::new(MockCompleter::failing()));
        let retriever = SimpleRetriever::new(ToolSearch::new("images", tool.clone(), rewriter)).with_tracer(emitter);

        assert!(retriever.retrieve("a long question").await.is_err());
        drop(retriever);
        assert_eq!(handle.await.unwrap(), 1);

        let traces = sink.traces();
        assert!(traces[0].is_start());
        assert!(tool.queries().is_empty());
    }
}
