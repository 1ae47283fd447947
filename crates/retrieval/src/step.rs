//! Host-facing step functions
//!
//! A host runs steps with named inputs and collects named outputs:
//! - `SearchStep`: `query` -> `nodes`
//! - `ResponseStep`: `nodes` (and optionally `query`) -> `response`

use crate::evidence::MetadataMode;
use crate::retriever::{MultiRetriever, Retriever, ScoredResult};
use crate::rewrite::fill_template;
use async_trait::async_trait;
use augment_common::errors::{AppError, Result};
use augment_common::llm::{ChatMessage, Completer};
use std::collections::HashMap;
use std::sync::Arc;

/// Context prompt used when the question is passed alongside the nodes
pub const DEFAULT_CONTEXT_PROMPT: &str = "Here is some context that may be relevant:\n-----\n{node_context}\n-----\nPlease write a response to the following question, using the above context:\n{query_str}\n";

/// A value passed between steps
#[derive(Debug, Clone)]
pub enum StepValue {
    Text(String),
    Results(Vec<ScoredResult>),
}

impl StepValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StepValue::Text(text) => Some(text),
            StepValue::Results(_) => None,
        }
    }

    pub fn as_results(&self) -> Option<&[ScoredResult]> {
        match self {
            StepValue::Results(results) => Some(results),
            StepValue::Text(_) => None,
        }
    }
}

pub type StepInputs = HashMap<String, StepValue>;
pub type StepOutputs = HashMap<String, StepValue>;

#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    /// Required input names
    fn input_keys(&self) -> &[&'static str];

    fn output_keys(&self) -> &[&'static str];

    async fn run(&self, inputs: StepInputs) -> Result<StepOutputs>;
}

fn missing(step: &str, key: &str) -> AppError {
    AppError::Configuration {
        message: format!("step '{}' requires a {} input '{}'", step, kind_of(key), key),
    }
}

fn kind_of(key: &str) -> &'static str {
    match key {
        "nodes" => "results",
        _ => "text",
    }
}

fn text_input<'a>(step: &str, inputs: &'a StepInputs, key: &str) -> Result<&'a str> {
    inputs
        .get(key)
        .and_then(StepValue::as_text)
        .ok_or_else(|| missing(step, key))
}

enum SearchSource {
    Plain(Arc<dyn Retriever>),
    Traced(Arc<MultiRetriever>),
}

/// Runs a retriever over the `query` input
pub struct SearchStep {
    source: SearchSource,
}

impl SearchStep {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self {
            source: SearchSource::Plain(retriever),
        }
    }

    /// Fan out with start/end traces
    pub fn traced(multi: Arc<MultiRetriever>) -> Self {
        Self {
            source: SearchSource::Traced(multi),
        }
    }
}

#[async_trait]
impl Step for SearchStep {
    fn name(&self) -> &str {
        "search"
    }

    fn input_keys(&self) -> &[&'static str] {
        &["query"]
    }

    fn output_keys(&self) -> &[&'static str] {
        &["nodes"]
    }

    async fn run(&self, inputs: StepInputs) -> Result<StepOutputs> {
        let query = text_input(self.name(), &inputs, "query")?;
        let results = match &self.source {
            SearchSource::Plain(retriever) => retriever.retrieve(query).await?,
            SearchSource::Traced(multi) => multi.retrieve_with_trace(query).await?,
        };
        Ok(HashMap::from([("nodes".to_string(), StepValue::Results(results))]))
    }
}

/// Answers with the retrieved nodes as context
pub struct ResponseStep {
    completer: Arc<dyn Completer>,
    system_prompt: Option<String>,
    context_prompt: String,
}

impl ResponseStep {
    pub fn new(completer: Arc<dyn Completer>) -> Self {
        Self {
            completer,
            system_prompt: None,
            context_prompt: DEFAULT_CONTEXT_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Template with `{node_context}` and `{query_str}`
    pub fn with_context_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.context_prompt = prompt.into();
        self
    }

    /// Number each result's generation-context rendering
    pub fn node_context(results: &[ScoredResult]) -> String {
        results
            .iter()
            .enumerate()
            .map(|(idx, result)| format!("Context Chunk {}:\n{}\n\n", idx, result.content(MetadataMode::Llm)))
            .collect()
    }

    /// Messages sent to the model; the question is included only when given
    pub fn messages(&self, results: &[ScoredResult], query: Option<&str>) -> Vec<ChatMessage> {
        let node_context = Self::node_context(results);
        let user = match query {
            Some(query) => fill_template(
                &self.context_prompt,
                &[("node_context", node_context.as_str()), ("query_str", query)],
            ),
            None => node_context,
        };

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(user));
        messages
    }
}

#[async_trait]
impl Step for ResponseStep {
    fn name(&self) -> &str {
        "response"
    }

    fn input_keys(&self) -> &[&'static str] {
        &["nodes"]
    }

    fn output_keys(&self) -> &[&'static str] {
        &["response"]
    }

    async fn run(&self, inputs: StepInputs) -> Result<StepOutputs> {
        let results = inputs
            .get("nodes")
            .and_then(StepValue::as_results)
            .ok_or_else(|| missing(self.name(), "nodes"))?;
        let query = inputs.get("query").and_then(StepValue::as_text);

        let messages = self.messages(results, query);
        let response = self.completer.chat(&messages).await?;
        tracing::info!(chunks = results.len(), chars = response.len(), "Response generated");
        Ok(HashMap::from([("response".to_string(), StepValue::Text(response))]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::EvidenceUnit;
    use crate::testing::{MockCompleter, MockRetriever};
    use augment_common::llm::Role;

    fn nodes() -> Vec<ScoredResult> {
        vec![
            ScoredResult::from_unit(
                EvidenceUnit::text("Paris is the capital of France.")
                    .with_metadata_flags("Link", "https://example.org", true, true),
                Some(0.9),
            ),
            ScoredResult::from_unit(EvidenceUnit::text("It has a population of over 2 million."), None),
        ]
    }

    #[test]
    fn test_node_context_hides_excluded_metadata() {
        let context = ResponseStep::node_context(&nodes());
        assert_eq!(
            context,
            "Context Chunk 0:\nParis is the capital of France.\n\nContext Chunk 1:\nIt has a population of over 2 million.\n\n"
        );
    }

    #[test]
    fn test_messages_with_system_prompt_and_query() {
        let step = ResponseStep::new(Arc::new(MockCompleter::fixed("ok"))).with_system_prompt("Be brief.");
        let messages = step.messages(&nodes()[..1], Some("What is the capital?"));

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(
            messages[1].content,
            "Here is some context that may be relevant:\n-----\nContext Chunk 0:\nParis is the capital of France.\n\n\n-----\nPlease write a response to the following question, using the above context:\nWhat is the capital?\n"
        );
    }

    #[test]
    fn test_messages_without_query_send_context_only() {
        let step = ResponseStep::new(Arc::new(MockCompleter::fixed("ok")));
        let messages = step.messages(&nodes(), None);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, ResponseStep::node_context(&nodes()));
    }

    #[tokio::test]
    async fn test_search_then_response() {
        let search = SearchStep::new(Arc::new(MockRetriever::new("wiki", nodes())));
        let response = ResponseStep::new(Arc::new(MockCompleter::fixed("Paris.")));

        let inputs = HashMap::from([("query".to_string(), StepValue::Text("capital?".into()))]);
        let outputs = search.run(inputs).await.unwrap();
        assert_eq!(outputs["nodes"].as_results().unwrap().len(), 2);

        let outputs = response.run(outputs).await.unwrap();
        assert_eq!(outputs["response"].as_text(), Some("Paris."));
    }

    #[tokio::test]
    async fn test_missing_input_is_an_error() {
        let search = SearchStep::new(Arc::new(MockRetriever::new("wiki", vec![])));
        assert!(search.run(StepInputs::new()).await.is_err());
    }
}
