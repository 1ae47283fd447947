//! In-memory collaborators for tests and offline runs

use crate::evidence::RawOutput;
use crate::retriever::{Retriever, ScoredResult};
use crate::tools::Tool;
use async_trait::async_trait;
use augment_common::errors::{AppError, Result};
use augment_common::llm::{ChatMessage, Completer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Completer that answers every prompt the same way
pub struct MockCompleter {
    response: Option<String>,
    calls: AtomicUsize,
}

impl MockCompleter {
    pub fn fixed(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails every call with a completion error
    pub fn failing() -> Self {
        Self {
            response: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Completer for MockCompleter {
    async fn chat(&self, _messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone().ok_or_else(|| AppError::Completion {
            message: "mock completer failure".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Tool returning scripted outputs and recording its queries
pub struct MockTool {
    name: String,
    outputs: Vec<RawOutput>,
    fail: bool,
    queries: Mutex<Vec<String>>,
}

impl MockTool {
    pub fn new(name: impl Into<String>, output: RawOutput) -> Self {
        Self::sequence(name, vec![output])
    }

    /// Returns `outputs` in order, then repeats the last one
    pub fn sequence(name: impl Into<String>, outputs: Vec<RawOutput>) -> Self {
        Self {
            name: name.into(),
            outputs,
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            fail: true,
            ..Self::sequence(name, Vec::new())
        }
    }

    /// Queries received so far
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Mock tool"
    }

    async fn invoke(&self, query: &str) -> Result<RawOutput> {
        let call = match self.queries.lock() {
            Ok(mut queries) => {
                queries.push(query.to_string());
                queries.len() - 1
            }
            Err(_) => 0,
        };

        if self.fail {
            return Err(AppError::tool(&self.name, "mock tool failure"));
        }
        self.outputs
            .get(call)
            .or_else(|| self.outputs.last())
            .cloned()
            .ok_or_else(|| AppError::tool(&self.name, "no scripted output"))
    }
}

/// Retriever returning fixed results
pub struct MockRetriever {
    name: String,
    results: Option<Vec<ScoredResult>>,
    delay: Option<Duration>,
}

impl MockRetriever {
    pub fn new(name: impl Into<String>, results: Vec<ScoredResult>) -> Self {
        Self {
            name: name.into(),
            results: Some(results),
            delay: None,
        }
    }

    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            results: None,
            delay: None,
        }
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Retriever for MockRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<ScoredResult>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.results
            .clone()
            .ok_or_else(|| AppError::tool(&self.name, "mock retriever failure"))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
