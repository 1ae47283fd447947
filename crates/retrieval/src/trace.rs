//! Retrieval traces for the observability cache
//!
//! Retrievers never publish inline. They hand traces to a [`TraceEmitter`];
//! a single consumer task drains the channel and publishes each trace once,
//! in emission order. A failed publish is logged and dropped.

use crate::evidence::{Content, MetadataMode};
use crate::retriever::ScoredResult;
use async_trait::async_trait;
use augment_common::cache::Cache;
use augment_common::errors::Result;
use augment_common::metrics::record_trace;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default cache channel
pub const DEFAULT_TRACE_CHANNEL: &str = "tools";

/// Score marker for results without a computed score
pub const UNSCORED: &str = "None";

/// One serialized result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceEntry {
    pub content: String,
    pub score: String,
}

/// Serialize results for a trace
///
/// Images carry their encoded payload; text carries every metadata entry,
/// including those hidden from generation.
pub fn serialize_results(results: &[ScoredResult]) -> Vec<TraceEntry> {
    results
        .iter()
        .map(|result| {
            let unit = result.unit();
            let content = match unit.raw_content() {
                Content::Image { data, .. } => data.clone(),
                Content::Text { .. } => unit.content(MetadataMode::All),
            };
            let score = result
                .score
                .map(|s| s.to_string())
                .unwrap_or_else(|| UNSCORED.to_string());
            TraceEntry { content, score }
        })
        .collect()
}

/// A start (no query, no results) or end event for one tool call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalTrace {
    #[serde(rename = "name")]
    pub tool_name: String,
    pub query: Option<String>,
    #[serde(rename = "output")]
    pub results: Vec<TraceEntry>,
}

impl RetrievalTrace {
    pub fn start(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            query: None,
            results: Vec::new(),
        }
    }

    pub fn end(tool_name: impl Into<String>, query: impl Into<String>, results: &[ScoredResult]) -> Self {
        Self {
            tool_name: tool_name.into(),
            query: Some(query.into()),
            results: serialize_results(results),
        }
    }

    pub fn is_start(&self) -> bool {
        self.query.is_none()
    }

    /// JSON payload `{name, query, output}`
    pub fn to_payload(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Sink for trace payloads
#[async_trait]
pub trait TracePublisher: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> Result<()>;
}

#[async_trait]
impl TracePublisher for Cache {
    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        Cache::publish(self, channel, payload).await?;
        Ok(())
    }
}

/// Publisher that keeps every payload in memory
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    messages: Mutex<Vec<(String, String)>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published `(channel, payload)` pairs in order
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Published payloads parsed back into traces
    pub fn traces(&self) -> Vec<RetrievalTrace> {
        self.messages()
            .iter()
            .filter_map(|(_, payload)| serde_json::from_str(payload).ok())
            .collect()
    }
}

#[async_trait]
impl TracePublisher for MemoryPublisher {
    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((channel.to_string(), payload.to_string()));
        }
        Ok(())
    }
}

/// Sending half of the trace channel
#[derive(Debug, Clone)]
pub struct TraceEmitter {
    tx: mpsc::UnboundedSender<RetrievalTrace>,
}

impl TraceEmitter {
    /// Emitter plus the receiver a consumer drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RetrievalTrace>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a trace; never blocks
    pub fn emit(&self, trace: RetrievalTrace) {
        if self.tx.send(trace).is_err() {
            warn!("Trace consumer is gone, dropping trace");
            record_trace(false);
        }
    }

    pub fn start(&self, tool_name: &str) {
        self.emit(RetrievalTrace::start(tool_name));
    }

    pub fn end(&self, tool_name: &str, query: &str, results: &[ScoredResult]) {
        self.emit(RetrievalTrace::end(tool_name, query, results));
    }
}

/// Spawn the consumer task publishing traces to `channel`
///
/// The task ends once every emitter clone is dropped and returns the number
/// of traces published.
pub fn spawn_trace_publisher(
    publisher: Arc<dyn TracePublisher>,
    channel: impl Into<String>,
) -> (TraceEmitter, JoinHandle<usize>) {
    let (emitter, mut rx) = TraceEmitter::channel();
    let channel = channel.into();

    let handle = tokio::spawn(async move {
        let mut published = 0;
        while let Some(trace) = rx.recv().await {
            let payload = match trace.to_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(tool = %trace.tool_name, error = %e, "Could not serialize trace");
                    record_trace(false);
                    continue;
                }
            };

            match publisher.publish(&channel, &payload).await {
                Ok(()) => {
                    debug!(tool = %trace.tool_name, start = trace.is_start(), "Trace published");
                    record_trace(true);
                    published += 1;
                }
                Err(e) => {
                    warn!(tool = %trace.tool_name, error = %e, "Trace publish failed");
                    record_trace(false);
                }
            }
        }
        published
    });

    (emitter, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::EvidenceUnit;

    fn text_result(text: &str, score: Option<f32>) -> ScoredResult {
        ScoredResult::from_unit(
            EvidenceUnit::text(text).with_metadata_flags("Link", "https://example.org", true, true),
            score,
        )
    }

    #[test]
    fn test_serialize_includes_hidden_metadata() {
        let entries = serialize_results(&[text_result("Paris", Some(0.5))]);
        assert_eq!(entries[0].content, "Link: https://example.org\n\nParis");
        assert_eq!(entries[0].score, "0.5");
    }

    #[test]
    fn test_missing_score_is_marked() {
        let entries = serialize_results(&[text_result("Paris", None)]);
        assert_eq!(entries[0].score, UNSCORED);
    }

    #[test]
    fn test_image_serializes_payload() {
        let result = ScoredResult::from_unit(
            EvidenceUnit::image("aGVsbG8=", None).with_metadata("description", "cat"),
            None,
        );
        let entries = serialize_results(&[result]);
        assert_eq!(entries[0].content, "aGVsbG8=");
    }

    #[test]
    fn test_payload_shape() {
        let start: serde_json::Value =
            serde_json::from_str(&RetrievalTrace::start("wiki").to_payload().unwrap()).unwrap();
        assert_eq!(start, serde_json::json!({ "name": "wiki", "query": null, "output": [] }));

        let end = RetrievalTrace::end("wiki", "paris", &[text_result("Paris", Some(1.0))]);
        let value: serde_json::Value = serde_json::from_str(&end.to_payload().unwrap()).unwrap();
        assert_eq!(value["query"], "paris");
        assert_eq!(value["output"][0]["score"], "1");
    }

    #[tokio::test]
    async fn test_consumer_publishes_in_order() {
        let sink = Arc::new(MemoryPublisher::new());
        let (emitter, handle) = spawn_trace_publisher(sink.clone(), DEFAULT_TRACE_CHANNEL);

        emitter.start("a");
        emitter.end("a", "q", &[]);
        emitter.start("b");
        drop(emitter);

        assert_eq!(handle.await.unwrap(), 3);
        let traces = sink.traces();
        let names: Vec<(&str, bool)> = traces
            .iter()
            .map(|t| (t.tool_name.as_str(), t.is_start()))
            .collect();
        assert_eq!(names, vec![("a", true), ("a", false), ("b", true)]);
        assert!(sink.messages().iter().all(|(channel, _)| channel == "tools"));
    }

    #[test]
    fn test_emit_without_consumer_does_not_panic() {
        let (emitter, rx) = TraceEmitter::channel();
        drop(rx);
        emitter.start("a");
    }
}
