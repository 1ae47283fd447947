//! Metrics for the retrieval pipeline
//!
//! Emits through the `metrics` facade. Without an installed recorder every
//! call is a no-op, so libraries can record unconditionally.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Augment metrics
pub const METRICS_PREFIX: &str = "augment";

/// Buckets for retrieval latency (in seconds); tool calls dominate
pub const RETRIEVAL_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_retrievals_total", METRICS_PREFIX),
        Unit::Count,
        "Total retrieval calls by retriever and outcome"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval latency in seconds"
    );

    describe_histogram!(
        format!("{}_retrieval_results", METRICS_PREFIX),
        Unit::Count,
        "Results returned per retrieval"
    );

    describe_counter!(
        format!("{}_records_skipped_total", METRICS_PREFIX),
        Unit::Count,
        "Tool records skipped because they could not be parsed"
    );

    describe_counter!(
        format!("{}_traces_published_total", METRICS_PREFIX),
        Unit::Count,
        "Retrieval traces handed to the cache sink"
    );

    tracing::info!("Metrics registered");
}

/// Outcome label for a retrieval call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

/// Helper to record one retrieval call
pub struct RetrievalMetrics {
    start: Instant,
    retriever: String,
}

impl RetrievalMetrics {
    /// Start tracking a retrieval
    pub fn start(retriever: &str) -> Self {
        Self {
            start: Instant::now(),
            retriever: retriever.to_string(),
        }
    }

    /// Record retrieval completion
    pub fn finish(self, outcome: Outcome, results: usize) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_retrievals_total", METRICS_PREFIX),
            "retriever" => self.retriever.clone(),
            "outcome" => outcome.as_str()
        )
        .increment(1);

        histogram!(
            format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
            "retriever" => self.retriever.clone()
        )
        .record(duration);

        if outcome == Outcome::Success {
            histogram!(
                format!("{}_retrieval_results", METRICS_PREFIX),
                "retriever" => self.retriever
            )
            .record(results as f64);
        }
    }
}

/// Helper to record a skipped tool record
pub fn record_skipped(tool: &str) {
    counter!(
        format!("{}_records_skipped_total", METRICS_PREFIX),
        "tool" => tool.to_string()
    )
    .increment(1);
}

/// Helper to record a trace publish attempt
pub fn record_trace(published: bool) {
    let outcome = if published { "published" } else { "dropped" };
    counter!(
        format!("{}_traces_published_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}
