//! Fan-out over independently configured retrievers
//!
//! Sub-retrievers run one after another in configured order and their
//! results are concatenated without deduplication. A failing sub-retriever
//! only reduces coverage; the call fails when every one of them fails.

use super::{Retriever, ScoredResult};
use crate::trace::TraceEmitter;
use async_trait::async_trait;
use augment_common::errors::{AppError, Result};
use futures::future::{self, Either};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct MultiRetriever {
    retrievers: Vec<Arc<dyn Retriever>>,
    tracer: Option<TraceEmitter>,
    deadline: Option<Duration>,
}

impl MultiRetriever {
    pub fn new(retrievers: Vec<Arc<dyn Retriever>>) -> Self {
        Self {
            retrievers,
            tracer: None,
            deadline: None,
        }
    }

    /// Emitter used by [`MultiRetriever::retrieve_with_trace`]
    pub fn with_tracer(mut self, tracer: TraceEmitter) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Deadline for a whole fan-out
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn retrievers(&self) -> &[Arc<dyn Retriever>] {
        &self.retrievers
    }

    /// Fan out and emit a start and an end trace around each sub-retriever
    pub async fn retrieve_with_trace(&self, query: &str) -> Result<Vec<ScoredResult>> {
        self.fan_out(query, true, self.deadline_future()).await
    }

    /// Traced fan-out that also ends early once `interrupt` resolves
    ///
    /// Whichever comes first of the deadline and `interrupt` stops the
    /// fan-out; results of the sub-retrievers that already finished are kept.
    pub async fn retrieve_until<F>(&self, query: &str, interrupt: F) -> Result<Vec<ScoredResult>>
    where
        F: Future<Output = ()>,
    {
        let deadline = self.deadline_future();
        let stop = async move {
            tokio::select! {
                _ = interrupt => {}
                _ = deadline => {}
            }
        };
        self.fan_out(query, true, stop).await
    }

    /// Fan out until done or until `stop` resolves
    ///
    /// When stopped, the in-flight sub-retriever is dropped and the results
    /// of those that already finished are returned; if none finished the
    /// call fails with `Cancelled`.
    pub async fn fan_out<F>(&self, query: &str, trace: bool, stop: F) -> Result<Vec<ScoredResult>>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);
        let tracer = self.tracer.as_ref().filter(|_| trace);
        let total = self.retrievers.len();

        let mut results = Vec::new();
        let mut completed = 0;
        let mut failed = 0;

        for retriever in &self.retrievers {
            info!("Using {}", retriever.name());
            if let Some(tracer) = tracer {
                tracer.start(retriever.name());
            }

            let outcome = tokio::select! {
                outcome = retriever.retrieve(query) => outcome,
                _ = &mut stop => {
                    warn!(retriever = retriever.name(), completed, total, "Fan-out stopped");
                    return if completed > 0 {
                        Ok(results)
                    } else {
                        Err(AppError::Cancelled { completed, total })
                    };
                }
            };

            match outcome {
                Ok(found) => {
                    if let Some(tracer) = tracer {
                        tracer.end(retriever.name(), query, &found);
                    }
                    completed += 1;
                    results.extend(found);
                }
                Err(e) => {
                    warn!(retriever = retriever.name(), error = %e, code = e.code().as_code(), "Retriever failed");
                    failed += 1;
                }
            }
        }

        if total > 0 && failed == total {
            return Err(AppError::AllRetrieversFailed { count: total });
        }
        Ok(results)
    }

    fn deadline_future(&self) -> impl Future<Output = ()> {
        match self.deadline {
            Some(deadline) => Either::Left(tokio::time::sleep(deadline)),
            None => Either::Right(future::pending()),
        }
    }
}

#[async_trait]
impl Retriever for MultiRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<ScoredResult>> {
        self.fan_out(query, false, self.deadline_future()).await
    }

    fn name(&self) -> &str {
        "multi"
    }
}
