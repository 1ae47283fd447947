//! Per-call lifecycle of a load-and-search retrieval

use crate::retriever::ScoredResult;
use augment_common::errors::Result;
use augment_common::metrics::{Outcome, RetrievalMetrics};
use std::fmt;
use tracing::{debug, warn};

/// Where a retrieval call is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalState {
    Idle,
    Rewriting,
    ToolInvoked,
    Indexing,
    Retrieving,
    Done,
    Failed,
}

impl RetrievalState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RetrievalState::Done | RetrievalState::Failed)
    }

    /// Legal transitions: forward one step, or to `Failed` from any live state
    pub fn can_advance_to(self, next: RetrievalState) -> bool {
        use RetrievalState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Idle, Rewriting)
            | (Rewriting, ToolInvoked)
            | (ToolInvoked, Indexing)
            | (Indexing, Retrieving)
            | (Retrieving, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RetrievalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetrievalState::Idle => "idle",
            RetrievalState::Rewriting => "rewriting",
            RetrievalState::ToolInvoked => "tool_invoked",
            RetrievalState::Indexing => "indexing",
            RetrievalState::Retrieving => "retrieving",
            RetrievalState::Done => "done",
            RetrievalState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State of one call; a new one is created for every call
pub(crate) struct CallState {
    retriever: String,
    state: RetrievalState,
    metrics: RetrievalMetrics,
}

impl CallState {
    pub fn new(retriever: &str) -> Self {
        Self {
            retriever: retriever.to_string(),
            state: RetrievalState::Idle,
            metrics: RetrievalMetrics::start(retriever),
        }
    }

    pub fn state(&self) -> RetrievalState {
        self.state
    }

    pub fn advance(&mut self, next: RetrievalState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(retriever = %self.retriever, from = %self.state, to = %next, "Retrieval state");
        self.state = next;
    }

    /// Move to `Done` or `Failed` and record the call
    pub fn finish(mut self, outcome: &Result<Vec<ScoredResult>>) {
        match outcome {
            Ok(results) => {
                self.advance(RetrievalState::Done);
                self.metrics.finish(Outcome::Success, results.len());
            }
            Err(e) => {
                warn!(
                    retriever = %self.retriever,
                    state = %self.state(),
                    code = e.code().as_code(),
                    error = %e,
                    "Retrieval failed"
                );
                self.advance(RetrievalState::Failed);
                self.metrics.finish(Outcome::Failure, 0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use augment_common::errors::AppError;

    #[test]
    fn test_forward_path() {
        use RetrievalState::*;
        let path = [Idle, Rewriting, ToolInvoked, Indexing, Retrieving, Done];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]));
        }
        assert!(!Idle.can_advance_to(Indexing));
        assert!(!Retrieving.can_advance_to(Rewriting));
    }

    #[test]
    fn test_failed_reachable_from_live_states_only() {
        use RetrievalState::*;
        for state in [Idle, Rewriting, ToolInvoked, Indexing, Retrieving] {
            assert!(state.can_advance_to(Failed));
        }
        assert!(!Done.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Failed));
    }

    #[test]
    fn test_call_state_finishes() {
        let mut call = CallState::new("test");
        call.advance(RetrievalState::Rewriting);
        assert_eq!(call.state(), RetrievalState::Rewriting);
        call.finish(&Err(AppError::RewriteFailure { message: "down".into() }));
    }
}
