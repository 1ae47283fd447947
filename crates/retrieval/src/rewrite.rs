//! Tool-specific query rewriting
//!
//! Condenses a user question into a shorter query for one tool by asking
//! the language model with the tool's description in the prompt.

use augment_common::errors::{AppError, Result};
use augment_common::llm::Completer;
use regex_lite::{Captures, Regex};
use std::sync::{Arc, OnceLock};

/// Default rewrite prompt; `{tool_description}` and `{question}` are filled in
pub const TOOL_QUERY_REWRITE_TEMPLATE: &str = "Please rewrite the question to a shorter question which is then passed to the tool provided to get the information to answer the question.\nTry to include as many key details as possible.\n\nTool description: {tool_description}\nQuestion: {question}\nNew Question:\n";

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("static pattern"))
}

/// Fill `{name}` placeholders in one pass; unknown names are left as is
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Rewrites questions into tool queries
#[derive(Clone)]
pub struct QueryRewriter {
    completer: Arc<dyn Completer>,
    template: String,
}

impl QueryRewriter {
    pub fn new(completer: Arc<dyn Completer>) -> Self {
        Self::with_template(completer, TOOL_QUERY_REWRITE_TEMPLATE)
    }

    pub fn with_template(completer: Arc<dyn Completer>, template: impl Into<String>) -> Self {
        Self {
            completer,
            template: template.into(),
        }
    }

    pub fn prompt(&self, question: &str, tool_description: &str) -> String {
        fill_template(
            &self.template,
            &[("tool_description", tool_description), ("question", question)],
        )
    }

    /// Rewrite `question` for a tool, or return it unchanged when `skip` is set
    ///
    /// A failed completion is a `RewriteFailure`; the question is never
    /// silently sent as-is.
    pub async fn rewrite(&self, question: &str, tool_description: &str, skip: bool) -> Result<String> {
        if skip {
            return Ok(question.to_string());
        }

        let prompt = self.prompt(question, tool_description);
        let response = self
            .completer
            .complete(&prompt)
            .await
            .map_err(|e| AppError::RewriteFailure {
                message: e.to_string(),
            })?;

        let rewritten = response.trim();
        tracing::debug!(original = question, rewritten, "Rewrote query");
        Ok(rewritten.to_string())
    }
}
