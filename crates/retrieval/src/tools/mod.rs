//! External search tools
//!
//! Each tool turns a query into a [`RawOutput`]:
//! - Google web search (scraped page text)
//! - Wikipedia (page summaries)
//! - Google image search (base64 images)

mod google;
mod image;
mod wikipedia;

pub use google::GoogleSearchTool;
pub use image::ImageSearchTool;
pub use wikipedia::WikipediaSearchTool;

use crate::evidence::RawOutput;
use async_trait::async_trait;
use augment_common::config::{ToolKind, ToolsConfig};
use augment_common::errors::{AppError, Result};
use regex_lite::Regex;
use scraper::{Html, Selector};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Metadata key carrying a result's URL; hidden from scoring and generation
pub const LINK_METADATA_KEY: &str = "Link";

/// An external tool invoked with a rewritten query
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Description given to the query rewriter
    fn description(&self) -> &str;

    async fn invoke(&self, query: &str) -> Result<RawOutput>;
}

/// Construct the tool for a configured source
pub fn build_tool(kind: ToolKind, config: &ToolsConfig) -> Result<Arc<dyn Tool>> {
    let tool: Arc<dyn Tool> = match kind {
        ToolKind::GoogleSearch => Arc::new(GoogleSearchTool::new(&config.google)?),
        ToolKind::WikipediaSearch => Arc::new(WikipediaSearchTool::new(&config.wikipedia)?),
        ToolKind::ImageSearch => Arc::new(ImageSearchTool::new(&config.google, &config.image)?),
    };
    Ok(tool)
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("augment/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

fn whitespace() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static pattern"))
}

/// Collapse runs of whitespace to single spaces and trim the ends
pub fn remove_redundant_whitespace(text: &str) -> String {
    whitespace().replace_all(text.trim(), " ").into_owned()
}

/// Visible text of an HTML page
///
/// Reads the `<body>` when there is one, the whole document otherwise.
/// Script and style contents are dropped.
pub fn html_to_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let Ok(body) = Selector::parse("body") else {
        return String::new();
    };
    let root = doc.select(&body).next().unwrap_or_else(|| doc.root_element());

    let mut out = String::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element())
            .map(|e| matches!(e.name(), "script" | "style" | "noscript"))
            .unwrap_or(false);
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_redundant_whitespace() {
        assert_eq!(remove_redundant_whitespace("  a \n\n b\t\tc  "), "a b c");
        assert_eq!(remove_redundant_whitespace(""), "");
    }

    #[test]
    fn test_html_to_text_skips_scripts() {
        let html = "<html><head><title>T</title></head><body><h1>Paris</h1>\
                    <script>var x = 1;</script><p>Capital of <b>France</b>.</p></body></html>";
        let text = remove_redundant_whitespace(&html_to_text(html));
        assert_eq!(text, "Paris Capital of France .");
    }

    #[test]
    fn test_html_to_text_plain_text() {
        let text = remove_redundant_whitespace(&html_to_text("just text"));
        assert_eq!(text, "just text");
    }

    #[test]
    fn test_build_wikipedia_tool_without_keys() {
        let tool = build_tool(ToolKind::WikipediaSearch, &ToolsConfig::default()).unwrap();
        assert_eq!(tool.name(), "wikipedia_search");
    }

    #[test]
    fn test_build_google_tool_requires_keys() {
        let err = build_tool(ToolKind::GoogleSearch, &ToolsConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Configuration { .. }));
    }
}
