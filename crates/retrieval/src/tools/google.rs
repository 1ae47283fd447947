//! Google Custom Search with page scraping

use super::{html_to_text, http_client, remove_redundant_whitespace, Tool, LINK_METADATA_KEY};
use crate::evidence::{EvidenceUnit, RawOutput};
use async_trait::async_trait;
use augment_common::config::GoogleSearchConfig;
use augment_common::errors::{AppError, Result};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

const NAME: &str = "google_search";
const DESCRIPTION: &str = "google_search(query: str)\nMake a query to the Google search engine to receive a list of results. Then scrape the text from link of each result.";

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    link: String,
}

/// Web search tool returning the text of each result page
pub struct GoogleSearchTool {
    client: reqwest::Client,
    scraper: reqwest::Client,
    api_key: String,
    engine_id: String,
    api_base: String,
    num: u8,
    concurrency: usize,
}

impl GoogleSearchTool {
    pub fn new(config: &GoogleSearchConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "Google search API key required".to_string(),
        })?;
        let engine_id = config.engine_id.clone().ok_or_else(|| AppError::Configuration {
            message: "Google search engine id required".to_string(),
        })?;
        if !(1..=10).contains(&config.num_results) {
            return Err(AppError::Configuration {
                message: "num should be an integer between 1 and 10, inclusive".to_string(),
            });
        }

        Ok(Self {
            client: http_client(Duration::from_secs(30))?,
            scraper: http_client(Duration::from_secs(config.scrape_timeout_secs))?,
            api_key,
            engine_id,
            api_base: config.api_base.clone(),
            num: config.num_results,
            concurrency: config.scrape_concurrency.max(1),
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}?key={}&cx={}&q={}&num={}",
            self.api_base,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(&self.engine_id),
            urlencoding::encode(query),
            self.num
        );

        let response = self.client.get(&url).send().await.map_err(|e| AppError::tool(NAME, e))?;
        if !response.status().is_success() {
            return Err(AppError::tool(NAME, format!("search failed: {}", response.status())));
        }

        let body: SearchResponse = response.json().await.map_err(|e| AppError::tool(NAME, e))?;
        Ok(body.items.into_iter().map(|item| item.link).collect())
    }

    async fn fetch(&self, url: &str) -> reqwest::Result<String> {
        let response = self.scraper.get(url).send().await?.error_for_status()?;
        response.text().await
    }

    /// Page text, or `Error: <reason>` when the page cannot be fetched
    async fn scrape(&self, url: &str) -> String {
        info!(tool = NAME, url, "Scraping");
        match self.fetch(url).await {
            Ok(html) => html_to_text(&html),
            Err(e) => {
                warn!(tool = NAME, url, error = %e, "Scrape failed");
                format!("Error: {}", e)
            }
        }
    }
}

#[async_trait]
impl Tool for GoogleSearchTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    async fn invoke(&self, query: &str) -> Result<RawOutput> {
        let urls = self.search(query).await?;
        info!(tool = NAME, results = urls.len(), urls = %urls.join(", "), "Search results");

        // Bounded parallel fetch; output keeps result order
        let pages: Vec<(String, String)> = stream::iter(urls)
            .map(|url| async move {
                let text = self.scrape(&url).await;
                (url, text)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let units: Vec<EvidenceUnit> = pages
            .into_iter()
            .map(|(url, text)| {
                EvidenceUnit::text(remove_redundant_whitespace(&text))
                    .with_metadata_flags(LINK_METADATA_KEY, url.clone(), true, true)
                    .with_source_link(url)
            })
            .collect();

        Ok(RawOutput::from(units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{normalize, MetadataMode};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> GoogleSearchConfig {
        GoogleSearchConfig {
            api_key: Some("key".into()),
            engine_id: Some("cx".into()),
            api_base: format!("{}/customsearch/v1", server.uri()),
            num_results: 2,
            ..GoogleSearchConfig::default()
        }
    }

    #[tokio::test]
    async fn test_search_and_scrape_in_result_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("q", "capital of France"))
            .and(query_param("num", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    { "link": format!("{}/paris", server.uri()) },
                    { "link": format!("{}/missing", server.uri()) }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/paris"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><p>Paris   is the\n capital.</p></body></html>",
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tool = GoogleSearchTool::new(&config(&server)).unwrap();
        let units = normalize(tool.invoke("capital of France").await.unwrap());

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text_content(), "Paris is the capital.");
        assert_eq!(units[0].content(MetadataMode::Llm), "Paris is the capital.");
        assert_eq!(units[0].source_link(), Some(format!("{}/paris", server.uri()).as_str()));
        assert!(units[1].text_content().starts_with("Error: "));
        assert!(units[1].content(MetadataMode::All).starts_with("Link: "));
    }

    #[tokio::test]
    async fn test_search_failure_is_tool_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let tool = GoogleSearchTool::new(&config(&server)).unwrap();
        let err = tool.invoke("anything").await.unwrap_err();
        assert!(matches!(err, AppError::ToolInvocation { .. }));
    }

    #[test]
    fn test_rejects_out_of_range_num() {
        let config = GoogleSearchConfig {
            api_key: Some("key".into()),
            engine_id: Some("cx".into()),
            num_results: 11,
            ..GoogleSearchConfig::default()
        };
        assert!(GoogleSearchTool::new(&config).is_err());
    }
}
