//! Wikipedia search returning page summaries

use super::{http_client, Tool, LINK_METADATA_KEY};
use crate::evidence::{EvidenceUnit, RawOutput};
use async_trait::async_trait;
use augment_common::config::WikipediaConfig;
use augment_common::errors::{AppError, Result};
use augment_common::metrics::record_skipped;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

const NAME: &str = "wikipedia_search";
const DESCRIPTION: &str = "wikipedia_search(query: str)\nSearch Wikipedia for the query and return the summary of the best matching pages.";

#[derive(Deserialize)]
struct SearchResponse {
    query: SearchQuery,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Deserialize)]
struct PageSummary {
    extract: Option<String>,
    content_urls: Option<ContentUrls>,
}

#[derive(Deserialize)]
struct ContentUrls {
    desktop: PageUrls,
}

#[derive(Deserialize)]
struct PageUrls {
    page: String,
}

/// Encyclopedia search tool
pub struct WikipediaSearchTool {
    client: reqwest::Client,
    base_url: String,
    num_results: usize,
}

impl WikipediaSearchTool {
    pub fn new(config: &WikipediaConfig) -> Result<Self> {
        let base_url = config
            .api_base
            .clone()
            .unwrap_or_else(|| format!("https://{}.wikipedia.org", config.language));

        Ok(Self {
            client: http_client(Duration::from_secs(30))?,
            base_url: base_url.trim_end_matches('/').to_string(),
            num_results: config.num_results,
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/w/api.php?action=query&list=search&format=json&srprop=&srlimit={}&srsearch={}",
            self.base_url,
            self.num_results.max(1),
            urlencoding::encode(query)
        );

        let response = self.client.get(&url).send().await.map_err(|e| AppError::tool(NAME, e))?;
        if !response.status().is_success() {
            return Err(AppError::tool(NAME, format!("search failed: {}", response.status())));
        }

        let body: SearchResponse = response.json().await.map_err(|e| AppError::tool(NAME, e))?;
        Ok(body.query.search.into_iter().map(|hit| hit.title).collect())
    }

    /// Summary unit for one page title
    async fn page(&self, title: &str) -> Result<EvidenceUnit> {
        let record_error = |message: String| AppError::RecordParse {
            tool: NAME.to_string(),
            record: title.to_string(),
            message,
        };

        let url = format!(
            "{}/api/rest_v1/page/summary/{}",
            self.base_url,
            urlencoding::encode(&title.replace(' ', "_"))
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| record_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(record_error(format!("page request failed: {}", response.status())));
        }

        let summary: PageSummary = response.json().await.map_err(|e| record_error(e.to_string()))?;
        let extract = summary
            .extract
            .ok_or_else(|| record_error("page has no summary".to_string()))?;
        let link = summary
            .content_urls
            .map(|urls| urls.desktop.page)
            .unwrap_or(url);

        Ok(EvidenceUnit::text(extract)
            .with_metadata_flags(LINK_METADATA_KEY, link.clone(), true, true)
            .with_source_link(link))
    }
}

#[async_trait]
impl Tool for WikipediaSearchTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    async fn invoke(&self, query: &str) -> Result<RawOutput> {
        let titles = self.search(query).await?;
        info!(tool = NAME, results = %titles.join(", "), "Search results");

        let mut units = Vec::new();
        for title in titles.iter().take(self.num_results) {
            match self.page(title).await {
                Ok(unit) => units.push(unit),
                Err(e) if e.is_recoverable() => {
                    warn!(tool = NAME, title = %title, error = %e, "Skipping page");
                    record_skipped(NAME);
                }
                Err(e) => return Err(e),
            }
        }

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

    fn tool(server: &MockServer, num_results: usize) -> WikipediaSearchTool {
        WikipediaSearchTool::new(&WikipediaConfig {
            api_base: Some(server.uri()),
            num_results,
            ..WikipediaConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_summaries_skip_broken_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("srsearch", "Paris"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": { "search": [
                    { "title": "Paris" },
                    { "title": "Paris Hilton" },
                    { "title": "Paris, Texas" }
                ] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/rest_v1/page/summary/Paris"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "title": "Paris",
                "extract": "Paris is the capital of France.",
                "content_urls": { "desktop": { "page": "https://en.wikipedia.org/wiki/Paris" } }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/rest_v1/page/summary/Paris_Hilton"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let units = normalize(tool(&server, 2).invoke("Paris").await.unwrap());

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text_content(), "Paris is the capital of France.");
        assert_eq!(units[0].content(MetadataMode::Embed), "Paris is the capital of France.");
        assert_eq!(units[0].metadata_value("Link"), Some("https://en.wikipedia.org/wiki/Paris"));
    }

    #[tokio::test]
    async fn test_search_failure_is_tool_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = tool(&server, 5).invoke("Paris").await.unwrap_err();
        assert!(matches!(err, AppError::ToolInvocation { .. }));
    }
}
