//! Google image search returning encoded images

use super::{http_client, Tool};
use crate::evidence::{EvidenceUnit, RawOutput};
use async_trait::async_trait;
use augment_common::config::{GoogleSearchConfig, ImageSearchConfig};
use augment_common::errors::{AppError, Result};
use augment_common::metrics::record_skipped;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

const NAME: &str = "image_search";
const DESCRIPTION: &str = "image_search(query: str)\nSearch Google Images for pictures related to the query.";

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    link: String,
}

/// Image search tool
pub struct ImageSearchTool {
    client: reqwest::Client,
    api_key: String,
    engine_id: String,
    api_base: String,
    params: ImageSearchConfig,
}

impl ImageSearchTool {
    pub fn new(google: &GoogleSearchConfig, params: &ImageSearchConfig) -> Result<Self> {
        let api_key = google.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "Google search API key required for image search".to_string(),
        })?;
        let engine_id = google.engine_id.clone().ok_or_else(|| AppError::Configuration {
            message: "Google search engine id required for image search".to_string(),
        })?;

        Ok(Self {
            client: http_client(Duration::from_secs(google.scrape_timeout_secs))?,
            api_key,
            engine_id,
            api_base: google.api_base.clone(),
            params: params.clone(),
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}?key={}&cx={}&q={}&searchType=image&num={}&fileType={}&rights={}&safe={}",
            self.api_base,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(&self.engine_id),
            urlencoding::encode(query),
            self.params.num_results,
            urlencoding::encode(&self.params.file_types),
            urlencoding::encode(&self.params.rights),
            urlencoding::encode(&self.params.safe)
        );

        let response = self.client.get(&url).send().await.map_err(|e| AppError::tool(NAME, e))?;
        if !response.status().is_success() {
            return Err(AppError::tool(NAME, format!("search failed: {}", response.status())));
        }

        let body: SearchResponse = response.json().await.map_err(|e| AppError::tool(NAME, e))?;
        Ok(body.items.into_iter().map(|item| item.link).collect())
    }

    async fn download(&self, url: &str) -> reqwest::Result<(Vec<u8>, Option<String>)> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        Ok((bytes.to_vec(), mime))
    }
}

#[async_trait]
impl Tool for ImageSearchTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    /// A failed search call comes back as a single `Error: ...` text unit
    async fn invoke(&self, query: &str) -> Result<RawOutput> {
        let urls = match self.search(query).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!(tool = NAME, error = %e, "Image search failed");
                return Ok(RawOutput::Unit(EvidenceUnit::text(format!("Error: {}", e))));
            }
        };
        info!(tool = NAME, results = urls.len(), "Image results");

        let mut units = Vec::new();
        for url in urls {
            match self.download(&url).await {
                Ok((bytes, mime)) => units.push(
                    EvidenceUnit::image(STANDARD.encode(bytes), mime)
                        .with_metadata("description", query)
                        .with_source_link(url),
                ),
                Err(e) => {
                    warn!(tool = NAME, url = %url, error = %e, "Could not download image");
                    record_skipped(NAME);
                }
            }
        }

        Ok(RawOutput::from(units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{normalize, Content, UnitKind};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool(server: &MockServer) -> ImageSearchTool {
        let google = GoogleSearchConfig {
            api_key: Some("key".into()),
            engine_id: Some("cx".into()),
            api_base: format!("{}/customsearch/v1", server.uri()),
            ..GoogleSearchConfig::default()
        };
        ImageSearchTool::new(&google, &ImageSearchConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_images_are_base64_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("searchType", "image"))
            .and(query_param("num", "7"))
            .and(query_param("safe", "off"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    { "link": format!("{}/cat.png", server.uri()) },
                    { "link": format!("{}/gone.png", server.uri()) }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cat.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(b"hello".to_vec()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let units = normalize(tool(&server).invoke("cats").await.unwrap());

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].kind(), UnitKind::Image);
        assert_eq!(units[0].metadata_value("description"), Some("cats"));
        match units[0].raw_content() {
            Content::Image { data, mime_type } => {
                assert_eq!(data, "aGVsbG8=");
                assert_eq!(mime_type.as_deref(), Some("image/png"));
            }
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_search_returns_error_unit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let units = normalize(tool(&server).invoke("cats").await.unwrap());
        assert_eq!(units.len(), 1);
        assert!(units[0].text_content().starts_with("Error: "));
    }
}
