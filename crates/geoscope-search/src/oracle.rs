//! HTTP search oracle client.

use std::time::Duration;

use async_trait::async_trait;
use geoscope_types::{AuditError, Market, Result};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{market_country, SearchHit, SearchProvider};

/// Client for the external search oracle. Unauthenticated or failing
/// calls are permitted to fail; the caller treats an error as "no
/// competitors discovered".
pub struct OracleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    engine_id: Option<String>,
}

impl OracleProvider {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        engine_id: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| AuditError::internal(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            base_url,
            api_key,
            engine_id,
        })
    }

    fn parse_items(&self, response: Value, query: &str) -> Vec<SearchHit> {
        let Some(items) = response.get("items").and_then(Value::as_array) else {
            debug!(query = %query, "oracle response has no items");
            return Vec::new();
        };
        items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                let link = item.get("link").and_then(Value::as_str)?;
                let mut hit = SearchHit::new(link, index as u32 + 1);
                if let Some(title) = item.get("title").and_then(Value::as_str) {
                    hit = hit.with_title(title);
                }
                if let Some(snippet) = item.get("snippet").and_then(Value::as_str) {
                    hit = hit.with_snippet(snippet);
                }
                Some(hit)
            })
            .collect()
    }
}

#[async_trait]
impl SearchProvider for OracleProvider {
    async fn search(&self, query: &str, limit: u32, market: Market) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(AuditError::invalid_config("search query cannot be empty"));
        }

        let num = limit.clamp(1, 10).to_string();
        let mut request = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("num", num.as_str())]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }
        if let Some(engine) = &self.engine_id {
            request = request.query(&[("cx", engine.as_str())]);
        }
        if let Some(country) = market_country(market) {
            request = request.query(&[("gl", country)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuditError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(query = %query, status = status.as_u16(), "search oracle returned error");
            return Err(AuditError::from_status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AuditError::parse(format!("search oracle response: {}", e)))?;
        Ok(self.parse_items(body, query))
    }

    fn name(&self) -> &'static str {
        "oracle"
    }
}

impl std::fmt::Debug for OracleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("engine_id", &self.engine_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn parses_items_into_hits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "best geo tools"))
            .and(query_param("cx", "engine-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"link": "https://one.com/a", "title": "One", "snippet": "first"},
                    {"link": "https://two.com/b", "title": "Two"},
                    {"title": "no link, skipped"}
                ]
            })))
            .mount(&server)
            .await;

        let provider = OracleProvider::new(
            server.uri(),
            Some("secret".to_string()),
            Some("engine-1".to_string()),
        )
        .unwrap();
        let hits = provider
            .search("best geo tools", 5, Market::Us)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].link, "https://one.com/a");
        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits[1].title.as_deref(), Some("Two"));
    }

    #[tokio::test]
    async fn quota_failure_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let provider = OracleProvider::new(server.uri(), None, None).unwrap();
        let err = provider.search("q", 3, Market::None).await.unwrap_err();
        assert_eq!(err.kind(), "http_4xx");
    }

    #[tokio::test]
    async fn empty_query_rejected() {
        let provider = OracleProvider::new("http://localhost:1".to_string(), None, None).unwrap();
        let err = provider.search("  ", 3, Market::None).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_config");
    }

    #[tokio::test]
    async fn missing_items_is_empty_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let provider = OracleProvider::new(server.uri(), None, None).unwrap();
        let hits = provider.search("anything", 3, Market::None).await.unwrap();
        assert!(hits.is_empty());
    }
}
