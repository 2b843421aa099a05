//! HTTP client for the protected-asset search API
//!
//! `POST {base_url}/protected-asset/search` with
//! `{"pageSize": n, "searchAfter": [..]}`; the response carries `assets` and,
//! while more pages remain, a new `searchAfter` cursor.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::credentials::{ApiCredentials, CredentialProvider};
use super::{Page, PageFetcher};
use crate::config::SearchConfig;
use crate::error::{Error, FetchFailure, Result};
use crate::types::{AssetRecord, Cursor};

/// Response from POST /protected-asset/search
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Assets on this page
    #[serde(default)]
    pub assets: Vec<AssetRecord>,
    /// Cursor for the next page; absent or empty on the last page
    #[serde(default)]
    pub search_after: Option<Value>,
}

impl From<SearchResponse> for Page<AssetRecord> {
    fn from(response: SearchResponse) -> Self {
        Page::new(
            response.assets,
            Cursor::from_response(response.search_after),
        )
    }
}

/// Request body for POST /protected-asset/search
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    page_size: u32,
    search_after: &'a Value,
}

/// HTTP client for the search API
pub struct SearchClient {
    http_client: reqwest::Client,
    url: String,
    page_size: u32,
    credentials: ApiCredentials,
}

impl SearchClient {
    /// Create a new search client from configuration
    ///
    /// Returns an error if the configuration is invalid or missing required fields.
    pub fn new(config: &SearchConfig, credentials: ApiCredentials) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| Error::Config("search.base_url is required".to_string()))?
            .trim_end_matches('/');
        let url = format!("{}{}", base_url, config.search_path);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url,
            page_size: config.page_size,
            credentials,
        })
    }

    /// Resolve credentials, then build the client.
    ///
    /// Credential lookup completes before any search request is made.
    pub async fn connect(config: &SearchConfig, provider: &dyn CredentialProvider) -> Result<Self> {
        let credentials = provider.credentials().await?;
        Self::new(config, credentials)
    }

    /// Override the configured page size.
    pub fn with_page_size(mut self, page_size: u32) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::Config(
                "page size must be a positive integer".to_string(),
            ));
        }
        self.page_size = page_size;
        Ok(self)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PageFetcher for SearchClient {
    type Item = AssetRecord;

    async fn fetch(&self, cursor: Option<&Cursor>) -> std::result::Result<Page<AssetRecord>, FetchFailure> {
        let first_page = Value::Array(Vec::new());
        let request_body = SearchRequest {
            page_size: self.page_size,
            search_after: cursor.map(Cursor::as_value).unwrap_or(&first_page),
        };

        let response = self
            .http_client
            .post(&self.url)
            .basic_auth(
                &self.credentials.api_key_id,
                Some(&self.credentials.api_key_secret),
            )
            .json(&request_body)
            .send()
            .await
            .map_err(|e| FetchFailure::new(cursor, format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            let result: SearchResponse = response
                .json()
                .await
                .map_err(|e| FetchFailure::new(cursor, format!("failed to parse response: {}", e)))?;
            tracing::debug!(
                assets = result.assets.len(),
                has_next = result.search_after.is_some(),
                "Fetched search page"
            );
            Ok(result.into())
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(FetchFailure::new(
                cursor,
                format!("API error ({}): {}", status, error_text),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::StubApi;
    use serde_json::json;

    fn config() -> SearchConfig {
        SearchConfig {
            base_url: Some("https://api.example.com/v2/".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_client_requires_base_url() {
        let result = SearchClient::new(&SearchConfig::default(), ApiCredentials::new("id", "s"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_client_builds_search_url() {
        let client = SearchClient::new(&config(), ApiCredentials::new("id", "s")).unwrap();
        assert_eq!(client.url(), "https://api.example.com/v2/protected-asset/search");
        assert_eq!(client.page_size(), 1000);
    }

    #[test]
    fn test_page_size_override() {
        let client = SearchClient::new(&config(), ApiCredentials::new("id", "s")).unwrap();
        assert!(client.with_page_size(0).is_err());

        let client = SearchClient::new(&config(), ApiCredentials::new("id", "s"))
            .unwrap()
            .with_page_size(50)
            .unwrap();
        assert_eq!(client.page_size(), 50);
    }

    #[test]
    fn test_first_request_body_sends_empty_search_after() {
        let empty = Value::Array(Vec::new());
        let body = serde_json::to_value(SearchRequest {
            page_size: 1000,
            search_after: &empty,
        })
        .unwrap();
        assert_eq!(body, json!({"pageSize": 1000, "searchAfter": []}));
    }

    #[test]
    fn test_response_into_page() {
        let response: SearchResponse = serde_json::from_value(json!({
            "assets": [
                {"externalCloudAccountId": "111", "type": "vm", "id": "i-1"},
                {"externalCloudAccountId": "222", "type": "db", "id": "db-1"}
            ],
            "searchAfter": ["db-1", 1662595200]
        }))
        .unwrap();
        let page: Page<AssetRecord> = response.into();
        assert_eq!(page.items.len(), 2);
        assert_eq!(
            page.next_cursor,
            Some(Cursor::from(json!(["db-1", 1662595200])))
        );
    }

    #[test]
    fn test_last_page_response() {
        let response: SearchResponse = serde_json::from_value(json!({"assets": []})).unwrap();
        let page: Page<AssetRecord> = response.into();
        assert!(page.items.is_empty());
        assert!(page.is_last());

        let response: SearchResponse =
            serde_json::from_value(json!({"assets": [], "searchAfter": null})).unwrap();
        assert!(Page::from(response).is_last());
    }
    // ============================================
    // Round trips against a stub API
    // ============================================

    fn stub_client(stub: &StubApi) -> SearchClient {
        let config = SearchConfig {
            base_url: Some(stub.base_url().to_string()),
            ..Default::default()
        };
        SearchClient::new(&config, ApiCredentials::new("key-id", "key-secret"))
            .unwrap()
            .with_page_size(1)
            .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_sends_basic_auth_and_echoes_cursor() {
        let stub = StubApi::start(vec![
            (
                200,
                r#"{"assets":[{"externalCloudAccountId":"111","type":"vm"}],"searchAfter":["vm-1",17]}"#,
            ),
            (200, r#"{"assets":[{"externalCloudAccountId":"222","type":"db"}]}"#),
        ])
        .await;
        let client = stub_client(&stub);

        let first = client.fetch(None).await.unwrap();
        assert_eq!(first.items, vec![AssetRecord::new("111", "vm")]);
        assert_eq!(first.next_cursor, Some(Cursor::from(json!(["vm-1", 17]))));

        let second = client.fetch(first.next_cursor.as_ref()).await.unwrap();
        assert_eq!(second.items, vec![AssetRecord::new("222", "db")]);
        assert!(second.is_last());

        let requests = stub.requests();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            assert_eq!(request.method, "POST");
            assert_eq!(request.uri, "/protected-asset/search");
            assert_eq!(
                request.authorization.as_deref(),
                Some("Basic a2V5LWlkOmtleS1zZWNyZXQ=")
            );
        }

        let bodies: Vec<Value> = requests
            .iter()
            .map(|r| serde_json::from_str(&r.body).unwrap())
            .collect();
        assert_eq!(bodies[0], json!({"pageSize": 1, "searchAfter": []}));
        assert_eq!(bodies[1], json!({"pageSize": 1, "searchAfter": ["vm-1", 17]}));
    }

    #[tokio::test]
    async fn test_error_status_becomes_fetch_failure_at_cursor() {
        let stub = StubApi::start(vec![(503, "down for maintenance")]).await;
        let client = stub_client(&stub);
        let cursor = Cursor::from(json!(["vm-1", 17]));

        let failure = client.fetch(Some(&cursor)).await.unwrap_err();
        assert_eq!(failure.cursor, Some(cursor));
        assert!(failure.message.contains("503"), "{}", failure.message);
        assert!(failure.message.contains("down for maintenance"));
    }

    #[tokio::test]
    async fn test_malformed_body_becomes_fetch_failure() {
        let stub = StubApi::start(vec![(200, "<html>gateway</html>")]).await;
        let client = stub_client(&stub);

        let failure = client.fetch(None).await.unwrap_err();
        assert!(failure.is_first_page());
        assert!(failure.message.contains("failed to parse response"));
    }
}
