//! Account directory
//!
//! Maps account ids to display names. The directory is drained completely
//! from a marker-paginated listing before the first asset record is counted,
//! and is read-only afterwards.
//!
//! Directory listings always paginate with [`FailurePolicy::Abort`]: a
//! half-built directory would turn into lookup failures (or worse, blank
//! names) later on.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;

use crate::config::DirectoryConfig;
use crate::error::{Error, FetchFailure, Result};
use crate::fetch::{Page, PageFetcher};
use crate::paginate::{FailurePolicy, Paginator};
use crate::types::{AccountDirectoryEntry, Cursor};

/// Immutable account id to name lookup.
#[derive(Debug, Clone, Default)]
pub struct AccountDirectory {
    names: HashMap<String, String>,
}

impl AccountDirectory {
    /// Drain every page of a directory listing.
    pub async fn build<F>(fetcher: F) -> Result<Self>
    where
        F: PageFetcher<Item = AccountDirectoryEntry>,
    {
        let mut paginator = Paginator::new(fetcher).with_policy(FailurePolicy::Abort);
        let mut entries = Vec::new();
        while let Some(page) = paginator.next_page().await? {
            entries.extend(page);
        }

        let directory = Self::from_entries(entries);
        tracing::info!(
            accounts = directory.len(),
            pages = paginator.pages_fetched(),
            "Account directory built"
        );
        Ok(directory)
    }

    /// Build from entries already in hand. Later duplicates win.
    pub fn from_entries(entries: impl IntoIterator<Item = AccountDirectoryEntry>) -> Self {
        let mut names = HashMap::new();
        for entry in entries {
            if let Some(previous) = names.insert(entry.account_id.clone(), entry.account_name) {
                tracing::debug!(
                    account_id = %entry.account_id,
                    previous = %previous,
                    "Duplicate account in directory, keeping the later name"
                );
            }
        }
        Self { names }
    }

    /// Name for `account_id`; a miss is a data-consistency error.
    pub fn lookup(&self, account_id: &str) -> Result<&str> {
        self.names
            .get(account_id)
            .map(String::as_str)
            .ok_or_else(|| Error::DirectoryLookup {
                account_id: account_id.to_string(),
            })
    }

    pub fn contains(&self, account_id: &str) -> bool {
        self.names.contains_key(account_id)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Response from GET /accounts
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsResponse {
    #[serde(default)]
    pub accounts: Vec<AccountDirectoryEntry>,
    #[serde(default)]
    pub next_marker: Option<String>,
}

impl From<AccountsResponse> for Page<AccountDirectoryEntry> {
    fn from(response: AccountsResponse) -> Self {
        Page::new(response.accounts, response.next_marker.map(Cursor::from))
    }
}

/// HTTP client for the directory-listing API
pub struct HttpDirectoryLister {
    http_client: reqwest::Client,
    url: String,
}

impl HttpDirectoryLister {
    pub fn new(config: &DirectoryConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| Error::Config("directory.base_url is required".to_string()))?
            .trim_end_matches('/');
        let url = format!("{}{}", base_url, config.accounts_path);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = &config.token {
            let auth_value = format!("Bearer {}", token);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid directory.token: {}", e)))?,
            );
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client, url })
    }

    /// Listing URL for a given marker; the first request carries none.
    fn page_url(&self, marker: Option<&Cursor>) -> std::result::Result<String, FetchFailure> {
        match marker {
            None => Ok(self.url.clone()),
            Some(cursor) => {
                let token = cursor
                    .as_str()
                    .ok_or_else(|| FetchFailure::new(marker, "directory marker is not a string"))?;
                Ok(format!("{}?marker={}", self.url, urlencoding::encode(token)))
            }
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PageFetcher for HttpDirectoryLister {
    type Item = AccountDirectoryEntry;

    async fn fetch(
        &self,
        marker: Option<&Cursor>,
    ) -> std::result::Result<Page<AccountDirectoryEntry>, FetchFailure> {
        let url = self.page_url(marker)?;

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchFailure::new(marker, format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            let result: AccountsResponse = response
                .json()
                .await
                .map_err(|e| FetchFailure::new(marker, format!("failed to parse response: {}", e)))?;
            Ok(result.into())
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(FetchFailure::new(
                marker,
                format!("API error ({}): {}", status, error_text),
            ))
        }
    }
}

/// Directory entries listed inline in the configuration.
///
/// Serves everything as a single page.
pub struct StaticDirectoryLister {
    entries: Vec<AccountDirectoryEntry>,
}

impl StaticDirectoryLister {
    pub fn new(entries: Vec<AccountDirectoryEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl PageFetcher for StaticDirectoryLister {
    type Item = AccountDirectoryEntry;

    async fn fetch(
        &self,
        _marker: Option<&Cursor>,
    ) -> std::result::Result<Page<AccountDirectoryEntry>, FetchFailure> {
        Ok(Page::last(self.entries.clone()))
    }
}

/// Whichever directory source the configuration selects.
pub enum DirectorySource {
    Static(StaticDirectoryLister),
    Http(HttpDirectoryLister),
}

impl DirectorySource {
    /// Inline accounts win over an API endpoint.
    pub fn from_config(config: &DirectoryConfig) -> Result<Self> {
        config.validate()?;
        if !config.accounts.is_empty() {
            return Ok(DirectorySource::Static(StaticDirectoryLister::new(
                config.accounts.clone(),
            )));
        }
        Ok(DirectorySource::Http(HttpDirectoryLister::new(config)?))
    }

    pub fn describe(&self) -> String {
        match self {
            DirectorySource::Static(lister) => {
                format!("inline ({} accounts)", lister.entries.len())
            }
            DirectorySource::Http(lister) => lister.url().to_string(),
        }
    }
}

#[async_trait]
impl PageFetcher for DirectorySource {
    type Item = AccountDirectoryEntry;

    async fn fetch(
        &self,
        marker: Option<&Cursor>,
    ) -> std::result::Result<Page<AccountDirectoryEntry>, FetchFailure> {
        match self {
            DirectorySource::Static(lister) => lister.fetch(marker).await,
            DirectorySource::Http(lister) => lister.fetch(marker).await,
        }
    }
}
