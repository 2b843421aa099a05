//! API credential lookup
//!
//! Credentials are resolved once, before the first search call. Sources are
//! tried in order: explicit config values, environment variables, then a JSON
//! credentials file shaped like `{"apiKeyId": "..", "apiKeySecret": ".."}`.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SearchConfig;
use crate::error::{Error, Result};

pub const ENV_API_KEY_ID: &str = "ASSETCOUNT_API_KEY_ID";
pub const ENV_API_KEY_SECRET: &str = "ASSETCOUNT_API_KEY_SECRET";

/// Key pair for HTTP Basic authentication against the search API.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCredentials {
    pub api_key_id: String,
    pub api_key_secret: String,
}

impl ApiCredentials {
    pub fn new(api_key_id: impl Into<String>, api_key_secret: impl Into<String>) -> Self {
        Self {
            api_key_id: api_key_id.into(),
            api_key_secret: api_key_secret.into(),
        }
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key_id", &self.api_key_id)
            .field("api_key_secret", &"<redacted>")
            .finish()
    }
}

/// Source of API credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self) -> Result<ApiCredentials>;
}

/// Credentials from the `[search]` config section, the environment, or a file.
pub struct ConfigCredentials {
    api_key_id: Option<String>,
    api_key_secret: Option<String>,
    credentials_file: Option<std::path::PathBuf>,
}

impl ConfigCredentials {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            api_key_id: config.api_key_id.clone(),
            api_key_secret: config.api_key_secret.clone(),
            credentials_file: config.credentials_file.clone(),
        }
    }

    async fn resolve_with<F>(&self, env: F) -> Result<ApiCredentials>
    where
        F: Fn(&str) -> Option<String> + Send + Sync,
    {
        if let (Some(id), Some(secret)) = (&self.api_key_id, &self.api_key_secret) {
            tracing::debug!("Using API credentials from config");
            return Ok(ApiCredentials::new(id.clone(), secret.clone()));
        }

        if let (Some(id), Some(secret)) = (env(ENV_API_KEY_ID), env(ENV_API_KEY_SECRET)) {
            tracing::debug!("Using API credentials from environment");
            return Ok(ApiCredentials::new(id, secret));
        }

        if let Some(path) = &self.credentials_file {
            tracing::debug!(path = %path.display(), "Reading API credentials file");
            return read_credentials_file(path).await;
        }

        Err(Error::Config(format!(
            "no API credentials: set search.api_key_id/api_key_secret, {}/{}, or search.credentials_file",
            ENV_API_KEY_ID, ENV_API_KEY_SECRET
        )))
    }
}

#[async_trait]
impl CredentialProvider for ConfigCredentials {
    async fn credentials(&self) -> Result<ApiCredentials> {
        self.resolve_with(|name| std::env::var(name).ok()).await
    }
}

async fn read_credentials_file(path: &Path) -> Result<ApiCredentials> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::Config(format!(
            "failed to read credentials file {}: {}",
            path.display(),
            e
        ))
    })?;
    let credentials: ApiCredentials = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "failed to parse credentials file {}: {}",
            path.display(),
            e
        ))
    })?;
    if credentials.api_key_id.is_empty() || credentials.api_key_secret.is_empty() {
        return Err(Error::Config(format!(
            "credentials file {} has an empty apiKeyId or apiKeySecret",
            path.display()
        )));
    }
    Ok(credentials)
}
