//! HTTP client for the backend key endpoints.
//!
//! - `PATCH {base}/user/encryption-keys`      - Publish public key / backup
//! - `GET   {base}/user/encryption-keys`      - Fetch own key fields
//! - `GET   {base}/user/{id}/public-key`      - Look up another user's key

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;

use super::{EncryptionKeysRecord, EncryptionKeysUpdate, KeyBackupApi};
use crate::config::VaultConfig;
use crate::error::{Error, Result};

// ── Response Bodies ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyResponse {
    #[serde(default)]
    public_key: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────────────

/// `KeyBackupApi` over the backend's REST interface
#[derive(Debug, Clone)]
pub struct HttpKeyBackupApi {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpKeyBackupApi {
    /// Create a client for `base_url`, authenticating with a bearer token
    pub fn new(base_url: &str, auth_token: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::InvalidConfig(format!("Invalid API base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!(
                "API base URL cannot carry a path: {}",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    /// Create a client from the vault configuration
    pub fn from_config(config: &VaultConfig, auth_token: Option<String>) -> Result<Self> {
        Self::new(&config.api_base_url, auth_token, config.http_timeout())
    }

    /// Base URL with `segments` appended, each percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidConfig("API base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn ensure_success(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!("Backend returned {}: {}", status, body);
        Err(Error::NetworkError(format!("backend returned {}", status)))
    }
}

#[async_trait]
impl KeyBackupApi for HttpKeyBackupApi {
    async fn update_encryption_keys(&self, update: &EncryptionKeysUpdate) -> Result<()> {
        let url = self.endpoint(&["user", "encryption-keys"])?;
        let response = self
            .authorize(self.client.patch(url))
            .json(update)
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn fetch_encryption_keys(&self) -> Result<EncryptionKeysRecord> {
        let url = self.endpoint(&["user", "encryption-keys"])?;
        let response = self.authorize(self.client.get(url)).send().await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.json::<EncryptionKeysRecord>().await?)
    }

    async fn fetch_user_public_key(&self, user_id: &str) -> Result<Option<String>> {
        let url = self.endpoint(&["user", user_id, "public-key"])?;
        let response = self.authorize(self.client.get(url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("No published public key for user {}", user_id);
            return Ok(None);
        }

        let response = Self::ensure_success(response).await?;
        let body = response.json::<PublicKeyResponse>().await?;
        Ok(body.public_key.filter(|key| !key.is_empty()))
    }
}
