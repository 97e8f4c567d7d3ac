use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{info, instrument};

use super::{AuthToken, CredentialProvider};
use crate::error::{Error, Result};
use crate::http::ApiClient;

/// Validates a stored token with one read-only call against the host.
pub struct StaticTokenProvider {
    client: ApiClient,
    token: String,
    probe_url: String,
}

impl StaticTokenProvider {
    /// `client` must already be configured to send `token`.
    pub fn new(client: ApiClient, token: impl Into<String>, probe_url: impl Into<String>) -> Self {
        Self {
            client,
            token: token.into(),
            probe_url: probe_url.into(),
        }
    }

    /// Runs the probe and hands back its decoded body with the token.
    ///
    /// Any failure, including a malformed body, is a configuration error.
    #[instrument(skip(self), fields(probe = %self.probe_url))]
    pub async fn validate<T: DeserializeOwned>(&self) -> Result<(AuthToken, T)> {
        let body = self
            .client
            .get_json::<T>(&self.probe_url)
            .await
            .map_err(|e| Error::configuration(format!("token validation failed: {e}")))?;
        info!("token accepted by host");
        Ok((AuthToken::new(self.token.clone()), body))
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn acquire(&self) -> Result<AuthToken> {
        let (token, _) = self.validate::<serde_json::Value>().await?;
        Ok(token)
    }
}
