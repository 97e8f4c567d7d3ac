//! GitHub App installation token exchange.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{AuthToken, CredentialProvider, RepositoryIdentity};
use crate::error::{Error, Result};
use crate::http::{ApiClient, Auth};
use crate::paginate::{Page, Paginator, traverse};

pub const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// Assertions are backdated to absorb clock skew with the host.
const CLOCK_SKEW: Duration = Duration::seconds(10);
const ASSERTION_LIFETIME: Duration = Duration::minutes(2);

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppClaims {
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

#[derive(Deserialize)]
struct Installation {
    id: u64,
    access_tokens_url: String,
    repositories_url: String,
}

#[derive(Deserialize)]
struct InstallationToken {
    token: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct InstallationRepositories {
    #[serde(default)]
    repositories: Vec<Repository>,
}

impl Page for InstallationRepositories {
    type Item = Repository;

    fn into_items(self) -> Vec<Repository> {
        self.repositories
    }
}

#[derive(Deserialize)]
struct Repository {
    node_id: String,
    full_name: String,
    html_url: String,
    name: String,
    owner: Owner,
}

#[derive(Deserialize)]
struct Owner {
    login: String,
}

impl From<Repository> for RepositoryIdentity {
    fn from(repo: Repository) -> Self {
        Self {
            node_id: repo.node_id,
            html_url: repo.html_url,
            name: repo.name,
            owner: repo.owner.login,
        }
    }
}

/// Turns a configured API URL into the REST root, adding `/v3` for
/// Enterprise hosts configured as `https://host/api`.
pub fn normalize_api_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/api") {
        format!("{trimmed}/v3")
    } else {
        trimmed.to_string()
    }
}

pub struct GithubAppProvider {
    api_url: String,
    app_id: String,
    key: EncodingKey,
    algorithm: Algorithm,
    repository: String,
}

impl GithubAppProvider {
    /// `repository` is the `owner/name` path the token must grant access to.
    pub fn new(
        api_url: &str,
        app_id: impl Into<String>,
        private_key_pem: &str,
        repository: impl Into<String>,
    ) -> Result<Self> {
        let pem = private_key_pem.as_bytes();
        let (key, algorithm) = match EncodingKey::from_rsa_pem(pem) {
            Ok(key) => (key, Algorithm::RS256),
            Err(_) => EncodingKey::from_ec_pem(pem)
                .map(|key| (key, Algorithm::ES256))
                .map_err(|e| {
                    Error::configuration(format!("github app private key is not a valid PEM key: {e}"))
                })?,
        };
        Ok(Self {
            api_url: normalize_api_url(api_url),
            app_id: app_id.into(),
            key,
            algorithm,
            repository: repository.into(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn claims(&self, now: DateTime<Utc>) -> AppClaims {
        let issued_at = now - CLOCK_SKEW;
        AppClaims {
            iat: issued_at.timestamp(),
            exp: (issued_at + ASSERTION_LIFETIME).timestamp(),
            iss: self.app_id.clone(),
        }
    }

    /// Signs the short-lived app assertion used for the exchange.
    pub fn assertion(&self, now: DateTime<Utc>) -> Result<String> {
        jsonwebtoken::encode(&Header::new(self.algorithm), &self.claims(now), &self.key)
            .map_err(|e| Error::configuration(format!("could not sign github app assertion: {e}")))
    }
}

#[async_trait]
impl CredentialProvider for GithubAppProvider {
    #[instrument(skip(self), fields(app_id = %self.app_id, repository = %self.repository))]
    async fn acquire(&self) -> Result<AuthToken> {
        let assertion = self.assertion(Utc::now())?;
        let app_client = ApiClient::new(Auth::Bearer(assertion))?.with_accept(GITHUB_ACCEPT);

        let mut installations =
            Paginator::new(&app_client, format!("{}/app/installations", self.api_url));
        while let Some(page) = installations.next_page::<Vec<Installation>>().await? {
            for installation in page {
                let issued: InstallationToken =
                    app_client.post_empty(&installation.access_tokens_url).await?;
                let client = ApiClient::new(Auth::Bearer(issued.token.clone()))?
                    .with_accept(GITHUB_ACCEPT);

                let found = traverse::<InstallationRepositories, _>(
                    &client,
                    &installation.repositories_url,
                    |repo| repo.full_name == self.repository,
                )
                .await?;

                match found {
                    Some(repo) => {
                        info!(installation = installation.id, "installation token acquired");
                        return Ok(AuthToken::new(issued.token)
                            .with_expiry(issued.expires_at)
                            .with_repository(repo.into()));
                    }
                    None => {
                        debug!(installation = installation.id, "repository not visible to installation");
                    }
                }
            }
        }

        Err(Error::configuration(
            "no installation token found with access to the requested repository",
        ))
    }
}
