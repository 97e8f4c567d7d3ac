//! Credential acquisition for the decoration run.

pub mod github_app;
pub mod static_token;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

pub use github_app::GithubAppProvider;
pub use static_token::StaticTokenProvider;

/// Canonical identity of the repository a token was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryIdentity {
    pub node_id: String,
    pub html_url: String,
    pub name: String,
    pub owner: String,
}

/// Bearer credential valid for a single decoration run.
#[derive(Clone)]
pub struct AuthToken {
    value: String,
    expires_at: Option<DateTime<Utc>>,
    repository: Option<RepositoryIdentity>,
}

impl AuthToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
            repository: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn with_repository(mut self, repository: RepositoryIdentity) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn repository(&self) -> Option<&RepositoryIdentity> {
        self.repository.as_ref()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("repository", &self.repository)
            .finish()
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn acquire(&self) -> Result<AuthToken>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn token_without_expiry_never_expires() {
        let token = AuthToken::new("abc");
        assert!(!token.is_expired(Utc::now() + Duration::days(3650)));
    }

    #[test]
    fn token_expires_at_its_own_deadline() {
        let now = Utc::now();
        let token = AuthToken::new("abc").with_expiry(Some(now));
        assert!(token.is_expired(now));
        assert!(!token.is_expired(now - Duration::seconds(1)));
    }

    #[test]
    fn debug_hides_the_bearer_value() {
        let token = AuthToken::new("ghs_supersecret");
        assert!(!format!("{token:?}").contains("supersecret"));
    }
}
