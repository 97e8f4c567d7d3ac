use std::fmt;

use reqwest::Url;
use serde::Deserialize;

use crate::batch::UploadLimit;
use crate::error::{Error, Result};

const CLOUD_HOSTS: &[&str] = &[
    "github.com",
    "api.github.com",
    "gitlab.com",
    "bitbucket.org",
    "api.bitbucket.org",
    "dev.azure.com",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Github,
    Gitlab,
    Bitbucket,
    #[serde(alias = "azure-devops", alias = "azuredevops")]
    Azure,
}

impl Platform {
    pub fn name(self) -> &'static str {
        match self {
            Platform::Github => "github",
            Platform::Gitlab => "gitlab",
            Platform::Bitbucket => "bitbucket",
            Platform::Azure => "azure",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Deserialize)]
#[serde(untagged)]
pub enum Credentials {
    GithubApp { app_id: String, private_key: String },
    Token { token: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::GithubApp { app_id, .. } => f
                .debug_struct("GithubApp")
                .field("app_id", app_id)
                .field("private_key", &"<redacted>")
                .finish(),
            Credentials::Token { .. } => f
                .debug_struct("Token")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// Where and how to reach the host of one pull request.
#[derive(Debug, Clone, Deserialize)]
pub struct HostBinding {
    pub platform: Platform,
    pub url: String,
    /// Bitbucket Server project key, Bitbucket Cloud workspace or Azure DevOps project.
    #[serde(default)]
    pub project: Option<String>,
    pub repository: String,
    pub credentials: Credentials,
    #[serde(default = "default_summary_comment")]
    pub summary_comment: bool,
    #[serde(default)]
    pub upload_limit: Option<UploadLimit>,
}

fn default_summary_comment() -> bool {
    true
}

impl HostBinding {
    pub fn is_cloud(&self) -> bool {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .is_some_and(|host| CLOUD_HOSTS.contains(&host.as_str()))
    }

    /// Checks everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.url)
            .map_err(|e| Error::configuration(format!("invalid url '{}': {e}", self.url)))?;
        if self.repository.trim().is_empty() {
            return Err(Error::configuration("repository must not be empty"));
        }
        match (self.platform, &self.credentials) {
            (Platform::Github, Credentials::GithubApp { .. }) => {}
            (Platform::Github, Credentials::Token { .. }) => {
                return Err(Error::configuration(
                    "github requires app_id and private_key credentials",
                ));
            }
            (_, Credentials::Token { .. }) => {}
            (platform, Credentials::GithubApp { .. }) => {
                return Err(Error::configuration(format!(
                    "{platform} requires a token credential"
                )));
            }
        }
        if matches!(self.platform, Platform::Bitbucket | Platform::Azure) {
            self.project()?;
        }
        if let Some(limit) = self.upload_limit {
            limit.validate()?;
        }
        Ok(())
    }

    pub(crate) fn project(&self) -> Result<&str> {
        self.project
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                Error::configuration(format!("{} binding requires a project", self.platform))
            })
    }

    pub(crate) fn token(&self) -> Result<&str> {
        match &self.credentials {
            Credentials::Token { token } => Ok(token),
            Credentials::GithubApp { .. } => Err(Error::configuration(format!(
                "{} requires a token credential",
                self.platform
            ))),
        }
    }

    pub(crate) fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    pub(crate) fn upload_limit_or(&self, default: UploadLimit) -> UploadLimit {
        self.upload_limit.unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_binding(platform: Platform, url: &str) -> HostBinding {
        HostBinding {
            platform,
            url: url.into(),
            project: Some("PROJ".into()),
            repository: "repo".into(),
            credentials: Credentials::Token {
                token: "secret".into(),
            },
            summary_comment: true,
            upload_limit: None,
        }
    }

    #[test]
    fn cloud_flag_follows_url_host() {
        assert!(token_binding(Platform::Bitbucket, "https://api.bitbucket.org/2.0").is_cloud());
        assert!(token_binding(Platform::Azure, "https://dev.azure.com/acme").is_cloud());
        assert!(!token_binding(Platform::Bitbucket, "https://bitbucket.acme.internal").is_cloud());
        assert!(!token_binding(Platform::Gitlab, "not a url").is_cloud());
    }

    #[test]
    fn github_with_token_is_a_configuration_error() {
        let binding = token_binding(Platform::Github, "https://api.github.com");
        let err = binding.validate().unwrap_err();
        assert!(err.to_string().contains("app_id"));
    }

    #[test]
    fn azure_without_project_is_rejected() {
        let mut binding = token_binding(Platform::Azure, "https://dev.azure.com/acme");
        binding.project = None;
        assert!(binding.validate().is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let binding = token_binding(Platform::Gitlab, "https://gitlab.com/api/v4");
        let printed = format!("{binding:?}");
        assert!(!printed.contains("secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn parse_app_credentials_binding() {
        let binding: HostBinding = serde_json::from_value(json!({
            "platform": "github",
            "url": "https://ghe.acme.com/api",
            "repository": "acme/web",
            "credentials": {"app_id": "77", "private_key": "-----BEGIN..."}
        }))
        .unwrap();
        assert!(matches!(binding.credentials, Credentials::GithubApp { .. }));
        assert!(binding.summary_comment);
        assert!(binding.upload_limit.is_none());
        assert!(binding.validate().is_ok());
    }

    #[test]
    fn parse_platform_aliases() {
        let platform: Platform = serde_json::from_value(json!("azure-devops")).unwrap();
        assert_eq!(platform, Platform::Azure);
    }
}
