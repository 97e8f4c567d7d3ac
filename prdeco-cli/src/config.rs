//! TOML run configuration: where the pull request lives and how to decorate it.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use prdeco::{Credentials, DecorationSettings, HostBinding, Platform, UploadLimit};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    binding: RawBinding,
    #[serde(default)]
    decoration: Option<DecorationSettings>,
}

#[derive(Debug, Deserialize)]
struct RawBinding {
    platform: Platform,
    url: String,
    #[serde(default)]
    project: Option<String>,
    repository: String,
    #[serde(default)]
    credentials: RawCredentials,
    #[serde(default = "enabled")]
    summary_comment: bool,
    #[serde(default)]
    upload_limit: Option<UploadLimit>,
}

fn enabled() -> bool {
    true
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCredentials {
    token: Option<String>,
    app_id: Option<AppId>,
    private_key: Option<String>,
    private_key_file: Option<PathBuf>,
}

impl fmt::Debug for RawCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCredentials")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("app_id", &self.app_id)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("private_key_file", &self.private_key_file)
            .finish()
    }
}

/// App ids are numbers in GitHub's UI but strings in most tooling.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AppId {
    Number(u64),
    Text(String),
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppId::Number(n) => write!(f, "{n}"),
            AppId::Text(s) => f.write_str(s),
        }
    }
}

/// Everything needed to run one command.
#[derive(Debug)]
pub struct RunConfig {
    pub binding: HostBinding,
    pub settings: DecorationSettings,
}

impl RunConfig {
    /// Reads and checks the config file. `token` replaces any stored token.
    pub fn load(path: &Path, token: Option<String>) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&text, base_dir, token)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(text: &str, base_dir: &Path, token: Option<String>) -> anyhow::Result<Self> {
        let file: ConfigFile = toml::from_str(text)?;
        let raw = file.binding;
        let credentials = credentials(raw.platform, raw.credentials, base_dir, token)?;

        let binding = HostBinding {
            platform: raw.platform,
            url: raw.url,
            project: raw.project,
            repository: raw.repository,
            credentials,
            summary_comment: raw.summary_comment,
            upload_limit: raw.upload_limit,
        };
        binding.validate()?;

        Ok(Self {
            binding,
            settings: file.decoration.unwrap_or_default(),
        })
    }
}

fn credentials(
    platform: Platform,
    raw: RawCredentials,
    base_dir: &Path,
    token_override: Option<String>,
) -> anyhow::Result<Credentials> {
    let token_override = match (platform, token_override) {
        (Platform::Github, Some(_)) => {
            warn!("token override ignored, github decoration needs app credentials");
            None
        }
        (_, token) => token,
    };
    if let Some(token) = token_override.or(raw.token) {
        return Ok(Credentials::Token { token });
    }
    let Some(app_id) = raw.app_id else {
        bail!("credentials need either a token or an app_id with a private key");
    };
    let private_key = match (raw.private_key, raw.private_key_file) {
        (Some(key), None) => key,
        (None, Some(file)) => {
            let file = base_dir.join(file);
            fs::read_to_string(&file)
                .with_context(|| format!("failed to read private key {}", file.display()))?
        }
        (Some(_), Some(_)) => bail!("set only one of private_key and private_key_file"),
        (None, None) => bail!("app_id {app_id} has no private_key or private_key_file"),
    };
    Ok(Credentials::GithubApp {
        app_id: app_id.to_string(),
        private_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_binding_with_decoration_settings() {
        let config = RunConfig::parse(
            r#"
            [binding]
            platform = "bitbucket"
            url = "https://bitbucket.acme.com"
            project = "PRJ"
            repository = "web"
            summary_comment = false

            [binding.credentials]
            token = "secret"

            [binding.upload_limit]
            batch_size = 10
            total_cap = 20

            [decoration]
            tool_name = "Scanner"
            severity_exclusions = "info, low"
            max_issues = 5
            "#,
            Path::new("."),
            None,
        )
        .unwrap();

        assert_eq!(config.binding.platform, Platform::Bitbucket);
        assert!(!config.binding.summary_comment);
        assert_eq!(config.binding.upload_limit, Some(UploadLimit::new(10, 20)));
        assert!(matches!(config.binding.credentials, Credentials::Token { ref token } if token == "secret"));
        assert_eq!(config.settings.tool_name, "Scanner");
        assert_eq!(config.settings.report_key, prdeco::settings::DEFAULT_REPORT_KEY);
        assert_eq!(config.settings.selection.max_issues, Some(5));
        assert_eq!(
            config.settings.selection.severity_exclusions.as_deref(),
            Some("info, low")
        );
    }

    #[test]
    fn numeric_app_id_and_key_file_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.pem"), "PEM").unwrap();
        let config = RunConfig::parse(
            r#"
            [binding]
            platform = "github"
            url = "https://api.github.com"
            repository = "acme/web"

            [binding.credentials]
            app_id = 12345
            private_key_file = "app.pem"
            "#,
            dir.path(),
            None,
        )
        .unwrap();

        match config.binding.credentials {
            Credentials::GithubApp {
                app_id,
                private_key,
            } => {
                assert_eq!(app_id, "12345");
                assert_eq!(private_key, "PEM");
            }
            other => panic!("unexpected credentials {other:?}"),
        }
        assert!(config.binding.summary_comment);
    }

    #[test]
    fn token_flag_overrides_stored_token() {
        let config = RunConfig::parse(
            r#"
            [binding]
            platform = "gitlab"
            url = "https://gitlab.com/api/v4"
            repository = "group/app"
            credentials = { token = "stored" }
            "#,
            Path::new("."),
            Some("flag".into()),
        )
        .unwrap();
        assert!(matches!(config.binding.credentials, Credentials::Token { ref token } if token == "flag"));
    }

    #[test]
    fn token_flag_does_not_replace_github_app_credentials() {
        let config = RunConfig::parse(
            r#"
            [binding]
            platform = "github"
            url = "https://api.github.com"
            repository = "acme/web"
            credentials = { app_id = "77", private_key = "PEM" }
            "#,
            Path::new("."),
            Some("ghp_flag".into()),
        )
        .unwrap();
        assert!(matches!(
            config.binding.credentials,
            Credentials::GithubApp { ref app_id, .. } if app_id == "77"
        ));
    }

    #[test]
    fn missing_project_for_azure_is_rejected() {
        let err = RunConfig::parse(
            r#"
            [binding]
            platform = "azure"
            url = "https://dev.azure.com/acme"
            repository = "portal"
            credentials = { token = "pat" }
            "#,
            Path::new("."),
            None,
        )
        .unwrap_err();
        let source = err.downcast_ref::<prdeco::Error>().unwrap();
        assert_eq!(source.kind(), prdeco::ErrorKind::Configuration);
    }

    #[test]
    fn credentials_without_token_or_app_are_rejected() {
        let err = RunConfig::parse(
            r#"
            [binding]
            platform = "gitlab"
            url = "https://gitlab.com/api/v4"
            repository = "group/app"
            "#,
            Path::new("."),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("token or an app_id"));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let raw = RawCredentials {
            token: Some("hunter2".into()),
            ..RawCredentials::default()
        };
        assert!(!format!("{raw:?}").contains("hunter2"));
    }
}
