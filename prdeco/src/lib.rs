//! Publishes code analysis results onto pull requests.
//!
//! [`decorate`] picks the decorator for a [`HostBinding`] and runs it through
//! the [`Orchestrator`]: authenticate, clean up earlier output, assemble the
//! selected issues, publish, then reconcile the summary comment.

pub mod assemble;
pub mod auth;
pub mod batch;
pub mod binding;
pub mod decorator;
pub mod error;
pub mod http;
pub mod model;
pub mod paginate;
pub mod selection;
pub mod settings;
pub mod summary;

pub use batch::UploadLimit;
pub use binding::{Credentials, HostBinding, Platform};
pub use decorator::{Decorator, Orchestrator};
pub use error::{Error, ErrorKind, Result};
pub use model::{AnalysisResult, DecorationResult, Issue, IssueType, QualityGateStatus, Severity};
pub use settings::DecorationSettings;

use tracing::{info, instrument};

use decorator::azure::AzureDecorator;
use decorator::bitbucket::{BitbucketCloudDecorator, BitbucketServerDecorator};
use decorator::github::GithubDecorator;
use decorator::gitlab::GitlabDecorator;

/// Decorates the pull request named by `analysis` on the host described by
/// `binding`.
#[instrument(skip_all, fields(platform = binding.platform.name(), repository = %binding.repository))]
pub async fn decorate(
    binding: &HostBinding,
    settings: &DecorationSettings,
    analysis: &AnalysisResult,
) -> Result<DecorationResult> {
    binding.validate()?;
    let orchestrator = Orchestrator::new(settings).with_summary_comment(binding.summary_comment);
    let pull_request = analysis.pull_request_id.as_str();

    match binding.platform {
        Platform::Github => orchestrator.run(&GithubDecorator::new(binding)?, analysis).await,
        Platform::Gitlab => {
            orchestrator
                .run(&GitlabDecorator::new(binding, pull_request)?, analysis)
                .await
        }
        Platform::Bitbucket if binding.is_cloud() => {
            let decorator =
                BitbucketCloudDecorator::new(binding, settings.report_key.as_str(), pull_request)?;
            orchestrator.run(&decorator, analysis).await
        }
        Platform::Bitbucket => {
            let decorator =
                BitbucketServerDecorator::new(binding, settings.report_key.as_str(), pull_request)?;
            orchestrator.run(&decorator, analysis).await
        }
        Platform::Azure => {
            orchestrator
                .run(&AzureDecorator::new(binding, pull_request)?, analysis)
                .await
        }
    }
}

/// Checks that the binding's credentials are accepted by the host without
/// publishing anything.
#[instrument(skip_all, fields(platform = binding.platform.name(), repository = %binding.repository))]
pub async fn validate(binding: &HostBinding) -> Result<()> {
    binding.validate()?;
    let settings = DecorationSettings::default();

    match binding.platform {
        Platform::Github => GithubDecorator::new(binding)?.verify_credentials().await?,
        Platform::Gitlab => GitlabDecorator::new(binding, "")?.verify_credentials().await?,
        Platform::Bitbucket if binding.is_cloud() => {
            BitbucketCloudDecorator::new(binding, settings.report_key, "")?
                .verify_credentials()
                .await?
        }
        Platform::Bitbucket => {
            BitbucketServerDecorator::new(binding, settings.report_key, "")?
                .verify_credentials()
                .await?
        }
        Platform::Azure => AzureDecorator::new(binding, "")?.verify_credentials().await?,
    }
    info!("credentials accepted");
    Ok(())
}
