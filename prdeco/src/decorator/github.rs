//! GitHub check runs and pull request summary comments.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{Decorator, Publication};
use crate::assemble::{Annotation, AnnotationLevel};
use crate::auth::github_app::GITHUB_ACCEPT;
use crate::auth::{AuthToken, CredentialProvider, GithubAppProvider, RepositoryIdentity};
use crate::batch::UploadLimit;
use crate::binding::{Credentials, HostBinding};
use crate::error::{Error, Result};
use crate::http::{ApiClient, Auth};
use crate::model::AnalysisResult;
use crate::paginate::collect_all;
use crate::summary::is_summary_of;

#[derive(Serialize)]
struct CreateCheckRun<'a> {
    name: String,
    head_sha: &'a str,
    status: &'static str,
    conclusion: &'static str,
    details_url: &'a str,
    external_id: &'a str,
    started_at: String,
    completed_at: String,
    output: CheckRunOutput<'a>,
}

#[derive(Serialize)]
struct UpdateCheckRun<'a> {
    output: CheckRunOutput<'a>,
}

#[derive(Serialize)]
struct CheckRunOutput<'a> {
    title: &'static str,
    summary: &'a str,
    annotations: Vec<CheckAnnotation<'a>>,
}

#[derive(Serialize)]
struct CheckAnnotation<'a> {
    path: &'a str,
    start_line: u32,
    end_line: u32,
    annotation_level: &'static str,
    title: String,
    message: &'a str,
    raw_details: &'a str,
}

impl<'a> From<&'a Annotation> for CheckAnnotation<'a> {
    fn from(annotation: &'a Annotation) -> Self {
        // check run annotations must point at a line
        let line = annotation.line.unwrap_or(1).max(1);
        Self {
            path: &annotation.path,
            start_line: line,
            end_line: line,
            annotation_level: level_name(annotation.level),
            title: format!(
                "{} ({})",
                annotation.issue_type.label(),
                annotation.severity.label()
            ),
            message: &annotation.message,
            raw_details: &annotation.link,
        }
    }
}

fn check_output<'a>(
    title: &'static str,
    summary: &'a str,
    batch: &'a [Annotation],
) -> CheckRunOutput<'a> {
    CheckRunOutput {
        title,
        summary,
        annotations: batch.iter().map(CheckAnnotation::from).collect(),
    }
}

fn level_name(level: AnnotationLevel) -> &'static str {
    match level {
        AnnotationLevel::Notice => "notice",
        AnnotationLevel::Warning => "warning",
        AnnotationLevel::Failure => "failure",
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Deserialize)]
struct CheckRun {
    id: u64,
}

#[derive(Deserialize)]
struct IssueComment {
    id: u64,
    #[serde(default)]
    body: Option<String>,
    user: User,
}

#[derive(Deserialize)]
struct User {
    login: String,
}

pub struct GithubSession {
    client: ApiClient,
    token: AuthToken,
    repository: RepositoryIdentity,
}

pub struct GithubDecorator {
    provider: GithubAppProvider,
    limit: UploadLimit,
}

impl GithubDecorator {
    pub fn new(binding: &HostBinding) -> Result<Self> {
        let Credentials::GithubApp {
            app_id,
            private_key,
        } = &binding.credentials
        else {
            return Err(Error::configuration(
                "github requires app_id and private_key credentials",
            ));
        };
        Ok(Self {
            provider: GithubAppProvider::new(
                &binding.url,
                app_id.clone(),
                private_key,
                binding.repository.clone(),
            )?,
            limit: binding.upload_limit_or(UploadLimit::GITHUB),
        })
    }

    fn repo_url(&self, session: &GithubSession) -> String {
        format!(
            "{}/repos/{}/{}",
            self.provider.api_url(),
            session.repository.owner,
            session.repository.name
        )
    }

    /// The installation token is only used while it is still valid.
    fn client<'s>(&self, session: &'s GithubSession) -> Result<&'s ApiClient> {
        if session.token.is_expired(Utc::now()) {
            return Err(Error::configuration(
                "installation token expired before decoration finished",
            ));
        }
        Ok(&session.client)
    }
}

#[async_trait]
impl Decorator for GithubDecorator {
    type Session = GithubSession;

    fn platform(&self) -> &'static str {
        "github"
    }

    fn upload_limit(&self) -> UploadLimit {
        self.limit
    }

    async fn authenticate(&self) -> Result<GithubSession> {
        let token = self.provider.acquire().await?;
        let repository = token.repository().cloned().ok_or_else(|| {
            Error::configuration("installation token carries no repository identity")
        })?;
        let client = ApiClient::new(Auth::Bearer(token.value().to_string()))?
            .with_accept(GITHUB_ACCEPT);
        Ok(GithubSession {
            client,
            token,
            repository,
        })
    }

    #[instrument(skip_all, fields(commit = %publication.analysis.commit_sha))]
    async fn publish(&self, session: &GithubSession, publication: &Publication<'_>) -> Result<()> {
        let client = self.client(session)?;
        let analysis = publication.analysis;
        let report = &publication.report;
        let title = if report.gate.passed() {
            "Quality Gate success"
        } else {
            "Quality Gate failed"
        };
        let mut batches = publication.batches.iter();
        let first = batches.next().map(Vec::as_slice).unwrap_or_default();
        let check_runs_url = format!("{}/check-runs", self.repo_url(session));

        let created: CheckRun = client
            .post_json(
                &check_runs_url,
                &CreateCheckRun {
                    name: format!("{} {} Results", analysis.project_name, report.title),
                    head_sha: &analysis.commit_sha,
                    status: "completed",
                    conclusion: if report.gate.passed() { "success" } else { "failure" },
                    details_url: &report.dashboard_url,
                    external_id: &analysis.analysis_id,
                    started_at: timestamp(analysis.analysed_at),
                    completed_at: timestamp(Utc::now()),
                    output: check_output(title, &publication.summary, first),
                },
            )
            .await?;
        debug!(check_run = created.id, annotations = first.len(), "check run created");

        let update_url = format!("{check_runs_url}/{}", created.id);
        for batch in batches {
            let client = self.client(session)?;
            client
                .patch_json::<_, serde_json::Value>(
                    &update_url,
                    &UpdateCheckRun {
                        output: check_output(title, &publication.summary, batch),
                    },
                )
                .await?;
            debug!(check_run = created.id, annotations = batch.len(), "check run updated");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(pull_request = %publication.analysis.pull_request_id))]
    async fn reconcile_summary(&self, session: &GithubSession, publication: &Publication<'_>) -> Result<()> {
        let client = self.client(session)?;
        let repo_url = self.repo_url(session);
        let comments_url = format!(
            "{repo_url}/issues/{}/comments",
            publication.analysis.pull_request_id
        );

        let posted: IssueComment = client
            .post_json(&comments_url, &serde_json::json!({ "body": publication.summary }))
            .await?;

        let comments =
            collect_all::<Vec<IssueComment>>(client, &format!("{comments_url}?per_page=100")).await?;
        let stale: Vec<&IssueComment> = comments
            .iter()
            .filter(|c| c.id != posted.id && c.user.login == posted.user.login)
            .filter(|c| {
                c.body
                    .as_deref()
                    .is_some_and(|body| is_summary_of(body, &publication.analysis.project_key))
            })
            .collect();

        for comment in &stale {
            self.client(session)?
                .delete(&format!("{repo_url}/issues/comments/{}", comment.id))
                .await?;
        }
        info!(comment = posted.id, removed = stale.len(), "summary comment posted");
        Ok(())
    }

    fn pull_request_url(&self, session: &GithubSession, analysis: &AnalysisResult) -> String {
        format!(
            "{}/pull/{}",
            session.repository.html_url.trim_end_matches('/'),
            analysis.pull_request_id
        )
    }
}
