use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{LinkStyle, ReportData, ignore_missing, report_data, severity_name, type_name};
use crate::assemble::Annotation;
use crate::auth::StaticTokenProvider;
use crate::batch::UploadLimit;
use crate::binding::HostBinding;
use crate::decorator::{Decorator, Publication};
use crate::error::Result;
use crate::http::{ApiClient, Auth};
use crate::model::AnalysisResult;

/// First release with the Code Insights REST API.
const CODE_INSIGHTS_SINCE: (u64, u64) = (5, 15);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    title: &'a str,
    details: &'a str,
    result: &'static str,
    reporter: &'a str,
    created_date: i64,
    link: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    logo_url: Option<&'a str>,
    data: Vec<ReportData>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerAnnotation<'a> {
    external_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    link: &'a str,
    message: &'a str,
    path: &'a str,
    severity: &'static str,
    #[serde(rename = "type")]
    annotation_type: &'static str,
}

impl<'a> From<&'a Annotation> for ServerAnnotation<'a> {
    fn from(annotation: &'a Annotation) -> Self {
        Self {
            external_id: &annotation.external_id,
            line: annotation.line,
            link: &annotation.link,
            message: &annotation.message,
            path: &annotation.path,
            severity: severity_name(annotation.severity),
            annotation_type: type_name(annotation.issue_type),
        }
    }
}

#[derive(Serialize)]
struct AnnotationBatch<'a> {
    annotations: Vec<ServerAnnotation<'a>>,
}

#[derive(Serialize)]
struct BuildStatus<'a> {
    state: &'static str,
    key: &'a str,
    name: &'a str,
    url: &'a str,
    description: &'static str,
}

#[derive(Deserialize)]
struct ApplicationProperties {
    version: String,
}

/// True for `major.minor` at or above the Code Insights release.
pub fn supports_code_insights(version: &str) -> bool {
    let mut parts = version.split('.').map(|part| {
        part.chars()
            .take_while(char::is_ascii_digit)
            .collect::<String>()
            .parse::<u64>()
            .unwrap_or(0)
    });
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    (major, minor) >= CODE_INSIGHTS_SINCE
}

pub struct ServerSession {
    client: ApiClient,
    code_insights: bool,
}

pub struct BitbucketServerDecorator {
    base_url: String,
    project: String,
    repository: String,
    token: String,
    report_key: String,
    pull_request_id: String,
    limit: UploadLimit,
}

impl BitbucketServerDecorator {
    pub fn new(
        binding: &HostBinding,
        report_key: impl Into<String>,
        pull_request_id: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            base_url: binding.base_url().to_string(),
            project: binding.project()?.to_string(),
            repository: binding.repository.clone(),
            token: binding.token()?.to_string(),
            report_key: report_key.into(),
            pull_request_id: pull_request_id.into(),
            limit: binding.upload_limit_or(UploadLimit::BITBUCKET_SERVER),
        })
    }

    fn repo_path(&self) -> String {
        format!("projects/{}/repos/{}", self.project, self.repository)
    }

    fn report_url(&self, commit: &str) -> String {
        format!(
            "{}/rest/insights/1.0/{}/commits/{commit}/reports/{}",
            self.base_url,
            self.repo_path(),
            self.report_key
        )
    }
}

#[async_trait]
impl Decorator for BitbucketServerDecorator {
    type Session = ServerSession;

    fn platform(&self) -> &'static str {
        "bitbucket-server"
    }

    fn upload_limit(&self) -> UploadLimit {
        self.limit
    }

    async fn authenticate(&self) -> Result<ServerSession> {
        let client = ApiClient::new(Auth::Bearer(self.token.clone()))?;
        let probe = format!("{}/rest/api/1.0/{}", self.base_url, self.repo_path());
        StaticTokenProvider::new(client.clone(), self.token.clone(), probe)
            .validate::<serde_json::Value>()
            .await?;

        let properties: ApplicationProperties = client
            .get_json(&format!("{}/rest/api/1.0/application-properties", self.base_url))
            .await?;
        let code_insights = supports_code_insights(&properties.version);
        if !code_insights {
            warn!(version = %properties.version, "bitbucket server predates code insights");
        }
        Ok(ServerSession {
            client,
            code_insights,
        })
    }

    fn supports_decoration(&self, session: &ServerSession) -> bool {
        session.code_insights
    }

    async fn clean_up(&self, session: &ServerSession, analysis: &AnalysisResult) -> Result<()> {
        let url = format!("{}/annotations", self.report_url(&analysis.commit_sha));
        ignore_missing(session.client.delete(&url).await)?;
        debug!("previous annotations removed");
        Ok(())
    }

    #[instrument(skip_all, fields(commit = %publication.analysis.commit_sha))]
    async fn publish(&self, session: &ServerSession, publication: &Publication<'_>) -> Result<()> {
        let analysis = publication.analysis;
        let report = &publication.report;
        let report_url = self.report_url(&analysis.commit_sha);

        let body = Report {
            title: &report.title,
            details: &report.details,
            result: if report.gate.passed() { "PASS" } else { "FAIL" },
            reporter: &report.reporter,
            created_date: report.created_at.timestamp_millis(),
            link: &report.dashboard_url,
            logo_url: report.logo_url.as_deref(),
            data: report_data(report, LinkStyle::Server),
        };
        session
            .client
            .execute(Method::PUT, &report_url, Some(&body))
            .await?;

        let annotations_url = format!("{report_url}/annotations");
        for batch in &publication.batches {
            let body = AnnotationBatch {
                annotations: batch.iter().map(ServerAnnotation::from).collect(),
            };
            session
                .client
                .execute(Method::POST, &annotations_url, Some(&body))
                .await?;
            debug!(annotations = batch.len(), "annotation batch uploaded");
        }

        let status = BuildStatus {
            state: if report.gate.passed() { "SUCCESSFUL" } else { "FAILED" },
            key: &self.report_key,
            name: &report.title,
            url: &report.dashboard_url,
            description: report.headline(),
        };
        session
            .client
            .execute(
                Method::POST,
                &format!(
                    "{}/rest/build-status/1.0/commits/{}",
                    self.base_url, analysis.commit_sha
                ),
                Some(&status),
            )
            .await?;
        info!(annotations = publication.annotation_count(), "code insights report published");
        Ok(())
    }

    fn pull_request_url(&self, _session: &ServerSession, _analysis: &AnalysisResult) -> String {
        format!(
            "{}/{}/pull-requests/{}",
            self.base_url,
            self.repo_path(),
            self.pull_request_id
        )
    }
}
