use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Method, Url};
use serde::Serialize;
use tracing::{debug, info, instrument};

use super::{LinkStyle, ReportData, ignore_missing, report_data, severity_name, type_name};
use crate::assemble::Annotation;
use crate::auth::StaticTokenProvider;
use crate::batch::UploadLimit;
use crate::binding::HostBinding;
use crate::decorator::{Decorator, Publication};
use crate::error::Result;
use crate::http::{ApiClient, Auth};
use crate::model::AnalysisResult;

const CLOUD_API_HOST: &str = "api.bitbucket.org";
const CLOUD_WEB_URL: &str = "https://bitbucket.org";

#[derive(Serialize)]
struct Report<'a> {
    title: &'a str,
    details: &'a str,
    result: &'static str,
    reporter: &'a str,
    created_on: String,
    link: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    logo_url: Option<&'a str>,
    report_type: &'static str,
    remote_link_enabled: bool,
    data: Vec<ReportData>,
}

#[derive(Serialize)]
struct CloudAnnotation<'a> {
    external_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    link: &'a str,
    summary: &'a str,
    path: &'a str,
    severity: &'static str,
    annotation_type: &'static str,
}

impl<'a> From<&'a Annotation> for CloudAnnotation<'a> {
    fn from(annotation: &'a Annotation) -> Self {
        Self {
            external_id: &annotation.external_id,
            line: annotation.line,
            link: &annotation.link,
            summary: &annotation.message,
            path: &annotation.path,
            severity: severity_name(annotation.severity),
            annotation_type: type_name(annotation.issue_type),
        }
    }
}

#[derive(Serialize)]
struct BuildStatus<'a> {
    state: &'static str,
    key: &'a str,
    name: &'a str,
    url: &'a str,
    description: &'static str,
}

pub struct CloudSession {
    client: ApiClient,
}

pub struct BitbucketCloudDecorator {
    api_url: String,
    workspace: String,
    repository: String,
    token: String,
    report_key: String,
    pull_request_id: String,
    limit: UploadLimit,
}

impl BitbucketCloudDecorator {
    pub fn new(
        binding: &HostBinding,
        report_key: impl Into<String>,
        pull_request_id: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            api_url: binding.base_url().to_string(),
            workspace: binding.project()?.to_string(),
            repository: binding.repository.clone(),
            token: binding.token()?.to_string(),
            report_key: report_key.into(),
            pull_request_id: pull_request_id.into(),
            limit: binding.upload_limit_or(UploadLimit::BITBUCKET_CLOUD),
        })
    }

    fn repo_url(&self) -> String {
        format!(
            "{}/repositories/{}/{}",
            self.api_url, self.workspace, self.repository
        )
    }

    fn report_url(&self, commit: &str) -> String {
        format!("{}/commit/{commit}/reports/{}", self.repo_url(), self.report_key)
    }

    /// Browser root matching the configured API root.
    fn web_url(&self) -> String {
        match Url::parse(&self.api_url) {
            Ok(url) if url.host_str() == Some(CLOUD_API_HOST) => CLOUD_WEB_URL.to_string(),
            Ok(url) => url.origin().ascii_serialization(),
            Err(_) => CLOUD_WEB_URL.to_string(),
        }
    }
}

#[async_trait]
impl Decorator for BitbucketCloudDecorator {
    type Session = CloudSession;

    fn platform(&self) -> &'static str {
        "bitbucket-cloud"
    }

    fn upload_limit(&self) -> UploadLimit {
        self.limit
    }

    async fn authenticate(&self) -> Result<CloudSession> {
        let client = ApiClient::new(Auth::Bearer(self.token.clone()))?;
        StaticTokenProvider::new(client.clone(), self.token.clone(), self.repo_url())
            .validate::<serde_json::Value>()
            .await?;
        Ok(CloudSession { client })
    }

    async fn clean_up(&self, session: &CloudSession, analysis: &AnalysisResult) -> Result<()> {
        ignore_missing(session.client.delete(&self.report_url(&analysis.commit_sha)).await)?;
        debug!("previous report removed");
        Ok(())
    }

    #[instrument(skip_all, fields(commit = %publication.analysis.commit_sha))]
    async fn publish(&self, session: &CloudSession, publication: &Publication<'_>) -> Result<()> {
        let analysis = publication.analysis;
        let report = &publication.report;
        let report_url = self.report_url(&analysis.commit_sha);

        let body = Report {
            title: &report.title,
            details: &report.details,
            result: if report.gate.passed() { "PASSED" } else { "FAILED" },
            reporter: &report.reporter,
            created_on: report.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            link: &report.dashboard_url,
            logo_url: report.logo_url.as_deref(),
            report_type: "BUG",
            remote_link_enabled: true,
            data: report_data(report, LinkStyle::Cloud),
        };
        session
            .client
            .execute(Method::PUT, &report_url, Some(&body))
            .await?;

        let annotations_url = format!("{report_url}/annotations");
        for batch in &publication.batches {
            let body: Vec<CloudAnnotation> = batch.iter().map(CloudAnnotation::from).collect();
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
                &format!("{}/commit/{}/statuses/build", self.repo_url(), analysis.commit_sha),
                Some(&status),
            )
            .await?;
        info!(annotations = publication.annotation_count(), "code insights report published");
        Ok(())
    }

    fn pull_request_url(&self, _session: &CloudSession, _analysis: &AnalysisResult) -> String {
        format!(
            "{}/{}/{}/pull-requests/{}",
            self.web_url(),
            self.workspace,
            self.repository,
            self.pull_request_id
        )
    }
}
