//! GitLab merge request discussions and commit statuses.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{Decorator, Publication};
use crate::assemble::Annotation;
use crate::auth::StaticTokenProvider;
use crate::batch::UploadLimit;
use crate::binding::HostBinding;
use crate::error::{Error, Result};
use crate::http::{ApiClient, Auth};
use crate::model::AnalysisResult;
use crate::paginate::collect_all;
use crate::summary::{is_summary_of, issue_key_of};

#[derive(Deserialize)]
struct Project {
    id: u64,
}

#[derive(Deserialize)]
struct User {
    id: u64,
}

#[derive(Deserialize)]
struct MergeRequest {
    web_url: String,
    #[serde(default)]
    diff_refs: Option<DiffRefs>,
}

#[derive(Deserialize, Clone)]
struct DiffRefs {
    base_sha: String,
    start_sha: String,
    head_sha: String,
}

#[derive(Deserialize)]
struct Discussion {
    id: String,
    #[serde(default)]
    notes: Vec<Note>,
}

#[derive(Deserialize)]
struct Note {
    id: u64,
    #[serde(default)]
    body: String,
    author: User,
    #[serde(default)]
    system: bool,
    #[serde(default)]
    resolved: bool,
}

#[derive(Serialize)]
struct CommitStatus<'a> {
    state: &'static str,
    name: &'a str,
    target_url: &'a str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    coverage: Option<f64>,
}

#[derive(Serialize)]
struct NewDiscussion<'a> {
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<Position<'a>>,
}

#[derive(Serialize)]
struct Position<'a> {
    position_type: &'static str,
    base_sha: &'a str,
    start_sha: &'a str,
    head_sha: &'a str,
    old_path: &'a str,
    new_path: &'a str,
    new_line: u32,
}

/// Which bot discussions a reconciliation pass retires.
#[derive(Clone, Copy)]
enum Retire<'k> {
    /// Summaries other than the discussion just posted.
    SummariesExcept(&'k str),
    /// Issue discussions whose issue is no longer reported.
    IssuesNotIn(&'k HashSet<&'k str>),
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default)]
struct Reconciled {
    retired: usize,
    /// Issue keys whose discussion was left in place.
    kept: HashSet<String>,
}

pub struct GitlabSession {
    client: ApiClient,
    project_url: String,
    user_id: u64,
    merge_request: MergeRequest,
}

impl GitlabSession {
    fn discussions_url(&self, analysis: &AnalysisResult) -> String {
        format!(
            "{}/merge_requests/{}/discussions",
            self.project_url, analysis.pull_request_id
        )
    }
}

pub struct GitlabDecorator {
    api_url: String,
    project_path: String,
    token: String,
    merge_request_iid: String,
    limit: UploadLimit,
}

impl GitlabDecorator {
    /// `merge_request_iid` is the project-scoped merge request number.
    pub fn new(binding: &HostBinding, merge_request_iid: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api_url: binding.base_url().to_string(),
            project_path: binding.repository.clone(),
            token: binding.token()?.to_string(),
            merge_request_iid: merge_request_iid.into(),
            limit: binding.upload_limit_or(UploadLimit::REVIEW_COMMENTS),
        })
    }

    /// `{api}/projects/{group%2Fproject}`
    fn project_path_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| Error::configuration(format!("invalid gitlab url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| Error::configuration("gitlab url cannot be a base"))?
            .pop_if_empty()
            .push("projects")
            .push(&self.project_path);
        Ok(url.to_string())
    }

    async fn probe(&self) -> Result<(ApiClient, Project)> {
        let client = ApiClient::new(Auth::PrivateToken(self.token.clone()))?;
        let provider =
            StaticTokenProvider::new(client.clone(), self.token.clone(), self.project_path_url()?);
        let (_, project) = provider.validate::<Project>().await?;
        Ok((client, project))
    }

    /// Removes this project's bot discussions selected by `retire`.
    /// Discussions someone else replied to are resolved instead.
    async fn reconcile_discussions(
        &self,
        session: &GitlabSession,
        analysis: &AnalysisResult,
        retire: Retire<'_>,
    ) -> Result<Reconciled> {
        let url = session.discussions_url(analysis);
        let discussions =
            collect_all::<Vec<Discussion>>(&session.client, &format!("{url}?per_page=100")).await?;

        let mut outcome = Reconciled::default();
        for discussion in &discussions {
            let Some(first) = discussion.notes.first() else {
                continue;
            };
            if first.author.id != session.user_id {
                continue;
            }
            match retire {
                Retire::SummariesExcept(posted) => {
                    if discussion.id == posted || !is_summary_of(&first.body, &analysis.project_key) {
                        continue;
                    }
                }
                Retire::IssuesNotIn(open) => match issue_key_of(&first.body, &analysis.project_key) {
                    None => continue,
                    Some(key) if open.contains(key) => {
                        outcome.kept.insert(key.to_string());
                        continue;
                    }
                    Some(_) => {}
                },
            }
            let answered = discussion
                .notes
                .iter()
                .any(|n| !n.system && n.author.id != session.user_id);
            if answered {
                if !first.resolved {
                    session
                        .client
                        .execute(
                            Method::PUT,
                            &format!("{url}/{}?resolved=true", discussion.id),
                            None::<&()>,
                        )
                        .await?;
                    outcome.retired += 1;
                }
            } else {
                for note in discussion.notes.iter().filter(|n| n.author.id == session.user_id) {
                    session
                        .client
                        .delete(&format!("{url}/{}/notes/{}", discussion.id, note.id))
                        .await?;
                }
                outcome.retired += 1;
            }
        }
        Ok(outcome)
    }

    async fn post_issue(
        &self,
        session: &GitlabSession,
        publication: &Publication<'_>,
        annotation: &Annotation,
    ) -> Result<bool> {
        let (Some(refs), Some(line)) = (&session.merge_request.diff_refs, annotation.line) else {
            return Ok(false);
        };
        let body = publication.issue_body(annotation);
        let discussion = NewDiscussion {
            body: &body,
            position: Some(Position {
                position_type: "text",
                base_sha: &refs.base_sha,
                start_sha: &refs.start_sha,
                head_sha: &refs.head_sha,
                old_path: &annotation.path,
                new_path: &annotation.path,
                new_line: line,
            }),
        };
        session
            .client
            .execute(
                Method::POST,
                &session.discussions_url(publication.analysis),
                Some(&discussion),
            )
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl Decorator for GitlabDecorator {
    type Session = GitlabSession;

    fn platform(&self) -> &'static str {
        "gitlab"
    }

    fn upload_limit(&self) -> UploadLimit {
        self.limit
    }

    async fn authenticate(&self) -> Result<GitlabSession> {
        let (client, project) = self.probe().await?;

        let project_url = format!("{}/projects/{}", self.api_url, project.id);
        let user: User = client.get_json(&format!("{}/user", self.api_url)).await?;
        let merge_request: MergeRequest = client
            .get_json(&format!(
                "{project_url}/merge_requests/{}",
                self.merge_request_iid
            ))
            .await?;

        Ok(GitlabSession {
            client,
            project_url,
            user_id: user.id,
            merge_request,
        })
    }

    #[instrument(skip_all, fields(commit = %publication.analysis.commit_sha))]
    async fn publish(&self, session: &GitlabSession, publication: &Publication<'_>) -> Result<()> {
        let analysis = publication.analysis;
        let open: HashSet<&str> = publication
            .annotations()
            .map(|a| a.external_id.as_str())
            .collect();
        let previous = self
            .reconcile_discussions(session, analysis, Retire::IssuesNotIn(&open))
            .await?;
        debug!(
            retired = previous.retired,
            kept = previous.kept.len(),
            "previous issue discussions reconciled"
        );

        let report = &publication.report;
        let status = CommitStatus {
            state: if report.gate.passed() { "success" } else { "failed" },
            name: &report.title,
            target_url: &report.dashboard_url,
            description: report.headline(),
            coverage: report.coverage,
        };
        session
            .client
            .execute(
                Method::POST,
                &format!("{}/statuses/{}", session.project_url, analysis.commit_sha),
                Some(&status),
            )
            .await?;

        let mut skipped = 0usize;
        for batch in &publication.batches {
            for annotation in batch {
                if previous.kept.contains(&annotation.external_id) {
                    continue;
                }
                if !self.post_issue(session, publication, annotation).await? {
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            info!(skipped, "annotations without a diff position not posted");
        }
        Ok(())
    }

    async fn reconcile_summary(&self, session: &GitlabSession, publication: &Publication<'_>) -> Result<()> {
        let analysis = publication.analysis;
        let posted: Discussion = session
            .client
            .post_json(
                &session.discussions_url(analysis),
                &NewDiscussion {
                    body: &publication.summary,
                    position: None,
                },
            )
            .await?;
        let previous = self
            .reconcile_discussions(session, analysis, Retire::SummariesExcept(&posted.id))
            .await?;
        info!(discussion = %posted.id, retired = previous.retired, "summary discussion posted");
        Ok(())
    }

    async fn verify_credentials(&self) -> Result<()> {
        self.probe().await.map(drop)
    }

    fn pull_request_url(&self, session: &GitlabSession, _analysis: &AnalysisResult) -> String {
        session.merge_request.web_url.clone()
    }
}
