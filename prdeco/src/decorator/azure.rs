//! Azure DevOps pull request statuses and comment threads.

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
use crate::paginate::{Page, collect_all};
use crate::summary::{is_summary_of, issue_key_of};

const API_VERSION: &str = "api-version=4.1";
const STATUS_API_VERSION: &str = "api-version=4.1-preview";

#[derive(Deserialize)]
struct Repository {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionData {
    authenticated_user: Identity,
}

#[derive(Deserialize)]
struct Identity {
    id: String,
}

#[derive(Deserialize)]
struct ThreadList {
    #[serde(default)]
    value: Vec<Thread>,
}

impl Page for ThreadList {
    type Item = Thread;

    fn into_items(self) -> Vec<Thread> {
        self.value
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Thread {
    id: u64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    comments: Vec<Comment>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Comment {
    id: u64,
    #[serde(default)]
    content: Option<String>,
    author: Identity,
    #[serde(default)]
    is_deleted: bool,
    #[serde(default)]
    comment_type: Option<String>,
}

impl Comment {
    fn is_system(&self) -> bool {
        self.comment_type.as_deref() == Some("system")
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewThread<'a> {
    comments: [NewComment<'a>; 1],
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_context: Option<ThreadContext>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewComment<'a> {
    parent_comment_id: u64,
    content: &'a str,
    comment_type: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThreadContext {
    file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    right_file_start: Option<FilePosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    right_file_end: Option<FilePosition>,
}

#[derive(Serialize, Clone, Copy)]
struct FilePosition {
    line: u32,
    offset: u32,
}

impl From<&Annotation> for ThreadContext {
    fn from(annotation: &Annotation) -> Self {
        let position = annotation.line.map(|line| FilePosition { line, offset: 1 });
        Self {
            file_path: format!("/{}", annotation.path.trim_start_matches('/')),
            right_file_start: position,
            right_file_end: position,
        }
    }
}

fn new_thread(content: &str, context: Option<ThreadContext>) -> NewThread<'_> {
    NewThread {
        comments: [NewComment {
            parent_comment_id: 0,
            content,
            comment_type: "text",
        }],
        status: "active",
        thread_context: context,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestStatus<'a> {
    state: &'static str,
    description: &'static str,
    context: StatusContext<'a>,
    target_url: &'a str,
}

#[derive(Serialize)]
struct StatusContext<'a> {
    genre: &'a str,
    name: &'static str,
}

#[derive(Clone, Copy)]
enum Retire<'k> {
    SummariesExcept(u64),
    IssuesNotIn(&'k HashSet<&'k str>),
}

#[derive(Debug, Default)]
struct Reconciled {
    retired: usize,
    kept: HashSet<String>,
}

pub struct AzureSession {
    client: ApiClient,
    pull_request_url: String,
    user_id: String,
}

pub struct AzureDecorator {
    org_url: String,
    project: String,
    repository: String,
    token: String,
    pull_request_id: String,
    limit: UploadLimit,
}

impl AzureDecorator {
    pub fn new(binding: &HostBinding, pull_request_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            org_url: binding.base_url().to_string(),
            project: binding.project()?.to_string(),
            repository: binding.repository.clone(),
            token: binding.token()?.to_string(),
            pull_request_id: pull_request_id.into(),
            limit: binding.upload_limit_or(UploadLimit::REVIEW_COMMENTS),
        })
    }

    /// Appends percent-encoded path segments to the organization URL.
    fn url(&self, segments: &[&str]) -> Result<String> {
        let mut url = Url::parse(&self.org_url)
            .map_err(|e| Error::configuration(format!("invalid azure devops url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| Error::configuration("azure devops url cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url.to_string())
    }

    /// Empties this project's bot threads selected by `retire`. Threads
    /// someone else replied to are closed instead. Issue threads whose issue
    /// is still reported are kept and their keys returned.
    async fn reconcile_threads(
        &self,
        session: &AzureSession,
        project_key: &str,
        retire: Retire<'_>,
    ) -> Result<Reconciled> {
        let threads_url = format!("{}/threads", session.pull_request_url);
        let threads =
            collect_all::<ThreadList>(&session.client, &format!("{threads_url}?{API_VERSION}")).await?;

        let mut outcome = Reconciled::default();
        for thread in &threads {
            let live: Vec<&Comment> = thread.comments.iter().filter(|c| !c.is_deleted).collect();
            let Some(first) = live.first() else {
                continue;
            };
            if first.author.id != session.user_id {
                continue;
            }
            let body = first.content.as_deref().unwrap_or_default();
            match retire {
                Retire::SummariesExcept(posted) => {
                    if thread.id == posted || !is_summary_of(body, project_key) {
                        continue;
                    }
                }
                Retire::IssuesNotIn(open) => match issue_key_of(body, project_key) {
                    None => continue,
                    Some(key) if open.contains(key) => {
                        outcome.kept.insert(key.to_string());
                        continue;
                    }
                    Some(_) => {}
                },
            }

            let answered = live
                .iter()
                .any(|c| !c.is_system() && c.author.id != session.user_id);
            if answered {
                if thread.status.as_deref() != Some("closed") {
                    session
                        .client
                        .execute(
                            Method::PATCH,
                            &format!("{threads_url}/{}?{API_VERSION}", thread.id),
                            Some(&serde_json::json!({ "status": "closed" })),
                        )
                        .await?;
                    outcome.retired += 1;
                }
            } else {
                for comment in live.iter().filter(|c| c.author.id == session.user_id) {
                    session
                        .client
                        .delete(&format!(
                            "{threads_url}/{}/comments/{}?{API_VERSION}",
                            thread.id, comment.id
                        ))
                        .await?;
                }
                outcome.retired += 1;
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl Decorator for AzureDecorator {
    type Session = AzureSession;

    fn platform(&self) -> &'static str {
        "azure"
    }

    fn upload_limit(&self) -> UploadLimit {
        self.limit
    }

    async fn authenticate(&self) -> Result<AzureSession> {
        let client = ApiClient::new(Auth::Basic {
            username: String::new(),
            password: self.token.clone(),
        })?;
        let probe = format!(
            "{}?{API_VERSION}",
            self.url(&[self.project.as_str(), "_apis", "git", "repositories", self.repository.as_str()])?
        );
        let (_, repository) = StaticTokenProvider::new(client.clone(), self.token.clone(), probe)
            .validate::<Repository>()
            .await?;

        let connection: ConnectionData = client
            .get_json(&format!("{}?{API_VERSION}-preview", self.url(&["_apis", "ConnectionData"])?))
            .await?;

        let pull_request_url = self.url(&[
            self.project.as_str(),
            "_apis",
            "git",
            "repositories",
            repository.id.as_str(),
            "pullRequests",
            self.pull_request_id.as_str(),
        ])?;
        Ok(AzureSession {
            client,
            pull_request_url,
            user_id: connection.authenticated_user.id,
        })
    }

    #[instrument(skip_all, fields(commit = %publication.analysis.commit_sha))]
    async fn publish(&self, session: &AzureSession, publication: &Publication<'_>) -> Result<()> {
        let open: HashSet<&str> = publication
            .annotations()
            .map(|a| a.external_id.as_str())
            .collect();
        let previous = self
            .reconcile_threads(
                session,
                &publication.analysis.project_key,
                Retire::IssuesNotIn(&open),
            )
            .await?;
        debug!(
            retired = previous.retired,
            kept = previous.kept.len(),
            "previous issue threads reconciled"
        );

        let report = &publication.report;
        let status = PullRequestStatus {
            state: if report.gate.passed() { "succeeded" } else { "failed" },
            description: report.headline(),
            context: StatusContext {
                genre: &report.title,
                name: "QualityGate",
            },
            target_url: &report.dashboard_url,
        };
        session
            .client
            .execute(
                Method::POST,
                &format!("{}/statuses?{STATUS_API_VERSION}", session.pull_request_url),
                Some(&status),
            )
            .await?;

        let threads_url = format!("{}/threads?{API_VERSION}", session.pull_request_url);
        for batch in &publication.batches {
            for annotation in batch.iter().filter(|a| !previous.kept.contains(&a.external_id)) {
                let body = publication.issue_body(annotation);
                session
                    .client
                    .execute(
                        Method::POST,
                        &threads_url,
                        Some(&new_thread(&body, Some(ThreadContext::from(annotation)))),
                    )
                    .await?;
            }
            debug!(annotations = batch.len(), "annotation batch posted");
        }
        Ok(())
    }

    async fn reconcile_summary(&self, session: &AzureSession, publication: &Publication<'_>) -> Result<()> {
        let posted: Thread = session
            .client
            .post_json(
                &format!("{}/threads?{API_VERSION}", session.pull_request_url),
                &new_thread(&publication.summary, None),
            )
            .await?;
        let previous = self
            .reconcile_threads(
                session,
                &publication.analysis.project_key,
                Retire::SummariesExcept(posted.id),
            )
            .await?;
        info!(thread = posted.id, retired = previous.retired, "summary thread posted");
        Ok(())
    }

    fn pull_request_url(&self, _session: &AzureSession, _analysis: &AnalysisResult) -> String {
        self.url(&[self.project.as_str(), "_git", self.repository.as_str(), "pullrequest", self.pull_request_id.as_str()])
            .unwrap_or_else(|_| {
                format!(
                    "{}/{}/_git/{}/pullrequest/{}",
                    self.org_url, self.project, self.repository, self.pull_request_id
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::AnnotationLevel;
    use crate::binding::{Credentials, Platform};
    use crate::model::{IssueType, Severity};
    use serde_json::json;

    fn decorator() -> AzureDecorator {
        let binding = HostBinding {
            platform: Platform::Azure,
            url: "https://dev.azure.com/acme/".into(),
            project: Some("Web Platform".into()),
            repository: "portal".into(),
            credentials: Credentials::Token { token: "pat".into() },
            summary_comment: true,
            upload_limit: None,
        };
        AzureDecorator::new(&binding, "31").unwrap()
    }

    fn annotation(line: Option<u32>) -> Annotation {
        Annotation {
            external_id: "k".into(),
            path: "src/app.ts".into(),
            line,
            severity: Severity::Low,
            level: AnnotationLevel::Notice,
            issue_type: IssueType::CodeSmell,
            message: "rename".into(),
            link: "https://sonar/i".into(),
        }
    }

    #[test]
    fn urls_encode_project_names() {
        let decorator = decorator();
        assert_eq!(
            decorator.url(&[decorator.project.as_str(), "_apis"]).unwrap(),
            "https://dev.azure.com/acme/Web%20Platform/_apis"
        );
    }

    #[test]
    fn thread_context_positions_on_the_right_side() {
        let wire = serde_json::to_value(new_thread("body", Some(ThreadContext::from(&annotation(Some(9)))))).unwrap();
        assert_eq!(
            wire,
            json!({
                "comments": [{"parentCommentId": 0, "content": "body", "commentType": "text"}],
                "status": "active",
                "threadContext": {
                    "filePath": "/src/app.ts",
                    "rightFileStart": {"line": 9, "offset": 1},
                    "rightFileEnd": {"line": 9, "offset": 1}
                }
            })
        );
    }

    #[test]
    fn lineless_annotation_is_a_file_level_thread() {
        let context = serde_json::to_value(ThreadContext::from(&annotation(None))).unwrap();
        assert_eq!(context, json!({"filePath": "/src/app.ts"}));
    }

    #[test]
    fn pull_request_url_is_the_web_view() {
        let decorator = decorator();
        let session = AzureSession {
            client: ApiClient::new(Auth::None).unwrap(),
            pull_request_url: String::new(),
            user_id: String::new(),
        };
        let analysis: AnalysisResult = serde_json::from_value(json!({
            "project_key": "p", "project_name": "P", "analysis_id": "a",
            "commit_sha": "c", "pull_request_id": "31", "quality_gate": "OK",
            "server_url": "https://sonar", "analysed_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(
            decorator.pull_request_url(&session, &analysis),
            "https://dev.azure.com/acme/Web%20Platform/_git/portal/pullrequest/31"
        );
    }
}
