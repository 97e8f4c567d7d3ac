//! Per-host decorators and the orchestrator that sequences them.

pub mod azure;
pub mod bitbucket;
pub mod github;
pub mod gitlab;

use std::future::Future;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::assemble::{Annotation, Assembler, ReportSummary};
use crate::batch::{UploadLimit, batch};
use crate::error::{Error, Result};
use crate::model::{AnalysisResult, DecorationResult};
use crate::selection::SelectionPolicy;
use crate::settings::DecorationSettings;
use crate::summary::{Formatter, MarkdownFormatter};

/// Everything a decorator uploads during one run.
pub struct Publication<'a> {
    pub analysis: &'a AnalysisResult,
    pub report: ReportSummary,
    /// Rendered pull request summary.
    pub summary: String,
    pub batches: Vec<Vec<Annotation>>,
    assembler: Assembler<'a>,
    formatter: &'a dyn Formatter,
}

impl Publication<'_> {
    /// Rendered review comment for one annotation.
    pub fn issue_body(&self, annotation: &Annotation) -> String {
        self.formatter.format(&self.assembler.issue_document(annotation))
    }

    pub fn annotation_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.batches.iter().flatten()
    }
}

/// One host integration, driven step by step by [`Orchestrator`].
#[async_trait]
pub trait Decorator: Send + Sync {
    /// State learned while authenticating and reused by later steps.
    type Session: Send + Sync;

    fn platform(&self) -> &'static str;

    fn upload_limit(&self) -> UploadLimit;

    async fn authenticate(&self) -> Result<Self::Session>;

    /// Checks the stored credentials without touching the pull request.
    async fn verify_credentials(&self) -> Result<()> {
        self.authenticate().await.map(drop)
    }

    /// False when the host cannot display decorations at all.
    fn supports_decoration(&self, _session: &Self::Session) -> bool {
        true
    }

    /// Removes what earlier runs published for this commit.
    async fn clean_up(&self, _session: &Self::Session, _analysis: &AnalysisResult) -> Result<()> {
        Ok(())
    }

    async fn publish(&self, session: &Self::Session, publication: &Publication<'_>) -> Result<()>;

    /// Posts a fresh summary comment and removes stale ones.
    async fn reconcile_summary(
        &self,
        _session: &Self::Session,
        _publication: &Publication<'_>,
    ) -> Result<()> {
        Ok(())
    }

    fn pull_request_url(&self, session: &Self::Session, analysis: &AnalysisResult) -> String;
}

async fn step<T>(name: &'static str, work: impl Future<Output = Result<T>>) -> Result<T> {
    match work.await {
        Ok(value) => {
            debug!(step = name, "step complete");
            Ok(value)
        }
        Err(e) => {
            warn!(step = name, error = %e, "step failed");
            Err(e)
        }
    }
}

pub struct Orchestrator<'a> {
    settings: &'a DecorationSettings,
    policy: SelectionPolicy,
    formatter: Box<dyn Formatter>,
    summary_comment: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(settings: &'a DecorationSettings) -> Self {
        Self {
            settings,
            policy: SelectionPolicy::from_settings(&settings.selection),
            formatter: Box::new(MarkdownFormatter),
            summary_comment: true,
        }
    }

    pub fn with_formatter(mut self, formatter: impl Formatter + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    pub fn with_summary_comment(mut self, enabled: bool) -> Self {
        self.summary_comment = enabled;
        self
    }

    /// Runs every step in order. Any failure aborts the run and comes back
    /// as a single [`Error::Decoration`].
    pub async fn run<D: Decorator>(
        &self,
        decorator: &D,
        analysis: &AnalysisResult,
    ) -> Result<DecorationResult> {
        self.run_steps(decorator, analysis)
            .await
            .map_err(|e| Error::Decoration {
                platform: decorator.platform(),
                source: Box::new(e),
            })
    }

    #[instrument(
        skip_all,
        fields(
            platform = decorator.platform(),
            project = %analysis.project_key,
            pull_request = %analysis.pull_request_id,
        )
    )]
    async fn run_steps<D: Decorator>(
        &self,
        decorator: &D,
        analysis: &AnalysisResult,
    ) -> Result<DecorationResult> {
        let session = step("authenticate", decorator.authenticate()).await?;

        if !decorator.supports_decoration(&session) {
            info!("host cannot display decorations, skipping");
            return Ok(DecorationResult {
                url: decorator.pull_request_url(&session, analysis),
                published: false,
            });
        }

        step("clean_up", decorator.clean_up(&session, analysis)).await?;

        let publication = step("assemble", async {
            self.assemble(analysis, decorator.upload_limit())
        })
        .await?;

        step("publish", decorator.publish(&session, &publication)).await?;

        if self.summary_comment {
            step(
                "summary",
                decorator.reconcile_summary(&session, &publication),
            )
            .await?;
        }

        let url = decorator.pull_request_url(&session, analysis);
        info!(%url, annotations = publication.annotation_count(), "decoration complete");
        Ok(DecorationResult {
            url,
            published: true,
        })
    }

    fn assemble<'p>(
        &'p self,
        analysis: &'p AnalysisResult,
        limit: UploadLimit,
    ) -> Result<Publication<'p>> {
        let assembler = Assembler::new(analysis, self.settings);
        let selected = self.policy.select(&analysis.issues);
        let annotations = assembler.annotations(&selected)?;

        let available = annotations.len();
        let batches = batch(annotations, limit);
        let kept: usize = batches.iter().map(Vec::len).sum();
        if kept < available {
            info!(
                available,
                kept,
                total_cap = limit.total_cap,
                "annotations beyond the upload cap dropped"
            );
        }

        Ok(Publication {
            analysis,
            report: assembler.report(),
            summary: self.formatter.format(&assembler.summary_document()),
            batches,
            assembler,
            formatter: self.formatter.as_ref(),
        })
    }
}
