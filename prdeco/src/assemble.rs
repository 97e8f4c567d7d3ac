//! Maps selected issues and analysis metrics into host-neutral payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{AnalysisResult, Issue, IssueType, QualityGateStatus, Severity};
use crate::settings::DecorationSettings;
use crate::summary::{Block, Document, Inline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationLevel {
    Notice,
    Warning,
    Failure,
}

pub fn annotation_level(severity: Severity) -> AnnotationLevel {
    match severity {
        Severity::Info | Severity::Low => AnnotationLevel::Notice,
        Severity::Medium => AnnotationLevel::Warning,
        Severity::High | Severity::Blocker => AnnotationLevel::Failure,
    }
}

/// Maximum severity of an issue; an issue without any is a contract violation.
pub fn effective_severity(issue: &Issue) -> Result<Severity> {
    issue
        .severity()
        .ok_or_else(|| Error::contract(format!("issue {} carries no severity", issue.key)))
}

/// One line-level finding ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub external_id: String,
    pub path: String,
    /// `None` means the finding has no position, which is not line 0.
    pub line: Option<u32>,
    pub severity: Severity,
    pub level: AnnotationLevel,
    pub issue_type: IssueType,
    pub message: String,
    pub link: String,
}

/// Report-level view of the analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub title: String,
    pub reporter: String,
    pub gate: QualityGateStatus,
    pub details: String,
    pub created_at: DateTime<Utc>,
    pub dashboard_url: String,
    pub logo_url: Option<String>,
    pub counts: BTreeMap<IssueType, usize>,
    pub total_issues: usize,
    pub coverage: Option<f64>,
    pub duplication: Option<f64>,
}

impl ReportSummary {
    pub fn headline(&self) -> &'static str {
        gate_headline(self.gate)
    }
}

fn gate_headline(gate: QualityGateStatus) -> &'static str {
    if gate.passed() {
        "Quality Gate passed"
    } else {
        "Quality Gate failed"
    }
}

/// "1 Issue" / "3 Issues".
pub fn issue_count_label(count: usize) -> String {
    if count == 1 {
        "1 Issue".to_string()
    } else {
        format!("{count} Issues")
    }
}

pub struct Assembler<'a> {
    analysis: &'a AnalysisResult,
    settings: &'a DecorationSettings,
}

impl<'a> Assembler<'a> {
    pub fn new(analysis: &'a AnalysisResult, settings: &'a DecorationSettings) -> Self {
        Self { analysis, settings }
    }

    /// Builds annotations in selection order. Issues without a path are
    /// left out here but still counted by [`Assembler::report`].
    pub fn annotations(&self, issues: &[&Issue]) -> Result<Vec<Annotation>> {
        let mut annotations = Vec::with_capacity(issues.len());
        let mut pathless = 0usize;
        for issue in issues {
            let severity = effective_severity(issue)?;
            let Some(path) = issue.path.as_ref() else {
                pathless += 1;
                continue;
            };
            annotations.push(Annotation {
                external_id: issue.key.clone(),
                path: path.clone(),
                line: issue.line,
                severity,
                level: annotation_level(severity),
                issue_type: issue.issue_type,
                message: issue.message.clone(),
                link: self.analysis.issue_url(&issue.key),
            });
        }
        if pathless > 0 {
            debug!(pathless, "issues without a file path left out of annotations");
        }
        Ok(annotations)
    }

    pub fn report(&self) -> ReportSummary {
        let counts = IssueType::ALL
            .iter()
            .map(|t| (*t, self.analysis.count_of(*t)))
            .collect();
        let mut details = gate_headline(self.analysis.quality_gate).to_string();
        for condition in &self.analysis.failed_conditions {
            details.push('\n');
            details.push_str(condition);
        }
        ReportSummary {
            title: self.settings.tool_name.clone(),
            reporter: self.settings.tool_name.clone(),
            gate: self.analysis.quality_gate,
            details,
            created_at: self.analysis.analysed_at,
            dashboard_url: self.analysis.dashboard_url(),
            logo_url: self.settings.logo_url.clone(),
            counts,
            total_issues: self.analysis.issues.len(),
            coverage: self.analysis.new_coverage,
            duplication: self.analysis.new_duplication,
        }
    }

    /// Pull request summary comment, ending with the project marker.
    pub fn summary_document(&self) -> Document {
        let report = self.report();
        let mut doc = Document::new().push(Block::Heading {
            level: 3,
            content: vec![Inline::Text(report.headline().to_string())],
        });

        if !self.analysis.failed_conditions.is_empty() {
            doc = doc
                .push(Block::Paragraph(vec![Inline::Bold("Failed conditions".into())]))
                .push(Block::BulletList(
                    self.analysis
                        .failed_conditions
                        .iter()
                        .map(|c| vec![Inline::Text(c.clone())])
                        .collect(),
                ));
        }

        doc = doc
            .push(Block::Paragraph(vec![Inline::Bold(issue_count_label(
                report.total_issues,
            ))]))
            .push(Block::BulletList(
                report
                    .counts
                    .iter()
                    .map(|(t, n)| vec![Inline::Text(format!("{}: {n}", t.label()))])
                    .collect(),
            ));

        let mut metrics = Vec::new();
        if let Some(coverage) = report.coverage {
            metrics.push(vec![Inline::Text(format!("Coverage on new code: {coverage:.1}%"))]);
        }
        if let Some(duplication) = report.duplication {
            metrics.push(vec![Inline::Text(format!(
                "Duplication on new code: {duplication:.1}%"
            ))]);
        }
        if !metrics.is_empty() {
            doc = doc.push(Block::BulletList(metrics));
        }

        doc.push(Block::Paragraph(vec![Inline::Link {
            text: format!("View in {}", self.settings.tool_name),
            url: report.dashboard_url,
        }]))
        .push(Block::Paragraph(vec![
            Inline::Bold("Project ID:".into()),
            Inline::Text(format!(" {}", self.analysis.project_key)),
        ]))
    }

    /// Review comment for one annotation, ending with the issue marker.
    pub fn issue_document(&self, annotation: &Annotation) -> Document {
        Document::new()
            .push(Block::Paragraph(vec![
                Inline::Bold(annotation.issue_type.label().into()),
                Inline::Text(format!(
                    " ({}): {}",
                    annotation.severity.label(),
                    annotation.message
                )),
            ]))
            .push(Block::Paragraph(vec![Inline::Link {
                text: format!("View in {}", self.settings.tool_name),
                url: annotation.link.clone(),
            }]))
            .push(Block::Paragraph(vec![
                Inline::Bold("Project ID:".into()),
                Inline::Text(format!(" {} | ", self.analysis.project_key)),
                Inline::Bold("Issue Key:".into()),
                Inline::Text(format!(" {}", annotation.external_id)),
            ]))
    }
}
