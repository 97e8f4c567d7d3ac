//! Bitbucket Code Insights reports, shared by Server and Cloud.

pub mod cloud;
pub mod server;

use reqwest::StatusCode;
use serde::Serialize;

pub use cloud::BitbucketCloudDecorator;
pub use server::BitbucketServerDecorator;

use crate::assemble::{ReportSummary, issue_count_label};
use crate::error::Result;
use crate::model::{IssueType, Severity};

/// Value of one report data item, tagged with its `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum DataValue {
    #[serde(rename = "LINK")]
    Link { linktext: String, href: String },
    #[serde(rename = "LINK")]
    CloudLink { text: String, href: String },
    #[serde(rename = "TEXT")]
    Text(String),
    #[serde(rename = "PERCENTAGE")]
    Percentage(f64),
}

impl DataValue {
    pub fn kind(&self) -> &'static str {
        match self {
            DataValue::Link { .. } | DataValue::CloudLink { .. } => "LINK",
            DataValue::Text(_) => "TEXT",
            DataValue::Percentage(_) => "PERCENTAGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportData {
    pub title: String,
    #[serde(flatten)]
    pub value: DataValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStyle {
    Server,
    Cloud,
}

/// The six data items shown on a report; Bitbucket accepts no more.
pub fn report_data(report: &ReportSummary, style: LinkStyle) -> Vec<ReportData> {
    let count = |types: &[IssueType]| {
        let n: usize = types
            .iter()
            .map(|t| report.counts.get(t).copied().unwrap_or(0))
            .sum();
        DataValue::Text(issue_count_label(n))
    };
    let text = "Go to analysis".to_string();
    let href = report.dashboard_url.clone();
    let link = match style {
        LinkStyle::Server => DataValue::Link { linktext: text, href },
        LinkStyle::Cloud => DataValue::CloudLink { text, href },
    };

    vec![
        ReportData {
            title: "Bugs".into(),
            value: count(&[IssueType::Bug]),
        },
        ReportData {
            title: "Vulnerabilities".into(),
            value: count(&[IssueType::Vulnerability, IssueType::SecurityHotspot]),
        },
        ReportData {
            title: "Code Smells".into(),
            value: count(&[IssueType::CodeSmell]),
        },
        ReportData {
            title: "Code coverage".into(),
            value: DataValue::Percentage(report.coverage.unwrap_or(0.0)),
        },
        ReportData {
            title: "Duplication".into(),
            value: DataValue::Percentage(report.duplication.unwrap_or(0.0)),
        },
        ReportData {
            title: "Analysis details".into(),
            value: link,
        },
    ]
}

pub fn severity_name(severity: Severity) -> &'static str {
    match severity {
        Severity::Info | Severity::Low => "LOW",
        Severity::Medium => "MEDIUM",
        Severity::High | Severity::Blocker => "HIGH",
    }
}

pub fn type_name(issue_type: IssueType) -> &'static str {
    match issue_type {
        IssueType::Vulnerability | IssueType::SecurityHotspot => "VULNERABILITY",
        IssueType::Bug => "BUG",
        IssueType::CodeSmell => "CODE_SMELL",
    }
}

/// Treats a 404 as "nothing to remove".
fn ignore_missing(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => Ok(()),
        other => other,
    }
}
