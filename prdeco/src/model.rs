use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Issue severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    #[serde(alias = "MINOR")]
    Low,
    #[serde(alias = "MAJOR")]
    Medium,
    #[serde(alias = "CRITICAL")]
    High,
    Blocker,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Info,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Blocker,
    ];

    /// Case-insensitive lookup that also accepts the legacy labels.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "INFO" => Some(Severity::Info),
            "LOW" | "MINOR" => Some(Severity::Low),
            "MEDIUM" | "MAJOR" => Some(Severity::Medium),
            "HIGH" | "CRITICAL" => Some(Severity::High),
            "BLOCKER" => Some(Severity::Blocker),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Info => "Info",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Blocker => "Blocker",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueType {
    CodeSmell,
    Bug,
    Vulnerability,
    SecurityHotspot,
}

impl IssueType {
    pub const ALL: [IssueType; 4] = [
        IssueType::CodeSmell,
        IssueType::Bug,
        IssueType::Vulnerability,
        IssueType::SecurityHotspot,
    ];

    pub fn rank(self) -> u8 {
        match self {
            IssueType::CodeSmell => 1,
            IssueType::Bug => 2,
            IssueType::Vulnerability => 3,
            IssueType::SecurityHotspot => 4,
        }
    }

    /// Accepts `CODE_SMELL`, `code smell` and `code-smell` alike.
    pub fn parse(token: &str) -> Option<Self> {
        let normalized: String = token
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        match normalized.as_str() {
            "CODE_SMELL" => Some(IssueType::CodeSmell),
            "BUG" => Some(IssueType::Bug),
            "VULNERABILITY" => Some(IssueType::Vulnerability),
            "SECURITY_HOTSPOT" => Some(IssueType::SecurityHotspot),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IssueType::CodeSmell => "Code Smell",
            IssueType::Bug => "Bug",
            IssueType::Vulnerability => "Vulnerability",
            IssueType::SecurityHotspot => "Security Hotspot",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A finding produced by the analysis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    /// One entry per quality facet the finding affects.
    #[serde(default)]
    pub severities: Vec<Severity>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    pub message: String,
}

impl Issue {
    /// Highest severity across all facets, `None` when the engine sent none.
    pub fn severity(&self) -> Option<Severity> {
        self.severities.iter().copied().max()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityGateStatus {
    #[serde(alias = "PASSED")]
    Ok,
    #[serde(alias = "FAILED")]
    Error,
}

impl QualityGateStatus {
    pub fn passed(self) -> bool {
        self == QualityGateStatus::Ok
    }
}

/// Read-only view of one analysis, supplied by the caller.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisResult {
    pub project_key: String,
    pub project_name: String,
    pub analysis_id: String,
    pub commit_sha: String,
    pub pull_request_id: String,
    pub quality_gate: QualityGateStatus,
    #[serde(default)]
    pub failed_conditions: Vec<String>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    /// Public root of the analysis server's web UI.
    pub server_url: String,
    pub analysed_at: DateTime<Utc>,
    #[serde(default)]
    pub new_coverage: Option<f64>,
    #[serde(default)]
    pub new_duplication: Option<f64>,
}

impl AnalysisResult {
    fn server_root(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    pub fn dashboard_url(&self) -> String {
        format!(
            "{}/dashboard?id={}&pullRequest={}",
            self.server_root(),
            self.project_key,
            self.pull_request_id
        )
    }

    pub fn issue_url(&self, issue_key: &str) -> String {
        format!(
            "{}/project/issues?id={}&pullRequest={}&issues={issue_key}&open={issue_key}",
            self.server_root(),
            self.project_key,
            self.pull_request_id
        )
    }

    pub fn count_of(&self, issue_type: IssueType) -> usize {
        self.issues
            .iter()
            .filter(|i| i.issue_type == issue_type)
            .count()
    }
}

/// Terminal output of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecorationResult {
    /// Canonical URL of the decorated pull or merge request.
    pub url: String,
    /// False when the host cannot show decorations and the run was a no-op.
    pub published: bool,
}
