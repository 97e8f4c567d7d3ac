#![allow(dead_code)]

use chrono::{DateTime, Utc};
use prdeco::{AnalysisResult, Issue, IssueType, QualityGateStatus, Severity};

pub const PRIVATE_KEY: &str = include_str!("../fixtures/github-app.pem");
pub const PUBLIC_KEY: &str = include_str!("../fixtures/github-app.pub.pem");

pub fn issue(key: &str, issue_type: IssueType, severity: Severity, line: Option<u32>) -> Issue {
    Issue {
        key: key.to_string(),
        issue_type,
        severities: vec![severity],
        path: Some("src/lib.rs".into()),
        line,
        message: format!("problem {key}"),
    }
}

pub fn issues(count: usize) -> Vec<Issue> {
    (0..count)
        .map(|i| {
            issue(
                &format!("AX-{i}"),
                IssueType::CodeSmell,
                Severity::Medium,
                Some(i as u32 + 1),
            )
        })
        .collect()
}

pub fn analysis(issues: Vec<Issue>) -> AnalysisResult {
    AnalysisResult {
        project_key: "acme-key".into(),
        project_name: "Acme".into(),
        analysis_id: "AN-1".into(),
        commit_sha: "c0ffee".into(),
        pull_request_id: "7".into(),
        quality_gate: QualityGateStatus::Error,
        failed_conditions: vec!["new_coverage < 80".into()],
        issues,
        server_url: "https://sonar.example.com".into(),
        analysed_at: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc),
        new_coverage: Some(64.5),
        new_duplication: Some(1.2),
    }
}
