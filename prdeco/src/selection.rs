//! Issue filtering, ordering and truncation.

use std::cmp::Ordering;

use serde::Deserialize;
use tracing::debug;

use crate::model::{Issue, IssueType, Severity};

/// Rejects issues that should not be reported.
pub trait IssueFilter: Send + Sync {
    fn accepts(&self, issue: &Issue) -> bool;
}

pub type IssueComparator = fn(&Issue, &Issue) -> Ordering;

/// Drops issues whose effective severity is listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeverityExclusion {
    excluded: Vec<Severity>,
}

impl SeverityExclusion {
    /// Parses a comma separated list. Unknown tokens match nothing.
    pub fn parse(list: &str) -> Self {
        Self {
            excluded: list.split(',').filter_map(Severity::parse).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }
}

impl IssueFilter for SeverityExclusion {
    fn accepts(&self, issue: &Issue) -> bool {
        issue
            .severity()
            .is_none_or(|severity| !self.excluded.contains(&severity))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeExclusion {
    excluded: Vec<IssueType>,
}

impl TypeExclusion {
    pub fn parse(list: &str) -> Self {
        Self {
            excluded: list.split(',').filter_map(IssueType::parse).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }
}

impl IssueFilter for TypeExclusion {
    fn accepts(&self, issue: &Issue) -> bool {
        !self.excluded.contains(&issue.issue_type)
    }
}

/// Highest severity first; issues without a severity sort last.
pub fn by_severity_desc(a: &Issue, b: &Issue) -> Ordering {
    b.severity().cmp(&a.severity())
}

pub fn by_type_desc(a: &Issue, b: &Issue) -> Ordering {
    b.issue_type.rank().cmp(&a.issue_type.rank())
}

/// Raw selection knobs as they appear in configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectionSettings {
    #[serde(default)]
    pub severity_exclusions: Option<String>,
    #[serde(default)]
    pub type_exclusions: Option<String>,
    #[serde(default)]
    pub max_issues: Option<i64>,
}

pub struct SelectionPolicy {
    filters: Vec<Box<dyn IssueFilter>>,
    primary: IssueComparator,
    secondary: IssueComparator,
    max_issues: Option<usize>,
}

impl SelectionPolicy {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            primary: by_severity_desc,
            secondary: by_type_desc,
            max_issues: None,
        }
    }

    pub fn from_settings(settings: &SelectionSettings) -> Self {
        let mut policy = Self::new();
        if let Some(list) = settings.severity_exclusions.as_deref() {
            let exclusion = SeverityExclusion::parse(list);
            if !exclusion.is_empty() {
                policy = policy.with_filter(exclusion);
            }
        }
        if let Some(list) = settings.type_exclusions.as_deref() {
            let exclusion = TypeExclusion::parse(list);
            if !exclusion.is_empty() {
                policy = policy.with_filter(exclusion);
            }
        }
        if let Some(max) = settings.max_issues {
            policy = policy.with_max_issues(max);
        }
        policy
    }

    pub fn with_filter(mut self, filter: impl IssueFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Zero or negative values leave the output untruncated.
    pub fn with_max_issues(mut self, max: i64) -> Self {
        self.max_issues = usize::try_from(max).ok().filter(|m| *m > 0);
        self
    }

    pub fn max_issues(&self) -> Option<usize> {
        self.max_issues
    }

    pub fn select<'a>(&self, issues: &'a [Issue]) -> Vec<&'a Issue> {
        let mut selected: Vec<&Issue> = issues
            .iter()
            .filter(|issue| self.filters.iter().all(|f| f.accepts(issue)))
            .collect();

        // sort_by is stable, so ties keep their input order
        selected.sort_by(|a, b| (self.primary)(a, b).then_with(|| (self.secondary)(a, b)));

        if let Some(max) = self.max_issues {
            selected.truncate(max);
        }
        debug!(
            total = issues.len(),
            selected = selected.len(),
            "issues selected"
        );
        selected
    }
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::new()
    }
}
