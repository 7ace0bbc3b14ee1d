//! Typed records for the GitHub API payloads shipr consumes.
//!
//! Only the fields the core actually reads are modeled; everything else in
//! the payload is ignored during deserialization.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a check run or workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    /// Statuses GitHub may add (waiting, requested, pending) are treated
    /// as still in flight.
    #[serde(other)]
    Unknown,
}

/// Terminal conclusion of a check run or workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
    Neutral,
    Cancelled,
    Skipped,
    TimedOut,
    ActionRequired,
    #[serde(other)]
    Unknown,
}

impl Conclusion {
    /// The conclusions that abort a reconciliation loop.
    pub fn is_failing(self) -> bool {
        matches!(
            self,
            Conclusion::Failure | Conclusion::TimedOut | Conclusion::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Conclusion::Success => "success",
            Conclusion::Failure => "failure",
            Conclusion::Neutral => "neutral",
            Conclusion::Cancelled => "cancelled",
            Conclusion::Skipped => "skipped",
            Conclusion::TimedOut => "timed_out",
            Conclusion::ActionRequired => "action_required",
            Conclusion::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open/closed state shared by PRs, issues and milestones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Open,
    Closed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

/// Head or base ref of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    #[serde(rename = "ref")]
    pub name: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: ItemState,
    pub head: BranchRef,
    pub base: BranchRef,
    #[serde(default)]
    pub labels: Vec<Label>,
}

/// Request body for PR creation.
#[derive(Debug, Clone, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRun {
    pub id: u64,
    pub name: String,
    pub status: RunStatus,
    pub conclusion: Option<Conclusion>,
    #[serde(default)]
    pub details_url: Option<String>,
}

impl CheckRun {
    pub fn is_failing(&self) -> bool {
        self.conclusion.is_some_and(Conclusion::is_failing)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutput {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub text: Option<String>,
}

/// The extended view returned by the single-check endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRunDetails {
    pub id: u64,
    pub name: String,
    pub status: RunStatus,
    pub conclusion: Option<Conclusion>,
    #[serde(default)]
    pub details_url: Option<String>,
    #[serde(default)]
    pub output: CheckOutput,
}

/// A workflow definition as listed by the Actions API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: u64,
    pub name: String,
    pub path: String,
}

/// One execution of a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub name: String,
    pub status: RunStatus,
    pub conclusion: Option<Conclusion>,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub event: String,
    #[serde(default)]
    pub head_branch: Option<String>,
    pub head_sha: String,
}

impl WorkflowRun {
    pub fn is_failing(&self) -> bool {
        self.conclusion.is_some_and(Conclusion::is_failing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: u64,
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub target_commitish: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
}

/// Request body for release creation.
#[derive(Debug, Clone, Serialize)]
pub struct NewRelease {
    pub tag_name: String,
    pub name: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub number: u64,
    pub title: String,
    pub state: ItemState,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: ItemState,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub html_url: String,
    #[serde(default)]
    pub milestone: Option<Milestone>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state_reason: Option<String>,
    /// Present when the "issue" is actually a pull request; used to filter
    /// PRs out of issue listings.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn label_names(&self) -> String {
        self.labels
            .iter()
            .map(|l| l.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Request body for issue creation.
#[derive(Debug, Clone, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueComment {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    pub created_at: DateTime<Utc>,
}

/// Merge strategy for `merge_pull_request`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeMethod {
    Merge,
    #[default]
    Squash,
    Rebase,
}

impl MergeMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeMethod::Merge => "merge",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "rebase",
        }
    }
}

impl fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(MergeMethod::Merge),
            "squash" => Ok(MergeMethod::Squash),
            "rebase" => Ok(MergeMethod::Rebase),
            other => Err(format!("unknown merge method: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conclusion_is_failing() {
        assert!(Conclusion::Failure.is_failing());
        assert!(Conclusion::TimedOut.is_failing());
        assert!(Conclusion::Cancelled.is_failing());
        assert!(!Conclusion::Success.is_failing());
        assert!(!Conclusion::Neutral.is_failing());
        assert!(!Conclusion::Skipped.is_failing());
        assert!(!Conclusion::ActionRequired.is_failing());
    }

    #[test]
    fn test_conclusion_deserializes_snake_case() {
        let c: Conclusion = serde_json::from_value(json!("timed_out")).unwrap();
        assert_eq!(c, Conclusion::TimedOut);
        let c: Conclusion = serde_json::from_value(json!("action_required")).unwrap();
        assert_eq!(c, Conclusion::ActionRequired);
    }

    #[test]
    fn test_unknown_status_tolerated() {
        let s: RunStatus = serde_json::from_value(json!("waiting")).unwrap();
        assert_eq!(s, RunStatus::Unknown);
    }

    #[test]
    fn test_pull_request_parses_with_extra_fields_ignored() {
        let pr: PullRequest = serde_json::from_value(json!({
            "number": 17,
            "title": "Add parser",
            "html_url": "https://github.com/acme/widget/pull/17",
            "state": "open",
            "head": { "ref": "feature/parser", "sha": "abc123" },
            "base": { "ref": "main", "sha": "def456" },
            "labels": [{ "name": "enhancement", "color": "ededed" }],
            "mergeable": true,
            "user": { "login": "someone" }
        }))
        .unwrap();

        assert_eq!(pr.number, 17);
        assert_eq!(pr.state, ItemState::Open);
        assert_eq!(pr.head.name, "feature/parser");
        assert_eq!(pr.base.name, "main");
        assert_eq!(pr.labels[0].name, "enhancement");
    }

    #[test]
    fn test_check_run_without_conclusion() {
        let check: CheckRun = serde_json::from_value(json!({
            "id": 1,
            "name": "build",
            "status": "in_progress",
            "conclusion": null
        }))
        .unwrap();

        assert_eq!(check.status, RunStatus::InProgress);
        assert!(check.conclusion.is_none());
        assert!(!check.is_failing());
    }

    #[test]
    fn test_workflow_run_parses_timestamps() {
        let run: WorkflowRun = serde_json::from_value(json!({
            "id": 99,
            "name": "release",
            "status": "completed",
            "conclusion": "success",
            "html_url": "https://github.com/acme/widget/actions/runs/99",
            "created_at": "2024-03-01T12:00:00Z",
            "event": "release",
            "head_branch": "main",
            "head_sha": "abc123"
        }))
        .unwrap();

        assert_eq!(run.created_at.to_rfc3339(), "2024-03-01T12:00:00+00:00");
        assert!(!run.is_failing());
    }

    #[test]
    fn test_issue_filters_pull_requests() {
        let issue: Issue = serde_json::from_value(json!({
            "number": 4,
            "title": "Bug",
            "state": "open",
            "html_url": "https://github.com/acme/widget/issues/4",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z",
            "pull_request": { "url": "https://api.github.com/repos/acme/widget/pulls/4" }
        }))
        .unwrap();

        assert!(issue.is_pull_request());
    }

    #[test]
    fn test_issue_label_names() {
        let issue: Issue = serde_json::from_value(json!({
            "number": 5,
            "title": "Feature",
            "state": "closed",
            "labels": [{ "name": "bug" }, { "name": "p1" }],
            "html_url": "https://github.com/acme/widget/issues/5",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(issue.label_names(), "bug, p1");
        assert!(!issue.is_pull_request());
    }

    #[test]
    fn test_release_tolerates_missing_created_at() {
        let release: Release = serde_json::from_value(json!({
            "id": 3,
            "tag_name": "v0.2.0",
            "html_url": "https://github.com/acme/widget/releases/tag/v0.2.0"
        }))
        .unwrap();

        assert!(release.created_at.is_none());
        assert!(!release.draft);
    }

    #[test]
    fn test_merge_method_round_trip() {
        assert_eq!("squash".parse::<MergeMethod>().unwrap(), MergeMethod::Squash);
        assert_eq!(MergeMethod::Rebase.to_string(), "rebase");
        assert!("octopus".parse::<MergeMethod>().is_err());
        assert_eq!(MergeMethod::default(), MergeMethod::Squash);
    }
}
