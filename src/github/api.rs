//! GitHub API trait - the seam between operations/loops and the transport.
//!
//! `GitHubClient` is the reqwest-backed implementation; `MockGitHub` is a
//! scripted fake for tests, so every reconciliation path can be exercised
//! without a network.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, ShiprError};
use crate::github::types::{
    CheckRun, CheckRunDetails, Issue, IssueComment, ItemState, MergeMethod, Milestone, NewIssue,
    NewPullRequest, NewRelease, PullRequest, Release, Workflow, WorkflowRun,
};
use crate::repo::RepoIdentity;

/// Typed request/response operations against one repository.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Identity of the repository all calls are scoped to.
    fn repo(&self) -> &RepoIdentity;

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest>;
    async fn list_open_pull_requests_by_head(&self, head: &str) -> Result<Vec<PullRequest>>;
    async fn create_pull_request(&self, new: &NewPullRequest) -> Result<PullRequest>;
    async fn merge_pull_request(&self, number: u64, method: MergeMethod) -> Result<()>;
    async fn delete_branch(&self, branch: &str) -> Result<()>;

    async fn list_check_runs(&self, sha: &str) -> Result<Vec<CheckRun>>;
    async fn get_check_run(&self, id: u64) -> Result<CheckRunDetails>;

    async fn list_workflows(&self) -> Result<Vec<Workflow>>;
    /// Raw file content at `path` on the default branch, base64-decoded.
    async fn get_file_content(&self, path: &str) -> Result<String>;
    async fn list_workflow_runs(&self, workflow_id: u64) -> Result<Vec<WorkflowRun>>;
    async fn list_runs_for_sha(&self, sha: &str) -> Result<Vec<WorkflowRun>>;
    async fn list_runs_for_branch(&self, branch: &str) -> Result<Vec<WorkflowRun>>;

    async fn create_release(&self, new: &NewRelease) -> Result<Release>;
    async fn get_release_by_tag(&self, tag: &str) -> Result<Release>;

    async fn list_issues(
        &self,
        state: ItemState,
        milestone: Option<u64>,
        limit: usize,
    ) -> Result<Vec<Issue>>;
    async fn get_issue(&self, number: u64) -> Result<Issue>;
    async fn create_issue(&self, new: &NewIssue) -> Result<Issue>;
    async fn list_issue_comments(&self, number: u64) -> Result<Vec<IssueComment>>;

    async fn list_milestones(&self) -> Result<Vec<Milestone>>;
    async fn create_milestone(&self, title: &str, description: Option<&str>) -> Result<Milestone>;
    async fn close_milestone(&self, number: u64) -> Result<()>;
    async fn set_issue_milestone(&self, issue: u64, milestone: u64) -> Result<()>;
}

fn api_error(status: u16, message: &str) -> ShiprError {
    ShiprError::Api {
        status,
        message: message.to_string(),
    }
}

/// Scripted in-memory GitHub for tests.
///
/// Check-run snapshots are queued: each `list_check_runs` call consumes the
/// next batch and the final batch repeats, which lets a test walk the
/// reconciliation loop through "empty, empty, in-flight, completed".
#[derive(Default)]
pub struct MockGitHub {
    repo: RepoIdentity,
    pull_requests: Mutex<HashMap<u64, PullRequest>>,
    open_prs_by_head: Mutex<HashMap<String, Vec<PullRequest>>>,
    create_pr_results: Mutex<VecDeque<std::result::Result<PullRequest, (u16, String)>>>,
    created_prs: Mutex<Vec<NewPullRequest>>,
    merged: Mutex<Vec<(u64, MergeMethod)>>,
    deleted_branches: Mutex<Vec<String>>,

    check_run_batches: Mutex<VecDeque<Vec<CheckRun>>>,
    check_details: Mutex<HashMap<u64, CheckRunDetails>>,
    check_details_errors: bool,

    workflows: Mutex<Vec<Workflow>>,
    list_workflows_errors: bool,
    contents: Mutex<HashMap<String, String>>,
    workflow_runs: Mutex<HashMap<u64, Vec<WorkflowRun>>>,
    workflow_run_error_ids: Mutex<HashSet<u64>>,
    runs_by_sha: Mutex<Vec<WorkflowRun>>,
    runs_by_branch: Mutex<Vec<WorkflowRun>>,
    run_lookup_errors: bool,

    releases: Mutex<HashMap<String, Release>>,
    issues: Mutex<Vec<Issue>>,
    comments: Mutex<HashMap<u64, Vec<IssueComment>>>,
    milestones: Mutex<Vec<Milestone>>,
    closed_milestones: Mutex<Vec<u64>>,
    milestone_moves: Mutex<Vec<(u64, u64)>>,
}

impl MockGitHub {
    pub fn new() -> Self {
        Self {
            repo: RepoIdentity::new("acme", "widget"),
            ..Default::default()
        }
    }

    pub fn with_pull_request(self, pr: PullRequest) -> Self {
        self.pull_requests.lock().unwrap().insert(pr.number, pr);
        self
    }

    pub fn with_open_pr_for_head(self, head: &str, pr: PullRequest) -> Self {
        self.open_prs_by_head
            .lock()
            .unwrap()
            .entry(head.to_string())
            .or_default()
            .push(pr);
        self
    }

    /// Queue the outcome of the next `create_pull_request` call.
    pub fn with_create_pr_result(
        self,
        result: std::result::Result<PullRequest, (u16, String)>,
    ) -> Self {
        self.create_pr_results.lock().unwrap().push_back(result);
        self
    }

    /// Queue a check-run snapshot; the last queued batch repeats forever.
    pub fn push_check_runs(self, batch: Vec<CheckRun>) -> Self {
        self.check_run_batches.lock().unwrap().push_back(batch);
        self
    }

    pub fn with_check_details(self, details: CheckRunDetails) -> Self {
        self.check_details.lock().unwrap().insert(details.id, details);
        self
    }

    /// Make every `get_check_run` call fail (enrichment degradation path).
    pub fn failing_check_details(mut self) -> Self {
        self.check_details_errors = true;
        self
    }

    pub fn with_workflow(self, workflow: Workflow) -> Self {
        self.workflows.lock().unwrap().push(workflow);
        self
    }

    /// Make `list_workflows` fail (permissive-default path).
    pub fn failing_workflow_list(mut self) -> Self {
        self.list_workflows_errors = true;
        self
    }

    pub fn with_content(self, path: &str, content: &str) -> Self {
        self.contents
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        self
    }

    pub fn with_workflow_runs(self, workflow_id: u64, runs: Vec<WorkflowRun>) -> Self {
        self.workflow_runs.lock().unwrap().insert(workflow_id, runs);
        self
    }

    /// Make run-history fetches for one workflow fail (skip-and-continue path).
    pub fn with_workflow_run_error(self, workflow_id: u64) -> Self {
        self.workflow_run_error_ids.lock().unwrap().insert(workflow_id);
        self
    }

    pub fn with_runs_for_sha(self, runs: Vec<WorkflowRun>) -> Self {
        *self.runs_by_sha.lock().unwrap() = runs;
        self
    }

    pub fn with_runs_for_branch(self, runs: Vec<WorkflowRun>) -> Self {
        *self.runs_by_branch.lock().unwrap() = runs;
        self
    }

    /// Make sha/branch run lookups fail ("runs might exist" fallback).
    pub fn failing_run_lookup(mut self) -> Self {
        self.run_lookup_errors = true;
        self
    }

    pub fn with_release(self, release: Release) -> Self {
        self.releases
            .lock()
            .unwrap()
            .insert(release.tag_name.clone(), release);
        self
    }

    pub fn with_issue(self, issue: Issue) -> Self {
        self.issues.lock().unwrap().push(issue);
        self
    }

    pub fn with_comments(self, issue: u64, comments: Vec<IssueComment>) -> Self {
        self.comments.lock().unwrap().insert(issue, comments);
        self
    }

    pub fn with_milestone(self, milestone: Milestone) -> Self {
        self.milestones.lock().unwrap().push(milestone);
        self
    }

    // Assertion accessors

    pub fn created_prs(&self) -> Vec<NewPullRequest> {
        self.created_prs.lock().unwrap().clone()
    }

    pub fn merged(&self) -> Vec<(u64, MergeMethod)> {
        self.merged.lock().unwrap().clone()
    }

    pub fn deleted_branches(&self) -> Vec<String> {
        self.deleted_branches.lock().unwrap().clone()
    }

    pub fn closed_milestones(&self) -> Vec<u64> {
        self.closed_milestones.lock().unwrap().clone()
    }

    pub fn milestone_moves(&self) -> Vec<(u64, u64)> {
        self.milestone_moves.lock().unwrap().clone()
    }
}

#[async_trait]
impl GitHubApi for MockGitHub {
    fn repo(&self) -> &RepoIdentity {
        &self.repo
    }

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        self.pull_requests
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .ok_or_else(|| api_error(404, "pull request not found"))
    }

    async fn list_open_pull_requests_by_head(&self, head: &str) -> Result<Vec<PullRequest>> {
        Ok(self
            .open_prs_by_head
            .lock()
            .unwrap()
            .get(head)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_pull_request(&self, new: &NewPullRequest) -> Result<PullRequest> {
        self.created_prs.lock().unwrap().push(new.clone());
        match self.create_pr_results.lock().unwrap().pop_front() {
            Some(Ok(pr)) => Ok(pr),
            Some(Err((status, message))) => Err(api_error(status, &message)),
            None => Err(api_error(500, "no scripted create_pull_request result")),
        }
    }

    async fn merge_pull_request(&self, number: u64, method: MergeMethod) -> Result<()> {
        self.merged.lock().unwrap().push((number, method));
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> Result<()> {
        self.deleted_branches.lock().unwrap().push(branch.to_string());
        Ok(())
    }

    async fn list_check_runs(&self, _sha: &str) -> Result<Vec<CheckRun>> {
        let mut batches = self.check_run_batches.lock().unwrap();
        match batches.len() {
            0 => Ok(Vec::new()),
            1 => Ok(batches.front().cloned().unwrap_or_default()),
            _ => Ok(batches.pop_front().unwrap_or_default()),
        }
    }

    async fn get_check_run(&self, id: u64) -> Result<CheckRunDetails> {
        if self.check_details_errors {
            return Err(api_error(500, "check details unavailable"));
        }
        self.check_details
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| api_error(404, "check run not found"))
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        if self.list_workflows_errors {
            return Err(api_error(403, "actions disabled"));
        }
        Ok(self.workflows.lock().unwrap().clone())
    }

    async fn get_file_content(&self, path: &str) -> Result<String> {
        self.contents
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| api_error(404, "content not found"))
    }

    async fn list_workflow_runs(&self, workflow_id: u64) -> Result<Vec<WorkflowRun>> {
        if self.workflow_run_error_ids.lock().unwrap().contains(&workflow_id) {
            return Err(api_error(500, "run history unavailable"));
        }
        Ok(self
            .workflow_runs
            .lock()
            .unwrap()
            .get(&workflow_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_runs_for_sha(&self, _sha: &str) -> Result<Vec<WorkflowRun>> {
        if self.run_lookup_errors {
            return Err(api_error(500, "run lookup unavailable"));
        }
        Ok(self.runs_by_sha.lock().unwrap().clone())
    }

    async fn list_runs_for_branch(&self, _branch: &str) -> Result<Vec<WorkflowRun>> {
        if self.run_lookup_errors {
            return Err(api_error(500, "run lookup unavailable"));
        }
        Ok(self.runs_by_branch.lock().unwrap().clone())
    }

    async fn create_release(&self, new: &NewRelease) -> Result<Release> {
        let release = Release {
            id: 1,
            tag_name: new.tag_name.clone(),
            name: Some(new.name.clone()),
            html_url: format!(
                "https://github.com/{}/releases/tag/{}",
                self.repo.slug(),
                new.tag_name
            ),
            created_at: Some(chrono::Utc::now()),
            target_commitish: None,
            draft: false,
            prerelease: false,
        };
        self.releases
            .lock()
            .unwrap()
            .insert(new.tag_name.clone(), release.clone());
        Ok(release)
    }

    async fn get_release_by_tag(&self, tag: &str) -> Result<Release> {
        self.releases
            .lock()
            .unwrap()
            .get(tag)
            .cloned()
            .ok_or_else(|| api_error(404, "release not found"))
    }

    async fn list_issues(
        &self,
        state: ItemState,
        milestone: Option<u64>,
        limit: usize,
    ) -> Result<Vec<Issue>> {
        let issues = self.issues.lock().unwrap();
        Ok(issues
            .iter()
            .filter(|i| i.state == state)
            .filter(|i| match milestone {
                Some(number) => i.milestone.as_ref().is_some_and(|m| m.number == number),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_issue(&self, number: u64) -> Result<Issue> {
        self.issues
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.number == number)
            .cloned()
            .ok_or_else(|| api_error(404, "issue not found"))
    }

    async fn create_issue(&self, new: &NewIssue) -> Result<Issue> {
        let mut issues = self.issues.lock().unwrap();
        let number = issues.len() as u64 + 1;
        let issue = Issue {
            number,
            title: new.title.clone(),
            body: Some(new.body.clone()),
            state: ItemState::Open,
            labels: new
                .labels
                .iter()
                .map(|name| crate::github::types::Label { name: name.clone() })
                .collect(),
            html_url: format!("https://github.com/{}/issues/{number}", self.repo.slug()),
            milestone: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            closed_at: None,
            state_reason: None,
            pull_request: None,
        };
        issues.push(issue.clone());
        Ok(issue)
    }

    async fn list_issue_comments(&self, number: u64) -> Result<Vec<IssueComment>> {
        Ok(self
            .comments
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_milestones(&self) -> Result<Vec<Milestone>> {
        Ok(self.milestones.lock().unwrap().clone())
    }

    async fn create_milestone(&self, title: &str, description: Option<&str>) -> Result<Milestone> {
        let mut milestones = self.milestones.lock().unwrap();
        let milestone = Milestone {
            number: milestones.len() as u64 + 1,
            title: title.to_string(),
            state: ItemState::Open,
            description: description.map(str::to_string),
        };
        milestones.push(milestone.clone());
        Ok(milestone)
    }

    async fn close_milestone(&self, number: u64) -> Result<()> {
        self.closed_milestones.lock().unwrap().push(number);
        if let Some(m) = self
            .milestones
            .lock()
            .unwrap()
            .iter_mut()
            .find(|m| m.number == number)
        {
            m.state = ItemState::Closed;
        }
        Ok(())
    }

    async fn set_issue_milestone(&self, issue: u64, milestone: u64) -> Result<()> {
        self.milestone_moves.lock().unwrap().push((issue, milestone));
        Ok(())
    }
}
