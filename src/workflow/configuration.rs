//! Repository-level workflow configuration audit.
//!
//! Answers "does this repository have CI at all, and will any of it react
//! to the PR we are about to open?". The audit is advisory: API failures
//! degrade to a permissive answer instead of blocking the caller.

use log::{debug, warn};

use crate::github::api::GitHubApi;
use crate::workflow::triggers::{triggered_by_pull_request, triggered_by_release};

/// What the audit found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfiguration {
    pub has_workflows: bool,
    /// `None` when the workflow list could not be fetched.
    pub workflow_count: Option<usize>,
    pub has_pull_request_triggers: bool,
    pub triggered_workflow_names: Vec<String>,
    pub warning: Option<String>,
}

impl WorkflowConfiguration {
    /// The answer used when the API gives us nothing to audit: assume CI
    /// exists so callers keep waiting for it.
    fn permissive() -> Self {
        Self {
            has_workflows: true,
            workflow_count: None,
            has_pull_request_triggers: true,
            triggered_workflow_names: Vec::new(),
            warning: None,
        }
    }
}

/// Audit the repository's workflows against PRs targeting `target_branch`.
pub async fn check_workflow_configuration(
    api: &dyn GitHubApi,
    target_branch: &str,
) -> WorkflowConfiguration {
    let workflows = match api.list_workflows().await {
        Ok(workflows) => workflows,
        Err(err) => {
            warn!("Could not list workflows, assuming CI is configured: {err}");
            return WorkflowConfiguration::permissive();
        }
    };

    if workflows.is_empty() {
        return WorkflowConfiguration {
            has_workflows: false,
            workflow_count: Some(0),
            has_pull_request_triggers: false,
            triggered_workflow_names: Vec::new(),
            warning: Some(
                "No GitHub Actions workflows are configured in this repository".to_string(),
            ),
        };
    }

    let mut triggered = Vec::new();
    for workflow in &workflows {
        match api.get_file_content(&workflow.path).await {
            Ok(content) => {
                if triggered_by_pull_request(&content, target_branch, &workflow.name) {
                    triggered.push(workflow.name.clone());
                }
            }
            Err(err) => debug!("Could not read workflow {}: {err}", workflow.path),
        }
    }

    let warning = if triggered.is_empty() {
        Some(format!(
            "{} workflow(s) are configured, but none appear to trigger on pull requests to {target_branch}",
            workflows.len()
        ))
    } else {
        None
    };

    WorkflowConfiguration {
        has_workflows: true,
        workflow_count: Some(workflows.len()),
        has_pull_request_triggers: !triggered.is_empty(),
        triggered_workflow_names: triggered,
        warning,
    }
}

/// Names of workflows that fire on release publication. Unreadable
/// workflow files are skipped.
pub async fn release_triggered_workflow_names(
    api: &dyn GitHubApi,
) -> crate::error::Result<Vec<String>> {
    let workflows = api.list_workflows().await?;
    let mut names = Vec::new();
    for workflow in &workflows {
        match api.get_file_content(&workflow.path).await {
            Ok(content) => {
                if triggered_by_release(&content, &workflow.name) {
                    names.push(workflow.name.clone());
                }
            }
            Err(err) => warn!("Could not read workflow {}: {err}", workflow.path),
        }
    }
    Ok(names)
}
