//! Error types for shipr
//!
//! Centralized error handling using thiserror. The hard-failure variants
//! (`ChecksFailed`, `WorkflowsFailed`, `PullRequestCreation`) carry enough
//! structure that remediation text can be generated deterministically
//! without touching the network again.

use thiserror::Error;

/// One failing check run, with whatever detail enrichment could recover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCheck {
    pub name: String,
    pub conclusion: String,
    pub details_url: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
}

/// One failing workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRun {
    pub name: String,
    pub conclusion: String,
    pub html_url: String,
}

/// An open pull request discovered while diagnosing a creation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingPullRequest {
    pub number: u64,
    pub html_url: String,
    pub base: String,
}

/// All error types that can occur in shipr
#[derive(Debug, Error)]
pub enum ShiprError {
    /// GitHub API returned a non-success status
    #[error("GitHub API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Network-level failure talking to the API
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No usable GitHub token in the environment
    #[error("GitHub token not found: {0}")]
    Token(String),

    /// Git command failure (branch/remote resolution)
    #[error("Git error: {0}")]
    Git(String),

    /// Origin remote URL could not be parsed into owner/repo
    #[error(
        "Could not parse repository owner and name from origin URL: \"{0}\". \
         Expected format: git@host:owner/repo.git or https://host/owner/repo.git"
    )]
    RemoteParse(String),

    /// One or more PR check runs reached a failing conclusion
    #[error("PR #{pr_number} checks failed: {} failing check(s)", .failed.len())]
    ChecksFailed {
        pr_number: u64,
        failed: Vec<FailedCheck>,
        pr_url: String,
    },

    /// One or more release workflow runs reached a failing conclusion
    #[error("release workflows for {tag} failed: {} failing run(s)", .failed.len())]
    WorkflowsFailed { tag: String, failed: Vec<FailedRun> },

    /// Timed out waiting for PR checks (non-interactive mode)
    #[error("timeout waiting for PR #{pr_number} checks ({timeout_secs}s)")]
    CheckTimeout { pr_number: u64, timeout_secs: u64 },

    /// Timed out waiting for release workflows (non-interactive mode)
    #[error("timeout waiting for release workflows for {tag} ({timeout_secs}s)")]
    WorkflowTimeout { tag: String, timeout_secs: u64 },

    /// The confirmation gate declined to proceed
    #[error("{0}. User chose not to proceed")]
    UserDeclined(String),

    /// PR creation failed and no reusable open PR was found
    #[error("failed to create pull request from {head} to {base}: {message}")]
    PullRequestCreation {
        head: String,
        base: String,
        status: u16,
        message: String,
        existing: Option<ExistingPullRequest>,
    },
}

impl ShiprError {
    /// Status code of the underlying API error, if this is one.
    pub fn api_status(&self) -> Option<u16> {
        match self {
            ShiprError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Actionable remediation text for hard failures.
    ///
    /// Pure function of the error's fields; returns `None` for variants
    /// where generic propagation is the only sensible answer.
    pub fn recovery_instructions(&self) -> Option<String> {
        match self {
            ShiprError::ChecksFailed { failed, pr_url, .. } => {
                let mut lines = vec!["To resolve failed PR checks:".to_string()];
                lines.push(format!("1. Review the failed checks at: {pr_url}"));
                for check in failed {
                    match &check.details_url {
                        Some(url) => {
                            lines.push(format!("   - {} ({}): {url}", check.name, check.conclusion))
                        }
                        None => lines.push(format!("   - {} ({})", check.name, check.conclusion)),
                    }
                }
                lines.push("2. Fix the issues identified".to_string());
                lines.push("3. Push the fixes to the PR branch".to_string());
                lines.push("4. Re-run this command".to_string());
                Some(lines.join("\n"))
            }
            ShiprError::WorkflowsFailed { tag, failed } => {
                let mut lines = vec![format!("To resolve failed release workflows for {tag}:")];
                for run in failed {
                    lines.push(format!(
                        "   - {} ({}): {}",
                        run.name, run.conclusion, run.html_url
                    ));
                }
                lines.push(
                    "Review the run logs, fix the workflow, and re-publish or re-run.".to_string(),
                );
                Some(lines.join("\n"))
            }
            ShiprError::PullRequestCreation {
                head,
                base,
                existing,
                ..
            } => {
                let mut lines = vec![format!(
                    "Pull request creation from '{head}' to '{base}' was rejected by GitHub."
                )];
                match existing {
                    Some(pr) => {
                        lines.push(format!(
                            "An open PR #{} already exists for '{head}' but targets '{}': {}",
                            pr.number, pr.base, pr.html_url
                        ));
                        lines.push(
                            "Close the existing PR, retarget it, or use a different branch name."
                                .to_string(),
                        );
                    }
                    None => {
                        lines.push(format!(
                            "Verify the branch exists on the remote (git push origin {head}) \
                             and differs from '{base}'."
                        ));
                    }
                }
                Some(lines.join("\n"))
            }
            _ => None,
        }
    }
}

/// Result type alias for shipr operations
pub type Result<T> = std::result::Result<T, ShiprError>;
