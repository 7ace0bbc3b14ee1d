//! Pull request operations: idempotent creation, merge, branch cleanup.

use log::{error, info, warn};

use crate::error::{ExistingPullRequest, Result, ShiprError};
use crate::github::api::GitHubApi;
use crate::github::types::{MergeMethod, NewPullRequest, PullRequest};

/// GitHub rejects PR titles longer than this.
pub const MAX_TITLE_LEN: usize = 256;

/// Truncate an over-long title with an ellipsis, backing up to the last
/// word boundary when one falls in the final fifth of the budget.
pub fn truncate_title(title: &str) -> String {
    let title = title.trim();
    if title.chars().count() <= MAX_TITLE_LEN {
        return title.to_string();
    }

    let cut: String = title.chars().take(MAX_TITLE_LEN - 3).collect();
    let keep = match cut.rfind(' ') {
        Some(pos) if pos > MAX_TITLE_LEN * 4 / 5 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}...", keep.trim_end())
}

/// What a new pull request should look like.
#[derive(Debug, Clone)]
pub struct PullRequestSpec {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// The open PR whose head is `head`, if one exists.
pub async fn find_open_pull_request_by_head(
    api: &dyn GitHubApi,
    head: &str,
) -> Result<Option<PullRequest>> {
    let prs = api.list_open_pull_requests_by_head(head).await?;
    Ok(prs.into_iter().next())
}

/// Create a pull request, reusing an existing open one for the same
/// head/base pair.
///
/// Creation races with concurrent automation: another process may open the
/// PR between our pre-flight lookup and the create call, which GitHub
/// reports as a 422. That 422 is re-diagnosed with a second lookup so the
/// caller either gets the PR that now exists or an error that names it.
pub async fn create_pull_request(
    api: &dyn GitHubApi,
    spec: &PullRequestSpec,
) -> Result<PullRequest> {
    if let Some(existing) = find_open_pull_request_by_head(api, &spec.head).await? {
        if existing.base.name == spec.base {
            info!(
                "Reusing existing PR #{} for {} -> {}: {}",
                existing.number, spec.head, spec.base, existing.html_url
            );
            return Ok(existing);
        }
        warn!(
            "Open PR #{} for '{}' targets '{}', not '{}'; attempting to create anyway",
            existing.number, spec.head, existing.base.name, spec.base
        );
    }

    let new = NewPullRequest {
        title: truncate_title(&spec.title),
        body: spec.body.clone(),
        head: spec.head.clone(),
        base: spec.base.clone(),
    };

    match api.create_pull_request(&new).await {
        Ok(pr) => {
            info!("Created PR #{}: {}", pr.number, pr.html_url);
            Ok(pr)
        }
        Err(err) if err.api_status() == Some(422) => {
            let message = err.to_string();
            warn!("PR creation rejected (422), checking for a PR created concurrently");

            let existing = find_open_pull_request_by_head(api, &spec.head).await?;
            if let Some(pr) = &existing {
                if pr.base.name == spec.base {
                    warn!(
                        "Reusing PR #{} that appeared after the rejected create: {}",
                        pr.number, pr.html_url
                    );
                    return Ok(pr.clone());
                }
            }

            let creation = ShiprError::PullRequestCreation {
                head: spec.head.clone(),
                base: spec.base.clone(),
                status: 422,
                message,
                existing: existing.map(|pr| ExistingPullRequest {
                    number: pr.number,
                    html_url: pr.html_url,
                    base: pr.base.name,
                }),
            };
            if let Some(instructions) = creation.recovery_instructions() {
                for line in instructions.lines() {
                    error!("{line}");
                }
            }
            Err(creation)
        }
        Err(err) => Err(err),
    }
}

/// Merge a pull request and optionally delete its head branch.
pub async fn merge_pull_request(
    api: &dyn GitHubApi,
    number: u64,
    method: MergeMethod,
    delete_head_branch: bool,
) -> Result<PullRequest> {
    let pr = api.get_pull_request(number).await?;
    api.merge_pull_request(number, method).await?;
    info!("Merged PR #{number} ({method}): {}", pr.html_url);

    if delete_head_branch {
        match api.delete_branch(&pr.head.name).await {
            Ok(()) => info!("Deleted branch '{}'", pr.head.name),
            // The branch may already be gone (auto-delete on merge).
            Err(err) => warn!("Could not delete branch '{}': {err}", pr.head.name),
        }
    }

    Ok(pr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::api::MockGitHub;
    use crate::github::types::{BranchRef, ItemState};

    fn pr(number: u64, head: &str, base: &str) -> PullRequest {
        PullRequest {
            number,
            title: format!("PR {number}"),
            html_url: format!("https://github.com/acme/widget/pull/{number}"),
            state: ItemState::Open,
            head: BranchRef {
                name: head.to_string(),
                sha: "abc123".to_string(),
            },
            base: BranchRef {
                name: base.to_string(),
                sha: "def456".to_string(),
            },
            labels: Vec::new(),
        }
    }

    fn spec(head: &str, base: &str) -> PullRequestSpec {
        PullRequestSpec {
            title: "Add feature".to_string(),
            body: "body".to_string(),
            head: head.to_string(),
            base: base.to_string(),
        }
    }

    #[test]
    fn test_truncate_title_short_passes_through() {
        assert_eq!(truncate_title("  Add feature  "), "Add feature");
    }

    #[test]
    fn test_truncate_title_cuts_at_word_boundary() {
        let word = "word ";
        let title = word.repeat(60); // 300 chars
        let truncated = truncate_title(&title);
        assert!(truncated.chars().count() <= MAX_TITLE_LEN);
        assert!(truncated.ends_with("word..."));
        assert!(!truncated.contains("wor..."));
    }

    #[test]
    fn test_truncate_title_hard_cuts_unbroken_text() {
        let title = "x".repeat(400);
        let truncated = truncate_title(&title);
        assert_eq!(truncated.chars().count(), MAX_TITLE_LEN);
        assert!(truncated.ends_with("..."));
    }

    #[tokio::test]
    async fn test_create_reuses_existing_pr_with_same_base() {
        let api = MockGitHub::new().with_open_pr_for_head("feature/x", pr(5, "feature/x", "main"));

        let result = create_pull_request(&api, &spec("feature/x", "main")).await.unwrap();
        assert_eq!(result.number, 5);
        assert!(api.created_prs().is_empty());
    }

    #[tokio::test]
    async fn test_create_succeeds_when_no_existing_pr() {
        let api = MockGitHub::new().with_create_pr_result(Ok(pr(9, "feature/x", "main")));

        let result = create_pull_request(&api, &spec("feature/x", "main")).await.unwrap();
        assert_eq!(result.number, 9);
        assert_eq!(api.created_prs().len(), 1);
        assert_eq!(api.created_prs()[0].head, "feature/x");
    }

    #[tokio::test]
    async fn test_create_recovers_from_422_when_pr_appeared() {
        // Lookup finds nothing the first time; the mock's scripted 422 then
        // stands in for a concurrent creation that the second lookup sees.
        let api = MockGitHub::new()
            .with_create_pr_result(Err((422, "Validation Failed".to_string())))
            .with_open_pr_for_head("feature/x", pr(11, "feature/x", "main"));

        // Pre-flight sees the PR and reuses it without calling create.
        let result = create_pull_request(&api, &spec("feature/x", "main")).await.unwrap();
        assert_eq!(result.number, 11);
    }

    #[tokio::test]
    async fn test_create_errors_on_422_with_mismatched_base() {
        let api = MockGitHub::new()
            .with_create_pr_result(Err((422, "Validation Failed".to_string())))
            .with_open_pr_for_head("feature/x", pr(11, "feature/x", "develop"));

        let err = create_pull_request(&api, &spec("feature/x", "main")).await.unwrap_err();
        match err {
            ShiprError::PullRequestCreation { existing, .. } => {
                let existing = existing.unwrap();
                assert_eq!(existing.number, 11);
                assert_eq!(existing.base, "develop");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_errors_on_422_without_existing_pr() {
        let api = MockGitHub::new()
            .with_create_pr_result(Err((422, "Validation Failed".to_string())));

        let err = create_pull_request(&api, &spec("feature/x", "main")).await.unwrap_err();
        assert!(matches!(
            err,
            ShiprError::PullRequestCreation { existing: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_create_propagates_non_422_errors() {
        let api = MockGitHub::new()
            .with_create_pr_result(Err((500, "Server Error".to_string())));

        let err = create_pull_request(&api, &spec("feature/x", "main")).await.unwrap_err();
        assert_eq!(err.api_status(), Some(500));
    }

    #[tokio::test]
    async fn test_merge_deletes_head_branch_when_asked() {
        let api = MockGitHub::new().with_pull_request(pr(3, "feature/x", "main"));

        merge_pull_request(&api, 3, MergeMethod::Squash, true).await.unwrap();
        assert_eq!(api.merged(), vec![(3, MergeMethod::Squash)]);
        assert_eq!(api.deleted_branches(), vec!["feature/x"]);
    }

    #[tokio::test]
    async fn test_merge_keeps_branch_by_default() {
        let api = MockGitHub::new().with_pull_request(pr(3, "feature/x", "main"));

        merge_pull_request(&api, 3, MergeMethod::Rebase, false).await.unwrap();
        assert!(api.deleted_branches().is_empty());
    }
}
