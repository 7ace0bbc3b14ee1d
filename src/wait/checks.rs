//! Reconciliation loop for pull request check runs.
//!
//! Polls the checks attached to a PR's head commit until every one
//! completes, any one fails, or the loop convinces itself that checks are
//! never going to appear. Absence is ambiguous: an empty poll may mean CI
//! has not started yet, or that nothing is configured to run at all. After
//! enough consecutive empty polls the loop investigates the repository
//! once, and routes whatever it learns through the confirmation gate
//! instead of spinning forever.

use std::time::Duration;

use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio::time::sleep;

use crate::confirm::ConfirmationGate;
use crate::error::{FailedCheck, Result, ShiprError};
use crate::github::api::GitHubApi;
use crate::github::types::{CheckRun, PullRequest, RunStatus};
use crate::wait::state::{WaitOutcome, WaitState};

/// Consecutive empty polls before the loop investigates the repository.
const MAX_CONSECUTIVE_MISSES: u32 = 3;

/// A run on the PR's branch this recent counts as evidence that CI noticed
/// the PR even if no check runs are attached yet.
const BRANCH_RUN_RECENCY: Duration = Duration::from_secs(300);

/// Tunables for [`wait_for_pull_request_checks`].
#[derive(Debug, Clone)]
pub struct CheckWaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Skip the confirmation gate: proceed on every absence branch, fail
    /// hard on timeout.
    pub skip_confirmation: bool,
}

impl Default for CheckWaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(10),
            skip_confirmation: false,
        }
    }
}

/// Wait until the PR's checks all complete, a check fails, or the loop
/// decides checks will never arrive.
pub async fn wait_for_pull_request_checks(
    api: &dyn GitHubApi,
    gate: &dyn ConfirmationGate,
    pr_number: u64,
    options: &CheckWaitOptions,
) -> Result<WaitOutcome> {
    let mut state = WaitState::new();

    loop {
        if state.timed_out(options.timeout) {
            warn!(
                "Timeout reached ({}s) while waiting for PR #{pr_number} checks",
                options.timeout.as_secs()
            );
            if options.skip_confirmation {
                return Err(ShiprError::CheckTimeout {
                    pr_number,
                    timeout_secs: options.timeout.as_secs(),
                });
            }
            let proceed = gate
                .confirm(&format!(
                    "Timeout reached while waiting for PR #{pr_number} checks.\n\
                     This might indicate that no checks are configured for this repository.\n\
                     Do you want to proceed with merging the PR without waiting for checks?"
                ))
                .await;
            if proceed {
                info!("User chose to proceed without waiting for checks");
                return Ok(WaitOutcome::ProceededWithoutSignals);
            }
            return Err(ShiprError::UserDeclined(format!(
                "Timeout waiting for PR #{pr_number} checks"
            )));
        }

        let pr = api.get_pull_request(pr_number).await?;
        let checks = api.list_check_runs(&pr.head.sha).await?;

        if checks.is_empty() {
            let misses = state.record_empty();
            info!("PR #{pr_number}: no checks found ({misses}/{MAX_CONSECUTIVE_MISSES}), waiting");

            if misses >= MAX_CONSECUTIVE_MISSES {
                if let Some(outcome) =
                    investigate_missing_checks(api, gate, &pr, &mut state, options).await?
                {
                    return Ok(outcome);
                }
            }

            sleep(options.poll_interval).await;
            continue;
        }

        state.record_signals();

        let failing: Vec<&CheckRun> = checks.iter().filter(|c| c.is_failing()).collect();
        if !failing.is_empty() {
            return Err(checks_failed_error(api, pr_number, &failing).await);
        }

        if checks.iter().all(|c| c.status == RunStatus::Completed) {
            info!("All checks for PR #{pr_number} have completed successfully");
            return Ok(WaitOutcome::Succeeded);
        }

        let completed = checks
            .iter()
            .filter(|c| c.status == RunStatus::Completed)
            .count();
        info!(
            "PR #{pr_number} checks: {completed}/{} completed, waiting",
            checks.len()
        );
        sleep(options.poll_interval).await;
    }
}

/// Pass an absence verdict through the confirmation gate. In
/// non-interactive mode every absence verdict proceeds.
async fn absence_verdict(
    gate: &dyn ConfirmationGate,
    skip_confirmation: bool,
    prompt: String,
    declined: String,
    proceeding: &str,
) -> Result<WaitOutcome> {
    if skip_confirmation {
        info!("{proceeding}");
        return Ok(WaitOutcome::ProceededWithoutSignals);
    }
    if gate.confirm(&prompt).await {
        info!("User chose to proceed without checks");
        return Ok(WaitOutcome::ProceededWithoutSignals);
    }
    Err(ShiprError::UserDeclined(declined))
}

/// Figure out why no checks have appeared and decide whether to stop
/// waiting. `Ok(None)` means keep polling.
async fn investigate_missing_checks(
    api: &dyn GitHubApi,
    gate: &dyn ConfirmationGate,
    pr: &PullRequest,
    state: &mut WaitState,
    options: &CheckWaitOptions,
) -> Result<Option<WaitOutcome>> {
    let pr_number = pr.number;
    info!(
        "No checks detected for {MAX_CONSECUTIVE_MISSES} consecutive attempts, \
         checking repository configuration"
    );

    if !has_workflows_configured(api).await {
        warn!("No GitHub Actions workflows found in repository {}", api.repo());
        return absence_verdict(
            gate,
            options.skip_confirmation,
            format!(
                "No GitHub Actions workflows or checks are configured for this repository.\n\
                 PR #{pr_number} will never have status checks to wait for.\n\
                 Do you want to proceed with merging the PR without checks?"
            ),
            format!("No checks configured for PR #{pr_number}"),
            "No workflows configured, proceeding without checks",
        )
        .await
        .map(Some);
    }

    if state.begin_investigation() {
        info!("Workflows are configured, checking whether any runs were triggered for this PR");

        if !has_workflow_runs_for_pr(api, pr).await {
            warn!(
                "No workflow runs detected for PR #{pr_number}; the configured workflows \
                 may not match this branch pattern"
            );
            return absence_verdict(
                gate,
                options.skip_confirmation,
                format!(
                    "GitHub Actions workflows are configured in this repository, but none \
                     appear to be triggered by PR #{pr_number}.\n\
                     This usually means the workflow trigger patterns (branches, paths) \
                     don't match this PR.\n\
                     PR #{pr_number} will likely never have status checks to wait for.\n\
                     Do you want to proceed with merging the PR without waiting for checks?"
                ),
                format!("No matching workflow triggers for PR #{pr_number}"),
                "No workflow runs detected for this PR, proceeding without checks",
            )
            .await
            .map(Some);
        }

        info!("Found workflow runs on the branch, but none appear as PR checks");
        info!("This usually means workflows trigger on 'push' but not 'pull_request'");
        return absence_verdict(
            gate,
            options.skip_confirmation,
            format!(
                "Workflow runs exist for the branch, but no check runs are associated \
                 with PR #{pr_number}.\n\
                 This typically means workflows are configured for 'push' events but not \
                 'pull_request' events.\n\
                 Do you want to proceed with merging the PR without waiting for checks?"
            ),
            format!("No PR check runs for #{pr_number} (workflows trigger on push only)"),
            "Workflow runs exist but are not PR checks, proceeding without checks",
        )
        .await
        .map(Some);
    }

    // Already investigated once and checks still have not appeared.
    let elapsed_secs = state.elapsed().as_secs();
    warn!("Still no checks after repeated attempts for PR #{pr_number}");
    absence_verdict(
        gate,
        options.skip_confirmation,
        format!(
            "After waiting {elapsed_secs}s, no checks have appeared for PR #{pr_number}.\n\
             The configured workflows don't appear to trigger for this branch.\n\
             Do you want to proceed with merging the PR without checks?"
        ),
        format!("No workflow triggers matched PR #{pr_number} after waiting"),
        "No workflow runs detected after waiting, proceeding without checks",
    )
    .await
    .map(Some)
}

/// Does the repository define any workflows at all? Lookup failures count
/// as yes so a flaky API never short-circuits the wait.
async fn has_workflows_configured(api: &dyn GitHubApi) -> bool {
    match api.list_workflows().await {
        Ok(workflows) => !workflows.is_empty(),
        Err(err) => {
            debug!("Could not list workflows, assuming they exist: {err}");
            true
        }
    }
}

/// Did any workflow run react to this PR? Counts runs on the head commit,
/// plus very recent runs on the head branch. Lookup failures count as yes.
async fn has_workflow_runs_for_pr(api: &dyn GitHubApi, pr: &PullRequest) -> bool {
    let head_sha = &pr.head.sha;
    let head_ref = &pr.head.name;

    let (sha_runs, branch_runs) = match tokio::try_join!(
        api.list_runs_for_sha(head_sha),
        api.list_runs_for_branch(head_ref),
    ) {
        Ok(runs) => runs,
        Err(err) => {
            debug!("Error checking workflow runs for PR #{}: {err}", pr.number);
            return true;
        }
    };

    let recency_cutoff = chrono::Utc::now()
        - chrono::Duration::from_std(BRANCH_RUN_RECENCY).unwrap_or_default();
    let relevant = sha_runs
        .iter()
        .chain(branch_runs.iter())
        .filter(|run| {
            &run.head_sha == head_sha
                || (run.head_branch.as_deref() == Some(head_ref)
                    && run.created_at > recency_cutoff)
        })
        .count();

    if relevant > 0 {
        debug!("Found {relevant} workflow runs for PR #{} ({head_sha})", pr.number);
        true
    } else {
        debug!("No workflow runs found for PR #{} ({head_sha}, branch {head_ref})", pr.number);
        false
    }
}

/// Truncate a check summary for the log, keeping the cut on a char
/// boundary.
fn clip_summary(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Build the failure error, enriching each failing check with its output
/// from the single-check endpoint. Enrichment is best-effort per check.
async fn checks_failed_error(
    api: &dyn GitHubApi,
    pr_number: u64,
    failing: &[&CheckRun],
) -> ShiprError {
    let detailed = join_all(failing.iter().map(|check| async {
        let conclusion = check
            .conclusion
            .map(|c| c.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        match api.get_check_run(check.id).await {
            Ok(details) => FailedCheck {
                name: check.name.clone(),
                conclusion,
                details_url: check.details_url.clone(),
                title: details.output.title,
                summary: details.output.summary,
            },
            Err(err) => {
                debug!("Could not fetch details for check {}: {err}", check.name);
                FailedCheck {
                    name: check.name.clone(),
                    conclusion,
                    details_url: check.details_url.clone(),
                    title: None,
                    summary: None,
                }
            }
        }
    }))
    .await;

    error!("PR #{pr_number} has {} failing check(s):", detailed.len());
    for check in &detailed {
        error!("  {} : {}", check.name, check.conclusion);
        if let Some(title) = check.title.as_deref().filter(|t| *t != check.name) {
            error!("    Issue: {title}");
        }
        if let Some(summary) = &check.summary {
            error!("    Summary: {}", clip_summary(summary, 200));
        }
        if let Some(url) = &check.details_url {
            error!("    Details: {url}");
        }
    }

    let failed = ShiprError::ChecksFailed {
        pr_number,
        failed: detailed,
        pr_url: api.repo().pull_url(pr_number),
    };
    if let Some(instructions) = failed.recovery_instructions() {
        for line in instructions.lines() {
            error!("{line}");
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::StaticGate;
    use crate::github::api::MockGitHub;
    use crate::github::types::{
        BranchRef, CheckOutput, CheckRunDetails, Conclusion, ItemState, Workflow, WorkflowRun,
    };

    fn fast_options(skip_confirmation: bool) -> CheckWaitOptions {
        CheckWaitOptions {
            timeout: Duration::from_secs(3600),
            poll_interval: Duration::ZERO,
            skip_confirmation,
        }
    }

    fn pr(number: u64) -> PullRequest {
        PullRequest {
            number,
            title: format!("PR {number}"),
            html_url: format!("https://github.com/acme/widget/pull/{number}"),
            state: ItemState::Open,
            head: BranchRef {
                name: "feature/x".to_string(),
                sha: "abc123".to_string(),
            },
            base: BranchRef {
                name: "main".to_string(),
                sha: "def456".to_string(),
            },
            labels: Vec::new(),
        }
    }

    fn check(id: u64, name: &str, status: RunStatus, conclusion: Option<Conclusion>) -> CheckRun {
        CheckRun {
            id,
            name: name.to_string(),
            status,
            conclusion,
            details_url: Some(format!("https://github.com/acme/widget/runs/{id}")),
        }
    }

    fn ci_workflow() -> Workflow {
        Workflow {
            id: 1,
            name: "CI".to_string(),
            path: ".github/workflows/ci.yml".to_string(),
        }
    }

    fn branch_run(created_at: chrono::DateTime<chrono::Utc>) -> WorkflowRun {
        WorkflowRun {
            id: 50,
            name: "CI".to_string(),
            status: RunStatus::Completed,
            conclusion: Some(Conclusion::Success),
            html_url: "https://github.com/acme/widget/actions/runs/50".to_string(),
            created_at,
            event: "push".to_string(),
            head_branch: Some("feature/x".to_string()),
            head_sha: "other-sha".to_string(),
        }
    }

    #[tokio::test]
    async fn test_succeeds_when_all_checks_complete() {
        let api = MockGitHub::new()
            .with_pull_request(pr(1))
            .push_check_runs(vec![check(1, "build", RunStatus::InProgress, None)])
            .push_check_runs(vec![check(
                1,
                "build",
                RunStatus::Completed,
                Some(Conclusion::Success),
            )]);
        let gate = StaticGate::new(false);

        let outcome = wait_for_pull_request_checks(&api, &gate, 1, &fast_options(false))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Succeeded);
        assert!(gate.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_neutral_and_skipped_conclusions_succeed() {
        let api = MockGitHub::new().with_pull_request(pr(1)).push_check_runs(vec![
            check(1, "lint", RunStatus::Completed, Some(Conclusion::Neutral)),
            check(2, "docs", RunStatus::Completed, Some(Conclusion::Skipped)),
        ]);
        let gate = StaticGate::new(false);

        let outcome = wait_for_pull_request_checks(&api, &gate, 1, &fast_options(false))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Succeeded);
    }

    #[tokio::test]
    async fn test_failing_check_produces_enriched_error() {
        let api = MockGitHub::new()
            .with_pull_request(pr(1))
            .push_check_runs(vec![check(
                7,
                "test",
                RunStatus::Completed,
                Some(Conclusion::Failure),
            )])
            .with_check_details(CheckRunDetails {
                id: 7,
                name: "test".to_string(),
                status: RunStatus::Completed,
                conclusion: Some(Conclusion::Failure),
                details_url: None,
                output: CheckOutput {
                    title: Some("3 tests failed".to_string()),
                    summary: Some("assertion failed in parser".to_string()),
                    text: None,
                },
            });
        let gate = StaticGate::new(true);

        let err = wait_for_pull_request_checks(&api, &gate, 1, &fast_options(false))
            .await
            .unwrap_err();
        match err {
            ShiprError::ChecksFailed { pr_number, failed, pr_url } => {
                assert_eq!(pr_number, 1);
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].conclusion, "failure");
                assert_eq!(failed[0].title.as_deref(), Some("3 tests failed"));
                assert_eq!(failed[0].summary.as_deref(), Some("assertion failed in parser"));
                assert_eq!(pr_url, "https://github.com/acme/widget/pull/1");
            }
            other => panic!("unexpected error: {other}"),
        }
        // failure is terminal, never a gate question
        assert!(gate.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_failing_check_with_long_multibyte_summary() {
        // 300 bytes of three-byte chars; the log clip must not split one
        let api = MockGitHub::new()
            .with_pull_request(pr(1))
            .push_check_runs(vec![check(
                7,
                "test",
                RunStatus::Completed,
                Some(Conclusion::Failure),
            )])
            .with_check_details(CheckRunDetails {
                id: 7,
                name: "test".to_string(),
                status: RunStatus::Completed,
                conclusion: Some(Conclusion::Failure),
                details_url: None,
                output: CheckOutput {
                    title: None,
                    summary: Some("€".repeat(100)),
                    text: None,
                },
            });
        let gate = StaticGate::new(true);

        let err = wait_for_pull_request_checks(&api, &gate, 1, &fast_options(false))
            .await
            .unwrap_err();
        assert!(matches!(err, ShiprError::ChecksFailed { pr_number: 1, .. }));
    }

    #[test]
    fn test_clip_summary_respects_char_boundaries() {
        let summary = "€".repeat(100);
        let clipped = clip_summary(&summary, 200);
        // 200 is inside the 67th '€'; the cut backs off to 198
        assert_eq!(clipped, format!("{}...", "€".repeat(66)));
        assert_eq!(clip_summary("short", 200), "short");
    }

    #[tokio::test]
    async fn test_one_failure_among_successes_fails() {
        let api = MockGitHub::new()
            .with_pull_request(pr(1))
            .push_check_runs(vec![
                check(1, "build", RunStatus::Completed, Some(Conclusion::Success)),
                check(2, "test", RunStatus::Completed, Some(Conclusion::Failure)),
            ])
            .failing_check_details();
        let gate = StaticGate::new(true);

        let err = wait_for_pull_request_checks(&api, &gate, 1, &fast_options(false))
            .await
            .unwrap_err();
        match err {
            ShiprError::ChecksFailed { failed, .. } => {
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].name, "test");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_failing_check_degrades_without_details() {
        let api = MockGitHub::new()
            .with_pull_request(pr(1))
            .push_check_runs(vec![check(
                7,
                "test",
                RunStatus::Completed,
                Some(Conclusion::TimedOut),
            )])
            .failing_check_details();
        let gate = StaticGate::new(true);

        let err = wait_for_pull_request_checks(&api, &gate, 1, &fast_options(false))
            .await
            .unwrap_err();
        match err {
            ShiprError::ChecksFailed { failed, .. } => {
                assert_eq!(failed[0].conclusion, "timed_out");
                assert!(failed[0].title.is_none());
                assert!(failed[0].summary.is_none());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_no_workflows_gate_accepts() {
        // no workflows configured, checks never appear
        let api = MockGitHub::new().with_pull_request(pr(1)).push_check_runs(vec![]);
        let gate = StaticGate::new(true);

        let outcome = wait_for_pull_request_checks(&api, &gate, 1, &fast_options(false))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::ProceededWithoutSignals);

        let prompts = gate.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("No GitHub Actions workflows"));
    }

    #[tokio::test]
    async fn test_no_workflows_gate_declines() {
        let api = MockGitHub::new().with_pull_request(pr(1)).push_check_runs(vec![]);
        let gate = StaticGate::new(false);

        let err = wait_for_pull_request_checks(&api, &gate, 1, &fast_options(false))
            .await
            .unwrap_err();
        assert!(matches!(err, ShiprError::UserDeclined(_)));
        assert!(err.to_string().contains("User chose not to proceed"));
    }

    #[tokio::test]
    async fn test_no_workflows_non_interactive_proceeds() {
        let api = MockGitHub::new().with_pull_request(pr(1)).push_check_runs(vec![]);
        let gate = StaticGate::new(false);

        let outcome = wait_for_pull_request_checks(&api, &gate, 1, &fast_options(true))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::ProceededWithoutSignals);
        assert!(gate.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_workflows_without_runs_gate() {
        let api = MockGitHub::new()
            .with_pull_request(pr(1))
            .push_check_runs(vec![])
            .with_workflow(ci_workflow());
        let gate = StaticGate::new(true);

        let outcome = wait_for_pull_request_checks(&api, &gate, 1, &fast_options(false))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::ProceededWithoutSignals);
        assert!(gate.prompts()[0].contains("none appear to be triggered by PR #1"));
    }

    #[tokio::test]
    async fn test_branch_runs_without_pr_checks_gate() {
        let api = MockGitHub::new()
            .with_pull_request(pr(1))
            .push_check_runs(vec![])
            .with_workflow(ci_workflow())
            .with_runs_for_branch(vec![branch_run(chrono::Utc::now())]);
        let gate = StaticGate::new(true);

        let outcome = wait_for_pull_request_checks(&api, &gate, 1, &fast_options(false))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::ProceededWithoutSignals);
        assert!(gate.prompts()[0].contains("no check runs are associated with PR #1"));
    }

    #[tokio::test]
    async fn test_stale_branch_runs_do_not_count() {
        let old = chrono::Utc::now() - chrono::Duration::minutes(10);
        let api = MockGitHub::new()
            .with_pull_request(pr(1))
            .push_check_runs(vec![])
            .with_workflow(ci_workflow())
            .with_runs_for_branch(vec![branch_run(old)]);
        let gate = StaticGate::new(true);

        wait_for_pull_request_checks(&api, &gate, 1, &fast_options(false))
            .await
            .unwrap();
        // the ten-minute-old run is outside the recency window, so the
        // verdict is "no runs for this PR", not "runs exist on branch"
        assert!(gate.prompts()[0].contains("none appear to be triggered by PR #1"));
    }

    #[tokio::test]
    async fn test_run_lookup_failure_assumes_runs_exist() {
        let api = MockGitHub::new()
            .with_pull_request(pr(1))
            .push_check_runs(vec![])
            .with_workflow(ci_workflow())
            .failing_run_lookup();
        let gate = StaticGate::new(true);

        wait_for_pull_request_checks(&api, &gate, 1, &fast_options(false))
            .await
            .unwrap();
        assert!(gate.prompts()[0].contains("no check runs are associated with PR #1"));
    }

    #[tokio::test]
    async fn test_timeout_interactive_declined() {
        let api = MockGitHub::new().with_pull_request(pr(1));
        let gate = StaticGate::new(false);
        let options = CheckWaitOptions {
            timeout: Duration::ZERO,
            ..fast_options(false)
        };

        let err = wait_for_pull_request_checks(&api, &gate, 1, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ShiprError::UserDeclined(_)));
        assert!(gate.prompts()[0].contains("Timeout reached"));
    }

    #[tokio::test]
    async fn test_timeout_non_interactive_is_hard_error() {
        let api = MockGitHub::new().with_pull_request(pr(1));
        let gate = StaticGate::new(true);
        let options = CheckWaitOptions {
            timeout: Duration::ZERO,
            ..fast_options(true)
        };

        let err = wait_for_pull_request_checks(&api, &gate, 1, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ShiprError::CheckTimeout { pr_number: 1, .. }));
        assert!(gate.prompts().is_empty());
    }
}
