//! Reconciliation loop for workflows triggered by a release.
//!
//! Release-triggered runs are not attached to the release object, so
//! attribution is inferred: a run belongs to the release when it started
//! after the release was created (less a clock-skew buffer), or, when the
//! release itself cannot be fetched, when the run is recent enough. The
//! loop re-discovers the run set on every poll so late-starting workflows
//! are picked up.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::time::sleep;

use crate::confirm::ConfirmationGate;
use crate::error::{FailedRun, Result, ShiprError};
use crate::github::api::GitHubApi;
use crate::github::releases::find_release_by_tag;
use crate::github::types::{RunStatus, WorkflowRun};
use crate::wait::state::{WaitOutcome, WaitState};

/// Consecutive empty discoveries before concluding nothing will trigger.
const MAX_CONSECUTIVE_MISSES: u32 = 20;

/// Runs may be stamped slightly before the release due to clock skew.
const CLOCK_SKEW_BUFFER: chrono::Duration = chrono::Duration::seconds(60);

/// Without release metadata, only runs this young are attributed.
const FALLBACK_RUN_AGE: chrono::Duration = chrono::Duration::minutes(30);

/// Tunables for [`wait_for_release_workflows`].
#[derive(Debug, Clone)]
pub struct WorkflowWaitOptions {
    pub timeout: Duration,
    /// Delay before the first discovery; GitHub takes a moment to fan a
    /// release out to its workflows.
    pub initial_delay: Duration,
    /// Poll interval while runs are in flight.
    pub poll_interval: Duration,
    /// Poll interval while discovery keeps coming back empty.
    pub miss_interval: Duration,
    /// Only track these workflows; `None` tracks everything attributable.
    pub workflow_names: Option<Vec<String>>,
    /// Skip the confirmation gate: proceed when nothing triggers, fail
    /// hard on timeout.
    pub skip_confirmation: bool,
}

impl Default for WorkflowWaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1800),
            initial_delay: Duration::from_secs(20),
            poll_interval: Duration::from_secs(15),
            miss_interval: Duration::from_secs(10),
            workflow_names: None,
            skip_confirmation: false,
        }
    }
}

/// Workflow runs attributable to the release `tag`, newest first.
///
/// Failures degrade to an empty set: a discovery error looks like "nothing
/// triggered yet" and the loop's miss counting deals with it.
pub async fn discover_release_runs(
    api: &dyn GitHubApi,
    tag: &str,
    workflow_names: Option<&[String]>,
) -> Vec<WorkflowRun> {
    let cutoff = release_cutoff(api, tag).await;

    let workflows = match api.list_workflows().await {
        Ok(workflows) => workflows,
        Err(err) => {
            error!("Failed to list workflows for release {tag}: {err}");
            return Vec::new();
        }
    };

    let tracked = workflows.iter().filter(|workflow| match workflow_names {
        Some(names) if !names.is_empty() => names.iter().any(|n| n == &workflow.name),
        _ => true,
    });

    let now = Utc::now();
    let mut runs: Vec<WorkflowRun> = Vec::new();
    for workflow in tracked {
        let history = match api.list_workflow_runs(workflow.id).await {
            Ok(history) => history,
            Err(err) => {
                warn!("Failed to get runs for workflow {}: {err}", workflow.name);
                continue;
            }
        };

        runs.extend(history.into_iter().filter(|run| match cutoff {
            Some(cutoff) => run.created_at >= cutoff,
            None => now - run.created_at <= FALLBACK_RUN_AGE,
        }));
    }

    runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    debug!("Found {} workflow runs attributed to release {tag}", runs.len());
    runs
}

/// Earliest creation time a run may have and still belong to the release.
/// `None` when the release cannot be fetched.
async fn release_cutoff(api: &dyn GitHubApi, tag: &str) -> Option<DateTime<Utc>> {
    match find_release_by_tag(api, tag).await {
        Ok(Some(release)) => release.created_at.map(|created| created - CLOCK_SKEW_BUFFER),
        Ok(None) => None,
        Err(err) => {
            debug!("Could not get release info for {tag}: {err}. Using permissive filtering");
            None
        }
    }
}

/// Wait until every workflow triggered by the release completes, any run
/// fails, or the loop concludes nothing is going to trigger.
///
/// A failing run is a hard error with no gate: the release artifacts are
/// live and a human has to look at the broken pipeline either way.
pub async fn wait_for_release_workflows(
    api: &dyn GitHubApi,
    gate: &dyn ConfirmationGate,
    tag: &str,
    options: &WorkflowWaitOptions,
) -> Result<WaitOutcome> {
    info!("Waiting for workflows triggered by release {tag}");
    debug!(
        "Waiting {}s for workflows to start",
        options.initial_delay.as_secs()
    );
    sleep(options.initial_delay).await;

    let mut state = WaitState::new();

    loop {
        if state.timed_out(options.timeout) {
            warn!(
                "Timeout reached ({}s) while waiting for release workflows",
                options.timeout.as_secs()
            );
            if options.skip_confirmation {
                return Err(ShiprError::WorkflowTimeout {
                    tag: tag.to_string(),
                    timeout_secs: options.timeout.as_secs(),
                });
            }
            let proceed = gate
                .confirm(&format!(
                    "Timeout reached while waiting for release workflows for {tag}.\n\
                     This might indicate that no workflows are configured to trigger on releases.\n\
                     Do you want to proceed anyway?"
                ))
                .await;
            if proceed {
                info!("User chose to proceed without waiting for release workflows");
                return Ok(WaitOutcome::ProceededWithoutSignals);
            }
            return Err(ShiprError::UserDeclined(format!(
                "Timeout waiting for release workflows for {tag}"
            )));
        }

        let runs = discover_release_runs(api, tag, options.workflow_names.as_deref()).await;

        if runs.is_empty() {
            let misses = state.record_empty();
            info!("No release workflows found ({misses}/{MAX_CONSECUTIVE_MISSES}), waiting");

            if misses == 1 {
                match options.workflow_names.as_deref() {
                    Some(names) if !names.is_empty() => {
                        debug!("Specific workflows to monitor: {}", names.join(", "))
                    }
                    _ => debug!("Monitoring all workflows that might be triggered by releases"),
                }
            }

            if misses >= MAX_CONSECUTIVE_MISSES {
                warn!("No workflows triggered by release {tag} after {MAX_CONSECUTIVE_MISSES} attempts");
                if options.skip_confirmation {
                    info!("No release workflows found, proceeding");
                    return Ok(WaitOutcome::ProceededWithoutSignals);
                }
                let proceed = gate
                    .confirm(&format!(
                        "No GitHub Actions workflows appear to be triggered by the release {tag}.\n\
                         This might be expected if no workflows are configured for release events.\n\
                         Do you want to proceed without waiting for workflows?"
                    ))
                    .await;
                if proceed {
                    info!("User chose to proceed without release workflows");
                    return Ok(WaitOutcome::ProceededWithoutSignals);
                }
                return Err(ShiprError::UserDeclined(format!(
                    "No release workflows found for {tag}"
                )));
            }

            sleep(options.miss_interval).await;
            continue;
        }

        state.record_signals();

        let failing: Vec<&WorkflowRun> = runs.iter().filter(|run| run.is_failing()).collect();
        if !failing.is_empty() {
            error!("Release workflows for {tag} have failures:");
            let failed: Vec<FailedRun> = failing
                .iter()
                .map(|run| {
                    let conclusion = run
                        .conclusion
                        .map(|c| c.as_str().to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    error!("- {}: {conclusion} ({})", run.name, run.html_url);
                    FailedRun {
                        name: run.name.clone(),
                        conclusion,
                        html_url: run.html_url.clone(),
                    }
                })
                .collect();
            let err = ShiprError::WorkflowsFailed {
                tag: tag.to_string(),
                failed,
            };
            if let Some(instructions) = err.recovery_instructions() {
                for line in instructions.lines() {
                    error!("{line}");
                }
            }
            return Err(err);
        }

        if runs.iter().all(|run| run.status == RunStatus::Completed) {
            info!(
                "All {} release workflows for {tag} completed successfully",
                runs.len()
            );
            for run in &runs {
                info!(
                    "  {} : {}",
                    run.name,
                    run.conclusion.map(|c| c.as_str()).unwrap_or("unknown")
                );
            }
            return Ok(WaitOutcome::Succeeded);
        }

        let completed = runs.iter().filter(|r| r.status == RunStatus::Completed).count();
        let running = runs.iter().filter(|r| r.status == RunStatus::InProgress).count();
        let queued = runs.iter().filter(|r| r.status == RunStatus::Queued).count();
        info!(
            "Release workflows for {tag}: {completed} completed, {running} running, \
             {queued} queued ({} total)",
            runs.len()
        );

        sleep(options.poll_interval).await;
    }
}
