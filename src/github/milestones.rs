//! Version-scoped milestone management and milestone-driven release notes.
//!
//! Milestones are named `release/{version}`. Everything here is best-effort
//! housekeeping around a release: failures are logged and swallowed so they
//! never abort the release itself.

use log::{debug, info, warn};

use crate::error::Result;
use crate::github::api::GitHubApi;
use crate::github::issues::{estimate_tokens, issue_details, DEFAULT_ISSUE_TOKEN_BUDGET};
use crate::github::types::{Issue, ItemState, Milestone};

/// Default token budget for release notes assembled from milestone issues.
pub const DEFAULT_RELEASE_NOTES_TOKEN_BUDGET: usize = 50_000;

/// Milestone title for a version.
pub fn milestone_title(version: &str) -> String {
    format!("release/{version}")
}

/// The milestone with exactly this title, open or closed.
pub async fn find_milestone_by_title(
    api: &dyn GitHubApi,
    title: &str,
) -> Result<Option<Milestone>> {
    debug!("Searching for milestone: {title}");
    let milestones = api.list_milestones().await?;
    Ok(milestones.into_iter().find(|m| m.title == title))
}

/// Open issues assigned to a milestone, excluding pull requests.
pub async fn open_issues_for_milestone(
    api: &dyn GitHubApi,
    milestone_number: u64,
) -> Result<Vec<Issue>> {
    let issues = api
        .list_issues(ItemState::Open, Some(milestone_number), 100)
        .await?;
    Ok(issues.into_iter().filter(|i| !i.is_pull_request()).collect())
}

/// Issues in a milestone that were closed as completed, excluding pull
/// requests.
pub async fn closed_issues_for_milestone(
    api: &dyn GitHubApi,
    milestone_number: u64,
    limit: usize,
) -> Result<Vec<Issue>> {
    let issues = api
        .list_issues(ItemState::Closed, Some(milestone_number), limit)
        .await?;
    Ok(issues
        .into_iter()
        .filter(|i| !i.is_pull_request() && i.state_reason.as_deref() == Some("completed"))
        .collect())
}

/// Reassign every open issue in one milestone to another. Returns how many
/// issues moved.
pub async fn move_open_issues(api: &dyn GitHubApi, from: u64, to: u64) -> Result<usize> {
    let open = open_issues_for_milestone(api, from).await?;
    if open.is_empty() {
        debug!("No open issues to move from milestone #{from}");
        return Ok(0);
    }

    info!("Moving {} open issues from milestone #{from} to #{to}", open.len());
    for issue in &open {
        api.set_issue_milestone(issue.number, to).await?;
    }
    Ok(open.len())
}

/// Make sure a milestone exists for `version`, creating it if needed.
///
/// When a fresh milestone is created and the previous version's milestone is
/// already closed, its leftover open issues roll forward into the new one.
/// Never fails: milestone bookkeeping must not block a release.
pub async fn ensure_milestone_for_version(
    api: &dyn GitHubApi,
    version: &str,
    from_version: Option<&str>,
) {
    if let Err(err) = try_ensure_milestone(api, version, from_version).await {
        warn!("Milestone management failed (continuing): {err}");
    }
}

async fn try_ensure_milestone(
    api: &dyn GitHubApi,
    version: &str,
    from_version: Option<&str>,
) -> Result<()> {
    let title = milestone_title(version);
    if find_milestone_by_title(api, &title).await?.is_some() {
        info!("Milestone already exists: {title}");
        return Ok(());
    }

    let milestone = api
        .create_milestone(&title, Some(&format!("Release {version}")))
        .await?;
    info!("Milestone created: {title} (#{})", milestone.number);

    if let Some(from_version) = from_version {
        let previous_title = milestone_title(from_version);
        if let Some(previous) = find_milestone_by_title(api, &previous_title).await? {
            if previous.state == ItemState::Closed {
                let moved = move_open_issues(api, previous.number, milestone.number).await?;
                if moved > 0 {
                    info!("Moved {moved} open issues from {previous_title} to {title}");
                }
            }
        }
    }

    Ok(())
}

/// Close the milestone for `version` if it exists and is still open.
/// Never fails: milestone bookkeeping must not block a release.
pub async fn close_milestone_for_version(api: &dyn GitHubApi, version: &str) {
    let title = milestone_title(version);
    let result = async {
        match find_milestone_by_title(api, &title).await? {
            None => debug!("Milestone not found: {title}"),
            Some(m) if m.state == ItemState::Closed => {
                debug!("Milestone already closed: {title}")
            }
            Some(m) => {
                api.close_milestone(m.number).await?;
                info!("Closed milestone: {title}");
            }
        }
        Ok::<(), crate::error::ShiprError>(())
    }
    .await;

    if let Err(err) = result {
        warn!("Failed to close milestone (continuing): {err}");
    }
}

fn issue_section(details: &crate::github::issues::IssueDetails, labels: &str) -> String {
    let mut section = format!("### #{}: {}\n\n", details.number, details.title);
    if !details.body.is_empty() {
        section.push_str(&format!("**Description:**\n{}\n\n", details.body));
    }
    if !details.comments.is_empty() {
        section.push_str("**Key Discussion Points:**\n");
        for comment in &details.comments {
            let author = comment.author.as_deref().unwrap_or("unknown");
            section.push_str(&format!("- **{author}**: {}\n", comment.body));
        }
        section.push('\n');
    }
    if !labels.is_empty() {
        section.push_str(&format!("**Labels:** {labels}\n\n"));
    }
    section.push_str("---\n\n");
    section
}

/// Build release-notes markdown from the completed issues of the given
/// versions' milestones, newest first, clipped to `max_total_tokens`.
///
/// Returns an empty string when there is nothing to report or the lookups
/// fail; callers treat the result as optional enrichment.
pub async fn release_notes_from_milestones(
    api: &dyn GitHubApi,
    versions: &[String],
    max_total_tokens: usize,
) -> String {
    match try_release_notes(api, versions, max_total_tokens).await {
        Ok(notes) => notes,
        Err(err) => {
            warn!("Failed to get milestone issues for release notes (continuing): {err}");
            String::new()
        }
    }
}

async fn try_release_notes(
    api: &dyn GitHubApi,
    versions: &[String],
    max_total_tokens: usize,
) -> Result<String> {
    let mut all_issues: Vec<Issue> = Vec::new();

    for version in versions {
        let title = milestone_title(version);
        let Some(milestone) = find_milestone_by_title(api, &title).await? else {
            debug!("Milestone not found: {title}");
            continue;
        };

        let issues = closed_issues_for_milestone(api, milestone.number, 50).await?;
        if !issues.is_empty() {
            info!("Found {} closed issues in milestone {title}", issues.len());
            all_issues.extend(issues);
        }
    }

    if all_issues.is_empty() {
        debug!("No closed issues found in any milestones");
        return Ok(String::new());
    }

    all_issues.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    info!(
        "Processing {} issues for release notes (max {max_total_tokens} tokens)",
        all_issues.len()
    );

    let header = "## Issues Resolved\n\nThe following issues were resolved in this release:\n\n";
    let mut notes = header.to_string();
    let mut total_tokens = estimate_tokens(header);

    for issue in &all_issues {
        let details = issue_details(api, issue.number, DEFAULT_ISSUE_TOKEN_BUDGET).await?;
        let section = issue_section(&details, &issue.label_names());

        let section_tokens = estimate_tokens(&section);
        if total_tokens + section_tokens > max_total_tokens {
            info!("Stopping at issue #{} to stay under {max_total_tokens} tokens", issue.number);
            break;
        }

        notes.push_str(&section);
        total_tokens += section_tokens;
    }

    info!("Generated release notes from milestone issues ({total_tokens} tokens)");
    Ok(notes)
}
