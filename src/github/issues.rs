//! Issue listing and token-budgeted issue detail assembly.
//!
//! The summaries produced here feed release notes and other generated text,
//! so everything is sized in estimated tokens and clipped against a budget
//! rather than returned whole.

use log::{debug, warn};

use crate::error::Result;
use crate::github::api::GitHubApi;
use crate::github::types::{ItemState, NewIssue};

/// Default token budget for a single issue's details.
pub const DEFAULT_ISSUE_TOKEN_BUDGET: usize = 20_000;

/// Rough token estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// One comment kept within an issue's token budget.
#[derive(Debug, Clone)]
pub struct CommentSnippet {
    pub author: Option<String>,
    pub body: String,
}

/// An issue's title, body and as many comments as the budget admits.
#[derive(Debug, Clone)]
pub struct IssueDetails {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub comments: Vec<CommentSnippet>,
    pub total_tokens: usize,
}

/// Fetch an issue with its discussion, stopping at `max_tokens`.
///
/// Comments are appended in order until the next one would exceed the
/// budget. When the title and body alone consume 90% of the budget the
/// comment fetch is skipped entirely. A failed comment fetch degrades to
/// title and body only.
pub async fn issue_details(
    api: &dyn GitHubApi,
    number: u64,
    max_tokens: usize,
) -> Result<IssueDetails> {
    let issue = api.get_issue(number).await?;
    let body = issue.body.clone().unwrap_or_default();

    let mut details = IssueDetails {
        number,
        title: issue.title.clone(),
        body,
        comments: Vec::new(),
        total_tokens: 0,
    };

    let mut tokens = estimate_tokens(&details.title) + estimate_tokens(&details.body);
    if tokens * 10 >= max_tokens * 9 {
        debug!("Issue #{number} title/body already uses {tokens} tokens, skipping comments");
        details.total_tokens = tokens;
        return Ok(details);
    }

    match api.list_issue_comments(number).await {
        Ok(comments) => {
            for comment in comments {
                let body = comment.body.unwrap_or_default();
                let comment_tokens = estimate_tokens(&body);
                if tokens + comment_tokens > max_tokens {
                    debug!("Stopping at comment to stay under {max_tokens} tokens for issue #{number}");
                    break;
                }
                details.comments.push(CommentSnippet {
                    author: comment.user.map(|u| u.login),
                    body,
                });
                tokens += comment_tokens;
            }
        }
        Err(err) => debug!("Failed to get comments for issue #{number}: {err}"),
    }

    details.total_tokens = tokens;
    Ok(details)
}

fn clip(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Plain-text digest of recently updated open issues, newest first.
/// Pull requests are excluded. Returns an empty string on failure so
/// callers can treat the summary as optional context.
pub async fn open_issues_summary(api: &dyn GitHubApi, limit: usize) -> String {
    let issues = match api.list_issues(ItemState::Open, None, limit).await {
        Ok(issues) => issues,
        Err(err) => {
            warn!("Failed to fetch open issues: {err}");
            return String::new();
        }
    };

    let sections: Vec<String> = issues
        .iter()
        .filter(|issue| !issue.is_pull_request())
        .take(limit)
        .map(|issue| {
            let labels = issue.label_names();
            let body = issue
                .body
                .as_deref()
                .filter(|b| !b.is_empty())
                .map(|b| clip(b, 500))
                .unwrap_or_else(|| "No description".to_string());
            [
                format!("Issue #{}: {}", issue.number, issue.title),
                format!("Labels: {}", if labels.is_empty() { "none".into() } else { labels }),
                format!("Created: {}", issue.created_at),
                format!("Updated: {}", issue.updated_at),
                format!("Body: {body}"),
                "---".to_string(),
            ]
            .join("\n")
        })
        .collect();

    sections.join("\n\n")
}

/// Open a new issue; returns it with its assigned number.
pub async fn create_issue(
    api: &dyn GitHubApi,
    title: &str,
    body: &str,
    labels: Vec<String>,
) -> Result<crate::github::types::Issue> {
    let issue = api
        .create_issue(&NewIssue {
            title: title.to_string(),
            body: body.to_string(),
            labels,
        })
        .await?;
    debug!("Created issue #{}: {}", issue.number, issue.html_url);
    Ok(issue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::api::MockGitHub;
    use crate::github::types::{Issue, IssueComment, Label, User};
    use chrono::Utc;

    fn issue(number: u64, title: &str, body: &str) -> Issue {
        Issue {
            number,
            title: title.to_string(),
            body: Some(body.to_string()),
            state: ItemState::Open,
            labels: Vec::new(),
            html_url: format!("https://github.com/acme/widget/issues/{number}"),
            milestone: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            closed_at: None,
            state_reason: None,
            pull_request: None,
        }
    }

    fn comment(author: &str, body: &str) -> IssueComment {
        IssueComment {
            body: Some(body.to_string()),
            user: Some(User {
                login: author.to_string(),
            }),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[tokio::test]
    async fn test_issue_details_includes_comments_within_budget() {
        let api = MockGitHub::new()
            .with_issue(issue(1, "Bug", "it breaks"))
            .with_comments(1, vec![comment("alice", "repro attached"), comment("bob", "fixed")]);

        let details = issue_details(&api, 1, 1000).await.unwrap();
        assert_eq!(details.comments.len(), 2);
        assert_eq!(details.comments[0].author.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_issue_details_stops_at_budget() {
        let api = MockGitHub::new()
            .with_issue(issue(1, "Bug", "short"))
            .with_comments(
                1,
                vec![comment("alice", &"x".repeat(200)), comment("bob", &"y".repeat(200))],
            );

        // title+body ~3 tokens, each comment 50: only the first fits in 60
        let details = issue_details(&api, 1, 60).await.unwrap();
        assert_eq!(details.comments.len(), 1);
        assert!(details.total_tokens <= 60);
    }

    #[tokio::test]
    async fn test_issue_details_skips_comments_when_body_near_budget() {
        let api = MockGitHub::new()
            .with_issue(issue(1, "Big", &"z".repeat(400)))
            .with_comments(1, vec![comment("alice", "hi")]);

        // body alone is ~100 tokens, budget 105: over the 90% threshold
        let details = issue_details(&api, 1, 105).await.unwrap();
        assert!(details.comments.is_empty());
    }

    #[tokio::test]
    async fn test_open_issues_summary_excludes_pull_requests() {
        let mut pr_issue = issue(2, "A PR", "body");
        pr_issue.pull_request = Some(serde_json::json!({"url": "..."}));
        let api = MockGitHub::new()
            .with_issue(issue(1, "Real issue", "body"))
            .with_issue(pr_issue);

        let summary = open_issues_summary(&api, 10).await;
        assert!(summary.contains("Issue #1: Real issue"));
        assert!(!summary.contains("A PR"));
    }

    #[tokio::test]
    async fn test_open_issues_summary_shows_labels() {
        let mut tagged = issue(1, "Tagged", "body");
        tagged.labels = vec![Label { name: "bug".into() }, Label { name: "p1".into() }];
        let api = MockGitHub::new().with_issue(tagged);

        let summary = open_issues_summary(&api, 10).await;
        assert!(summary.contains("Labels: bug, p1"));
    }

    #[tokio::test]
    async fn test_open_issues_summary_empty_when_no_issues() {
        let api = MockGitHub::new();
        assert_eq!(open_issues_summary(&api, 10).await, "");
    }
}
