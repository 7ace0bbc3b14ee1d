//! reqwest-backed GitHub REST client.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{debug, trace};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::{Result, ShiprError};
use crate::github::api::GitHubApi;
use crate::github::types::{
    CheckRun, CheckRunDetails, Issue, IssueComment, ItemState, MergeMethod, Milestone, NewIssue,
    NewPullRequest, NewRelease, PullRequest, Release, Workflow, WorkflowRun,
};
use crate::repo::RepoIdentity;

const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";

// List endpoints wrap their arrays in an envelope object.
#[derive(Deserialize)]
struct CheckRunList {
    check_runs: Vec<CheckRun>,
}

#[derive(Deserialize)]
struct WorkflowList {
    workflows: Vec<Workflow>,
}

#[derive(Deserialize)]
struct WorkflowRunList {
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Deserialize)]
struct ContentFile {
    content: String,
}

fn error_message_from_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Base64 content from the contents API arrives with embedded newlines.
fn decode_content(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| ShiprError::Api {
            status: 0,
            message: format!("invalid base64 in contents response: {e}"),
        })?;
    String::from_utf8(bytes).map_err(|e| ShiprError::Api {
        status: 0,
        message: format!("contents response is not UTF-8: {e}"),
    })
}

pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    repo: RepoIdentity,
}

impl GitHubClient {
    pub fn new(repo: RepoIdentity, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ShiprError::Token("token contains invalid header characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("shipr"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));

        let client = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: DEFAULT_API_URL.to_string(),
            repo,
        })
    }

    /// Build a client authenticated from `GITHUB_TOKEN` (or `GH_TOKEN`).
    pub fn from_env(repo: RepoIdentity) -> Result<Self> {
        let token = std::env::var("GITHUB_TOKEN")
            .or_else(|_| std::env::var("GH_TOKEN"))
            .map_err(|_| ShiprError::Token("set GITHUB_TOKEN or GH_TOKEN".into()))?;
        Self::new(repo, &token)
    }

    /// Point the client at a different API root (GitHub Enterprise, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        let trimmed = self.base_url.trim_end_matches('/').len();
        self.base_url.truncate(trimmed);
        self
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{path}",
            self.base_url, self.repo.owner, self.repo.repo
        )
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ShiprError::Api {
            status: status.as_u16(),
            message: error_message_from_body(&body),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(path);
        trace!("GET {url} {query:?}");
        let response = self.client.get(&url).query(query).send().await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = self.url(path);
        debug!("{method} {url}");
        let response = self.client.request(method, &url).json(body).send().await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn send_no_content(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<()> {
        let url = self.url(path);
        debug!("{method} {url}");
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        Self::check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    fn repo(&self) -> &RepoIdentity {
        &self.repo
    }

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        self.get_json(&format!("/pulls/{number}"), &[]).await
    }

    async fn list_open_pull_requests_by_head(&self, head: &str) -> Result<Vec<PullRequest>> {
        self.get_json(
            "/pulls",
            &[
                ("state", "open".to_string()),
                ("head", format!("{}:{head}", self.repo.owner)),
            ],
        )
        .await
    }

    async fn create_pull_request(&self, new: &NewPullRequest) -> Result<PullRequest> {
        self.send_json(reqwest::Method::POST, "/pulls", &serde_json::to_value(new)?)
            .await
    }

    async fn merge_pull_request(&self, number: u64, method: MergeMethod) -> Result<()> {
        self.send_no_content(
            reqwest::Method::PUT,
            &format!("/pulls/{number}/merge"),
            Some(&json!({ "merge_method": method.as_str() })),
        )
        .await
    }

    async fn delete_branch(&self, branch: &str) -> Result<()> {
        self.send_no_content(
            reqwest::Method::DELETE,
            &format!("/git/refs/heads/{branch}"),
            None,
        )
        .await
    }

    async fn list_check_runs(&self, sha: &str) -> Result<Vec<CheckRun>> {
        let list: CheckRunList = self
            .get_json(
                &format!("/commits/{sha}/check-runs"),
                &[("per_page", "100".to_string())],
            )
            .await?;
        Ok(list.check_runs)
    }

    async fn get_check_run(&self, id: u64) -> Result<CheckRunDetails> {
        self.get_json(&format!("/check-runs/{id}"), &[]).await
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let list: WorkflowList = self.get_json("/actions/workflows", &[]).await?;
        Ok(list.workflows)
    }

    async fn get_file_content(&self, path: &str) -> Result<String> {
        let file: ContentFile = self.get_json(&format!("/contents/{path}"), &[]).await?;
        decode_content(&file.content)
    }

    async fn list_workflow_runs(&self, workflow_id: u64) -> Result<Vec<WorkflowRun>> {
        let list: WorkflowRunList = self
            .get_json(
                &format!("/actions/workflows/{workflow_id}/runs"),
                &[("per_page", "30".to_string())],
            )
            .await?;
        Ok(list.workflow_runs)
    }

    async fn list_runs_for_sha(&self, sha: &str) -> Result<Vec<WorkflowRun>> {
        let list: WorkflowRunList = self
            .get_json("/actions/runs", &[("head_sha", sha.to_string())])
            .await?;
        Ok(list.workflow_runs)
    }

    async fn list_runs_for_branch(&self, branch: &str) -> Result<Vec<WorkflowRun>> {
        let list: WorkflowRunList = self
            .get_json(
                "/actions/runs",
                &[
                    ("branch", branch.to_string()),
                    ("per_page", "30".to_string()),
                ],
            )
            .await?;
        Ok(list.workflow_runs)
    }

    async fn create_release(&self, new: &NewRelease) -> Result<Release> {
        self.send_json(
            reqwest::Method::POST,
            "/releases",
            &serde_json::to_value(new)?,
        )
        .await
    }

    async fn get_release_by_tag(&self, tag: &str) -> Result<Release> {
        self.get_json(&format!("/releases/tags/{tag}"), &[]).await
    }

    async fn list_issues(
        &self,
        state: ItemState,
        milestone: Option<u64>,
        limit: usize,
    ) -> Result<Vec<Issue>> {
        let state = match state {
            ItemState::Open => "open",
            ItemState::Closed => "closed",
            ItemState::Unknown => "all",
        };
        let mut query = vec![
            ("state", state.to_string()),
            ("per_page", limit.min(100).to_string()),
            ("sort", "updated".to_string()),
            ("direction", "desc".to_string()),
        ];
        if let Some(milestone) = milestone {
            query.push(("milestone", milestone.to_string()));
        }
        let issues: Vec<Issue> = self.get_json("/issues", &query).await?;
        Ok(issues.into_iter().take(limit).collect())
    }

    async fn get_issue(&self, number: u64) -> Result<Issue> {
        self.get_json(&format!("/issues/{number}"), &[]).await
    }

    async fn create_issue(&self, new: &NewIssue) -> Result<Issue> {
        self.send_json(
            reqwest::Method::POST,
            "/issues",
            &serde_json::to_value(new)?,
        )
        .await
    }

    async fn list_issue_comments(&self, number: u64) -> Result<Vec<IssueComment>> {
        self.get_json(
            &format!("/issues/{number}/comments"),
            &[("per_page", "100".to_string())],
        )
        .await
    }

    async fn list_milestones(&self) -> Result<Vec<Milestone>> {
        self.get_json(
            "/milestones",
            &[
                ("state", "all".to_string()),
                ("per_page", "100".to_string()),
            ],
        )
        .await
    }

    async fn create_milestone(&self, title: &str, description: Option<&str>) -> Result<Milestone> {
        let mut body = json!({ "title": title });
        if let Some(description) = description {
            body["description"] = json!(description);
        }
        self.send_json(reqwest::Method::POST, "/milestones", &body)
            .await
    }

    async fn close_milestone(&self, number: u64) -> Result<()> {
        self.send_no_content(
            reqwest::Method::PATCH,
            &format!("/milestones/{number}"),
            Some(&json!({ "state": "closed" })),
        )
        .await
    }

    async fn set_issue_milestone(&self, issue: u64, milestone: u64) -> Result<()> {
        self.send_no_content(
            reqwest::Method::PATCH,
            &format!("/issues/{issue}"),
            Some(&json!({ "milestone": milestone })),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_content_strips_embedded_newlines() {
        // "on: pull_request\n" split across base64 lines as GitHub returns it
        let encoded = "b246IHB1bGxf\ncmVxdWVzdAo=\n";
        assert_eq!(decode_content(encoded).unwrap(), "on: pull_request\n");
    }

    #[test]
    fn test_decode_content_rejects_invalid_base64() {
        let err = decode_content("!!!not-base64!!!").unwrap_err();
        assert!(err.to_string().contains("base64"));
    }

    #[test]
    fn test_error_message_extracted_from_json_body() {
        let body = r#"{"message": "Validation Failed", "errors": []}"#;
        assert_eq!(error_message_from_body(body), "Validation Failed");
    }

    #[test]
    fn test_error_message_falls_back_to_raw_body() {
        assert_eq!(error_message_from_body("  plain text  "), "plain text");
    }

    #[test]
    fn test_url_scoped_to_repo() {
        let client = GitHubClient::new(RepoIdentity::new("acme", "widget"), "tok")
            .unwrap()
            .with_base_url("https://ghe.example.com/api/v3/");
        assert_eq!(
            client.url("/pulls/7"),
            "https://ghe.example.com/api/v3/repos/acme/widget/pulls/7"
        );
    }
}
