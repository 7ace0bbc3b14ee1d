//! Repository identity resolution.
//!
//! Maps the working tree's `origin` remote onto an (owner, repo) pair.
//! The URL parse works with any hostname or SSH alias:
//! - `git@github.com:owner/repo.git`
//! - `git@github.com-alias:owner/repo.git`
//! - `https://github.com/owner/repo.git`
//! - `ssh://git@host/owner/repo.git`

use std::path::Path;
use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use tokio::process::Command;

use crate::error::{Result, ShiprError};

/// Owner/repo pair for the repository automation runs against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoIdentity {
    pub owner: String,
    pub repo: String,
}

impl RepoIdentity {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Web URL for a pull request in this repository.
    pub fn pull_url(&self, number: u64) -> String {
        format!("https://github.com/{}/{}/pull/{number}", self.owner, self.repo)
    }
}

impl std::fmt::Display for RepoIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

// Two cases: SSH form `:owner/repo` after the colon, or a URL form
// `//host/owner/repo` with at least two path segments.
static REMOTE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?::([^/:]+)/([^/:]+)|//[^/]+/([^/:]+)/([^/:]+))$").expect("static pattern")
});

/// Parse a git remote URL into its owner/repo pair.
pub fn parse_remote_url(url: &str) -> Result<RepoIdentity> {
    let url = url.trim();
    let caps = REMOTE_URL_RE
        .captures(url)
        .ok_or_else(|| ShiprError::RemoteParse(url.to_string()))?;

    let (owner, repo) = match (caps.get(1), caps.get(2), caps.get(3), caps.get(4)) {
        (Some(owner), Some(repo), _, _) => (owner.as_str(), repo.as_str()),
        (_, _, Some(owner), Some(repo)) => (owner.as_str(), repo.as_str()),
        _ => return Err(ShiprError::RemoteParse(url.to_string())),
    };

    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if owner.is_empty() || repo.is_empty() {
        return Err(ShiprError::RemoteParse(url.to_string()));
    }

    Ok(RepoIdentity::new(owner, repo))
}

async fn git_output(args: &[&str], cwd: Option<&Path>) -> Result<String> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd.output().await?;
    if !output.status.success() {
        return Err(ShiprError::Git(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Name of the currently checked-out branch.
pub async fn current_branch(cwd: Option<&Path>) -> Result<String> {
    git_output(&["rev-parse", "--abbrev-ref", "HEAD"], cwd).await
}

/// Resolve (owner, repo) from the working tree's `origin` remote.
pub async fn resolve_repo(cwd: Option<&Path>) -> Result<RepoIdentity> {
    let url = git_output(&["remote", "get-url", "origin"], cwd).await?;
    debug!("Resolving repository identity from origin URL: {url}");
    parse_remote_url(&url)
}
