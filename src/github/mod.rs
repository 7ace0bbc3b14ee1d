//! GitHub API surface: transport, typed records, and repository
//! operations built on the [`api::GitHubApi`] trait.

pub mod api;
pub mod client;
pub mod issues;
pub mod milestones;
pub mod pulls;
pub mod releases;
pub mod types;

pub use api::{GitHubApi, MockGitHub};
pub use client::GitHubClient;
