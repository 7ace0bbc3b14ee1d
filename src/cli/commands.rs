//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - pr: open a pull request and wait for its checks
//! - merge: merge a pull request
//! - release: publish a release and wait for its workflows
//! - wait-checks / wait-workflows: run a wait loop on its own
//! - check-config: audit the repository's workflow triggers
//! - milestone: version milestone bookkeeping

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Shipr - GitHub release automation with CI babysitting
#[derive(Parser, Debug)]
#[command(name = "shipr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer yes to every confirmation prompt (non-interactive mode)
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open a pull request and wait for its checks to pass
    Pr {
        /// Pull request title
        #[arg(short, long)]
        title: String,

        /// Pull request body
        #[arg(short, long, default_value = "")]
        body: String,

        /// Head branch (defaults to the current branch)
        #[arg(long)]
        head: Option<String>,

        /// Base branch (defaults to the configured base branch)
        #[arg(long)]
        base: Option<String>,

        /// Create the PR but do not wait for checks
        #[arg(long)]
        no_wait: bool,
    },

    /// Merge a pull request
    Merge {
        /// Pull request number
        number: u64,

        /// Merge method (merge, squash, rebase)
        #[arg(short, long)]
        method: Option<String>,

        /// Keep the head branch after merging
        #[arg(long)]
        keep_branch: bool,

        /// Merge without waiting for checks
        #[arg(long)]
        no_wait: bool,
    },

    /// Publish a release and wait for the workflows it triggers
    Release {
        /// Version to release (milestone release/<version>)
        version: String,

        /// Tag name (defaults to v<version>)
        #[arg(short, long)]
        tag: Option<String>,

        /// Release notes; generated from the version milestone when omitted
        #[arg(short, long)]
        notes: Option<String>,

        /// Publish the release but do not wait for workflows
        #[arg(long)]
        no_wait: bool,
    },

    /// Wait for a pull request's checks to complete
    WaitChecks {
        /// Pull request number
        number: u64,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Wait for workflows triggered by a release
    WaitWorkflows {
        /// Release tag to track
        tag: String,

        /// Only wait for these workflow names (repeatable)
        #[arg(short, long = "workflow")]
        workflows: Vec<String>,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Audit which workflows will trigger on pull requests
    CheckConfig {
        /// Target branch PRs would merge into
        #[arg(long)]
        branch: Option<String>,
    },

    /// Version milestone bookkeeping
    Milestone {
        #[command(subcommand)]
        command: MilestoneCommands,
    },
}

/// Milestone subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum MilestoneCommands {
    /// Ensure the milestone for a version exists
    Ensure {
        /// Version the milestone is for
        version: String,

        /// Previous version whose leftover open issues roll forward
        #[arg(long)]
        from: Option<String>,
    },

    /// Close the milestone for a version
    Close {
        /// Version the milestone is for
        version: String,
    },
}
