use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

mod cli;
mod config;

use cli::Cli;
use cli::commands::{Commands, MilestoneCommands};
use config::Config;

use shipr::confirm::{ConfirmationGate, NonInteractiveGate, StdinGate};
use shipr::github::{milestones, pulls, releases, GitHubApi, GitHubClient};
use shipr::repo;
use shipr::wait::{
    wait_for_pull_request_checks, wait_for_release_workflows, CheckWaitOptions, WaitOutcome,
    WorkflowWaitOptions,
};
use shipr::workflow::check_workflow_configuration;
use shipr::github::types::MergeMethod;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shipr")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("shipr.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn check_options(config: &Config, skip_confirmation: bool, timeout: Option<u64>) -> CheckWaitOptions {
    CheckWaitOptions {
        timeout: Duration::from_secs(timeout.unwrap_or(config.checks.timeout_secs)),
        poll_interval: Duration::from_secs(config.checks.poll_interval_secs),
        skip_confirmation,
    }
}

fn workflow_options(
    config: &Config,
    skip_confirmation: bool,
    timeout: Option<u64>,
    names: Vec<String>,
) -> WorkflowWaitOptions {
    let names = if names.is_empty() {
        config.workflows.names.clone()
    } else {
        names
    };
    WorkflowWaitOptions {
        timeout: Duration::from_secs(timeout.unwrap_or(config.workflows.timeout_secs)),
        initial_delay: Duration::from_secs(config.workflows.initial_delay_secs),
        poll_interval: Duration::from_secs(config.workflows.poll_interval_secs),
        miss_interval: Duration::from_secs(config.workflows.miss_interval_secs),
        workflow_names: if names.is_empty() { None } else { Some(names) },
        skip_confirmation,
    }
}

fn report_outcome(outcome: WaitOutcome, what: &str) {
    match outcome {
        WaitOutcome::Succeeded => println!("{} {what} completed successfully", "OK".green()),
        WaitOutcome::ProceededWithoutSignals => {
            println!("{} proceeded without {what}", "WARN".yellow())
        }
    }
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let identity = repo::resolve_repo(None)
        .await
        .context("Failed to resolve repository from origin remote")?;
    let api: &dyn GitHubApi = &GitHubClient::from_env(identity)
        .context("Failed to build GitHub client")?
        .with_base_url(&config.github.api_url);

    let gate: Box<dyn ConfirmationGate> = if cli.yes {
        Box::new(NonInteractiveGate)
    } else {
        Box::new(StdinGate)
    };

    match &cli.command {
        Commands::Pr {
            title,
            body,
            head,
            base,
            no_wait,
        } => {
            handle_pr_command(
                api, gate.as_ref(), config, cli.yes, title, body,
                head.as_deref(), base.as_deref(), *no_wait,
            )
            .await
        }
        Commands::Merge {
            number,
            method,
            keep_branch,
            no_wait,
        } => {
            handle_merge_command(
                api, gate.as_ref(), config, cli.yes, *number,
                method.as_deref(), *keep_branch, *no_wait,
            )
            .await
        }
        Commands::Release {
            version,
            tag,
            notes,
            no_wait,
        } => {
            handle_release_command(
                api, gate.as_ref(), config, cli.yes, version,
                tag.as_deref(), notes.as_deref(), *no_wait,
            )
            .await
        }
        Commands::WaitChecks { number, timeout } => {
            let outcome = wait_for_pull_request_checks(
                api,
                gate.as_ref(),
                *number,
                &check_options(config, cli.yes, *timeout),
            )
            .await?;
            report_outcome(outcome, "checks");
            Ok(())
        }
        Commands::WaitWorkflows {
            tag,
            workflows,
            timeout,
        } => {
            let outcome = wait_for_release_workflows(
                api,
                gate.as_ref(),
                tag,
                &workflow_options(config, cli.yes, *timeout, workflows.clone()),
            )
            .await?;
            report_outcome(outcome, "release workflows");
            Ok(())
        }
        Commands::CheckConfig { branch } => {
            handle_check_config_command(api, config, branch.as_deref()).await
        }
        Commands::Milestone { command } => handle_milestone_command(api, command).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_pr_command(
    api: &dyn GitHubApi,
    gate: &dyn ConfirmationGate,
    config: &Config,
    yes: bool,
    title: &str,
    body: &str,
    head: Option<&str>,
    base: Option<&str>,
    no_wait: bool,
) -> Result<()> {
    let head = match head {
        Some(head) => head.to_string(),
        None => repo::current_branch(None)
            .await
            .context("Failed to determine current branch")?,
    };
    let base = base.unwrap_or(&config.github.base_branch).to_string();

    let pr = pulls::create_pull_request(
        api,
        &pulls::PullRequestSpec {
            title: title.to_string(),
            body: body.to_string(),
            head,
            base,
        },
    )
    .await?;
    println!("{} PR #{}: {}", "Created".green(), pr.number, pr.html_url);

    if !no_wait {
        let outcome =
            wait_for_pull_request_checks(api, gate, pr.number, &check_options(config, yes, None))
                .await?;
        report_outcome(outcome, "checks");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_merge_command(
    api: &dyn GitHubApi,
    gate: &dyn ConfirmationGate,
    config: &Config,
    yes: bool,
    number: u64,
    method: Option<&str>,
    keep_branch: bool,
    no_wait: bool,
) -> Result<()> {
    let method: MergeMethod = method
        .unwrap_or(&config.merge.method)
        .parse()
        .map_err(|e: String| eyre::eyre!(e))?;

    if !no_wait {
        let outcome =
            wait_for_pull_request_checks(api, gate, number, &check_options(config, yes, None))
                .await?;
        report_outcome(outcome, "checks");
    }

    let delete_branch = config.merge.delete_branch && !keep_branch;
    let pr = pulls::merge_pull_request(api, number, method, delete_branch).await?;
    println!("{} PR #{number} ({method}): {}", "Merged".green(), pr.html_url);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_release_command(
    api: &dyn GitHubApi,
    gate: &dyn ConfirmationGate,
    config: &Config,
    yes: bool,
    version: &str,
    tag: Option<&str>,
    notes: Option<&str>,
    no_wait: bool,
) -> Result<()> {
    let tag = tag.map(str::to_string).unwrap_or_else(|| format!("v{version}"));

    let notes = match notes {
        Some(notes) => notes.to_string(),
        None => {
            let versions = vec![version.to_string()];
            milestones::release_notes_from_milestones(api, &versions, config.release_notes.max_tokens)
                .await
        }
    };

    let release = releases::create_release(api, &tag, version, &notes).await?;
    println!("{} release {}: {}", "Published".green(), tag, release.html_url);

    milestones::close_milestone_for_version(api, version).await;

    if !no_wait {
        let outcome = wait_for_release_workflows(
            api,
            gate,
            &tag,
            &workflow_options(config, yes, None, Vec::new()),
        )
        .await?;
        report_outcome(outcome, "release workflows");
    }
    Ok(())
}

async fn handle_check_config_command(
    api: &dyn GitHubApi,
    config: &Config,
    branch: Option<&str>,
) -> Result<()> {
    let branch = branch.unwrap_or(&config.github.base_branch);
    let audit = check_workflow_configuration(api, branch).await;

    match audit.workflow_count {
        Some(count) => println!("Workflows configured: {count}"),
        None => println!("Workflows configured: {}", "unknown (list failed)".yellow()),
    }

    if audit.has_pull_request_triggers {
        println!(
            "{} {} workflow(s) trigger on pull requests to {branch}:",
            "OK".green(),
            audit.triggered_workflow_names.len()
        );
        for name in &audit.triggered_workflow_names {
            println!("  - {name}");
        }
    }

    if let Some(warning) = &audit.warning {
        println!("{} {warning}", "WARN".yellow());
    }
    Ok(())
}

async fn handle_milestone_command(api: &dyn GitHubApi, command: &MilestoneCommands) -> Result<()> {
    match command {
        MilestoneCommands::Ensure { version, from } => {
            milestones::ensure_milestone_for_version(api, version, from.as_deref()).await;
            println!("{} milestone for {version}", "Ensured".green());
        }
        MilestoneCommands::Close { version } => {
            milestones::close_milestone_for_version(api, version).await;
            println!("{} milestone for {version}", "Closed".green());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
