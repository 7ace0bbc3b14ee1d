//! Workflow trigger classification and repository CI auditing.

pub mod configuration;
pub mod triggers;

pub use configuration::{check_workflow_configuration, WorkflowConfiguration};
pub use triggers::{triggered_by_pull_request, triggered_by_release};
