//! Polling reconciliation loops over asynchronous CI signals.

pub mod checks;
pub mod state;
pub mod workflows;

pub use checks::{wait_for_pull_request_checks, CheckWaitOptions};
pub use state::WaitOutcome;
pub use workflows::{wait_for_release_workflows, WorkflowWaitOptions};
