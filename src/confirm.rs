//! Confirmation gate - the injectable decision point the reconciliation
//! loops use when ambiguity must be resolved by a human or a policy.

use std::sync::Mutex;

use async_trait::async_trait;
use log::warn;

/// Async yes/no predicate answering "should we proceed?".
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;
}

/// Fail-open default for unattended automation: logs the prompt and
/// answers yes, so an unconfigured gate never blocks a pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractiveGate;

#[async_trait]
impl ConfirmationGate for NonInteractiveGate {
    async fn confirm(&self, message: &str) -> bool {
        warn!("Prompt: {message} (defaulting to YES in non-interactive mode)");
        true
    }
}

/// Terminal prompt gate used by the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinGate;

#[async_trait]
impl ConfirmationGate for StdinGate {
    async fn confirm(&self, message: &str) -> bool {
        let message = message.to_string();
        tokio::task::spawn_blocking(move || {
            use std::io::{self, Write};

            eprintln!("{message}");
            eprint!("Proceed? [y/N] ");
            let _ = io::stderr().flush();

            let mut line = String::new();
            if io::stdin().read_line(&mut line).is_err() {
                return false;
            }
            matches!(line.trim(), "y" | "Y" | "yes" | "Yes" | "YES")
        })
        .await
        .unwrap_or(false)
    }
}

/// Scripted gate for tests: answers a fixed verdict and records every
/// prompt it was asked.
#[derive(Debug, Default)]
pub struct StaticGate {
    answer: bool,
    prompts: Mutex<Vec<String>>,
}

impl StaticGate {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfirmationGate for StaticGate {
    async fn confirm(&self, message: &str) -> bool {
        self.prompts.lock().unwrap().push(message.to_string());
        self.answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_non_interactive_gate_always_proceeds() {
        let gate = NonInteractiveGate;
        assert!(gate.confirm("Proceed without checks?").await);
    }

    #[tokio::test]
    async fn test_static_gate_records_prompts() {
        let gate = StaticGate::new(false);
        assert!(!gate.confirm("first question").await);
        assert!(!gate.confirm("second question").await);
        assert_eq!(gate.prompts(), vec!["first question", "second question"]);
    }

    #[tokio::test]
    async fn test_static_gate_answer() {
        let yes = StaticGate::new(true);
        assert!(yes.confirm("ok?").await);
    }
}
