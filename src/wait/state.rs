//! Shared bookkeeping for the polling loops.

use std::time::{Duration, Instant};

/// How a wait ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Every tracked signal completed without a failing conclusion.
    Succeeded,
    /// No signals ever appeared and the confirmation gate (or
    /// non-interactive policy) chose to move on.
    ProceededWithoutSignals,
}

/// Distinguishes "still pending" from "will never arrive": an empty poll is
/// only a miss, and misses must be consecutive to mean anything.
#[derive(Debug)]
pub struct WaitState {
    started: Instant,
    misses: u32,
    investigated: bool,
}

impl WaitState {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            misses: 0,
            investigated: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn timed_out(&self, timeout: Duration) -> bool {
        self.elapsed() > timeout
    }

    /// Record a poll that returned no signals; returns the new consecutive
    /// miss count.
    pub fn record_empty(&mut self) -> u32 {
        self.misses += 1;
        self.misses
    }

    /// Record a poll that found signals, resetting the miss streak.
    pub fn record_signals(&mut self) {
        self.misses = 0;
    }

    /// Claim the one-shot deeper investigation. True exactly once.
    pub fn begin_investigation(&mut self) -> bool {
        if self.investigated {
            return false;
        }
        self.investigated = true;
        true
    }
}

impl Default for WaitState {
    fn default() -> Self {
        Self::new()
    }
}
