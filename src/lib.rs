//! shipr - release automation over the GitHub API
//!
//! Opens and merges pull requests, publishes releases, and babysits the CI
//! signals in between: two reconciliation loops poll check runs and
//! release-triggered workflow runs, distinguishing "still pending" from
//! "will never arrive", and route genuinely ambiguous situations through a
//! pluggable confirmation gate.

pub mod confirm;
pub mod error;
pub mod github;
pub mod repo;
pub mod wait;
pub mod workflow;

pub use error::{Result, ShiprError};
