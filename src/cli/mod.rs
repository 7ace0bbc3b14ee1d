//! CLI module for shipr - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for pull request
//! management, releases, CI waiting, and milestone bookkeeping.

pub mod commands;

pub use commands::Cli;
