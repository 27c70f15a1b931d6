//! CLI module for cadence - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for previewing rules,
//! managing series and occurrences, and running the daemon.

pub mod commands;

pub use commands::Cli;
