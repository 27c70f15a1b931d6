//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - preview: expand a rule without storing it
//! - series: create/list/show/update/delete series
//! - occurrence: cancel/restore single occurrences
//! - daemon: run the background worker

use cadence::domain::{EndCondition, Frequency};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Cadence - Recurring meeting occurrence scheduler
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

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
    /// Print the occurrences a rule would produce
    Preview {
        #[command(flatten)]
        rule: RuleArgs,

        /// Number of occurrences to print
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Series management commands
    Series {
        #[command(subcommand)]
        command: SeriesCommands,
    },

    /// Per-occurrence commands
    Occurrence {
        #[command(subcommand)]
        command: OccurrenceCommands,
    },

    /// Run the background worker until interrupted
    Daemon,
}

/// Series management subcommands
#[derive(Subcommand, Debug)]
pub enum SeriesCommands {
    /// Create a series and materialize its first occurrence
    Create {
        /// Meeting title
        #[arg(short, long)]
        title: String,

        #[command(flatten)]
        rule: RuleArgs,
    },

    /// List all series
    List {
        /// Filter by state (idle, scheduled, running, completed)
        #[arg(short, long)]
        state: Option<String>,
    },

    /// Show a series and its upcoming occurrences
    Show {
        /// Series ID
        id: String,

        /// Number of upcoming occurrences
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },

    /// Edit a series
    Update {
        /// Series ID
        id: String,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long, value_parser = parse_frequency)]
        frequency: Option<Frequency>,

        #[arg(short, long)]
        interval: Option<u32>,

        #[command(flatten)]
        end: EndArgs,
    },

    /// Delete a series and its occurrence records
    Delete {
        /// Series ID
        id: String,
    },
}

/// Per-occurrence subcommands
#[derive(Subcommand, Debug)]
pub enum OccurrenceCommands {
    /// Skip one occurrence
    Cancel {
        /// Series ID
        id: String,

        /// Occurrence start (RFC 3339, or local YYYY-MM-DDTHH:MM in the series zone)
        at: String,
    },

    /// Undo a cancellation
    Restore {
        /// Series ID
        id: String,

        /// Occurrence start (RFC 3339, or local YYYY-MM-DDTHH:MM in the series zone)
        at: String,
    },
}

/// Recurrence rule arguments shared by preview and create
#[derive(Args, Debug, Clone)]
pub struct RuleArgs {
    /// First occurrence as local wall time, YYYY-MM-DDTHH:MM
    #[arg(short, long, value_parser = parse_local)]
    pub start: NaiveDateTime,

    /// IANA time zone the rule steps in
    #[arg(short = 'z', long, default_value = "UTC", value_parser = parse_tz)]
    pub tz: Tz,

    /// daily, working-days or weekly
    #[arg(short, long, value_parser = parse_frequency)]
    pub frequency: Frequency,

    /// Step between occurrences
    #[arg(short, long, default_value_t = 1)]
    pub interval: u32,

    #[command(flatten)]
    pub end: EndArgs,
}

/// End condition arguments; at most one may be given
#[derive(Args, Debug, Clone, Default)]
#[group(multiple = false)]
pub struct EndArgs {
    /// Last local date an occurrence may fall on
    #[arg(short, long)]
    pub until: Option<NaiveDate>,

    /// Number of occurrences
    #[arg(short = 'n', long)]
    pub count: Option<u32>,
}

impl EndArgs {
    pub fn end_condition(&self) -> Option<EndCondition> {
        match (self.until, self.count) {
            (Some(date), _) => Some(EndCondition::SpecificDate(date)),
            (None, Some(n)) => Some(EndCondition::IterationCount(n)),
            (None, None) => None,
        }
    }
}

fn parse_frequency(s: &str) -> Result<Frequency, String> {
    s.parse::<Frequency>().map_err(|e| e.to_string())
}

fn parse_tz(s: &str) -> Result<Tz, String> {
    s.parse::<Tz>().map_err(|e| e.to_string())
}

fn parse_local(s: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .map_err(|e| format!("expected YYYY-MM-DDTHH:MM: {}", e))
}

/// Resolve an occurrence argument against the series zone
pub fn parse_instant(s: &str, tz: Tz) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Ok(at.with_timezone(&Utc));
    }
    let local = parse_local(s)?;
    tz.from_local_datetime(&local)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| format!("{} does not exist in {}", s, tz))
}
