//! Command-line arguments for the `stackpilot` binary.

use clap::{Parser, Subcommand};
use stackpilot_cron::JobSource;

/// Stackpilot - server stack management.
#[derive(Parser, Debug)]
#[command(name = "stackpilot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scheduled jobs (crontab entries and timer units)
    Cron {
        #[command(subcommand)]
        command: CronCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum CronCommand {
    /// Create a job and install its crontab entry
    Add {
        /// Five-field cron schedule, quoted: "0 2 * * *"
        schedule: String,

        /// Command line; everything after the schedule. Put options such as
        /// -d before the schedule: words after it, flags included, are
        /// taken as part of the command
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List jobs
    List {
        /// Only jobs whose command belongs to stackpilot
        #[arg(long)]
        managed: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show one job
    Show {
        id: u64,

        #[arg(long)]
        json: bool,
    },

    /// Change a job's schedule, command or description
    Edit {
        id: u64,

        #[arg(long)]
        schedule: Option<String>,

        #[arg(long)]
        command: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Delete a job and its crontab entry
    Delete { id: u64 },

    /// Run a job now; exits with the job's exit code
    Run { id: u64 },

    /// Re-install a disabled job
    Enable { id: u64 },

    /// Remove a job's entry but keep its record
    Disable { id: u64 },

    /// Job counts and cron daemon health
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Recent cron log lines
    Logs {
        /// Number of lines
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,

        /// Only lines containing this text
        #[arg(long)]
        grep: Option<String>,
    },

    /// Record a job another subsystem already installed
    Register {
        /// backup, ssl, dns, systemd, webstack or manual
        source: JobSource,

        schedule: String,

        /// Command line; options go before the schedule
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Pull external crontab entries and timers into the job store
    Sync {
        #[arg(long)]
        json: bool,
    },
}

impl CronCommand {
    /// Whether output (including errors) should be JSON.
    pub fn wants_json(&self) -> bool {
        match self {
            CronCommand::List { json, .. }
            | CronCommand::Show { json, .. }
            | CronCommand::Status { json }
            | CronCommand::Sync { json } => *json,
            _ => false,
        }
    }
}
