use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exit status recorded when a run is killed for exceeding its budget.
pub const TIMED_OUT_STATUS: i32 = 124;

/// Which subsystem a job record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobSource {
    /// Created by an administrator through the job commands.
    Manual,
    Backup,
    Ssl,
    Dns,
    /// Discovered from a service-manager timer unit.
    Systemd,
    Webstack,
}

impl JobSource {
    /// Tag written into marker lines. Manual jobs use `job`.
    pub fn tag(&self) -> &'static str {
        match self {
            JobSource::Manual => "job",
            JobSource::Backup => "backup",
            JobSource::Ssl => "ssl",
            JobSource::Dns => "dns",
            JobSource::Systemd => "systemd",
            JobSource::Webstack => "webstack",
        }
    }

    /// Inverse of [`JobSource::tag`].
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "job" => Some(JobSource::Manual),
            "backup" => Some(JobSource::Backup),
            "ssl" => Some(JobSource::Ssl),
            "dns" => Some(JobSource::Dns),
            "systemd" => Some(JobSource::Systemd),
            "webstack" => Some(JobSource::Webstack),
            _ => None,
        }
    }

    /// Guess the owning subsystem from free text (a command or unit name).
    pub fn classify(text: &str, fallback: JobSource) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("backup") {
            JobSource::Backup
        } else if lower.contains("ssl") || lower.contains("certbot") {
            JobSource::Ssl
        } else if lower.contains("dns") {
            JobSource::Dns
        } else {
            fallback
        }
    }
}

impl std::fmt::Display for JobSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobSource::Manual => "manual",
            other => other.tag(),
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "manual" => Ok(JobSource::Manual),
            other => JobSource::from_tag(other).ok_or_else(|| format!("unknown job source: {other}")),
        }
    }
}

/// How the most recent on-demand run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The command exited on its own.
    Exited { code: i32 },
    /// The command was killed after exceeding the execution timeout.
    TimedOut { after_secs: u64 },
}

impl RunOutcome {
    /// Value stored in `last_status`.
    pub fn exit_status(&self) -> i32 {
        match self {
            RunOutcome::Exited { code } => *code,
            RunOutcome::TimedOut { .. } => TIMED_OUT_STATUS,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, RunOutcome::Exited { code: 0 })
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Exited { code } => write!(f, "exited with {code}"),
            RunOutcome::TimedOut { after_secs } => write!(f, "timed out after {after_secs}s"),
        }
    }
}

/// A persisted job record, one JSON file per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Positive, allocated as max existing + 1.
    pub id: u64,
    /// Five-field cron expression.
    pub schedule: String,
    pub command: String,
    #[serde(default)]
    pub description: String,
    /// Whether the job currently has an entry in the live schedule.
    pub enabled: bool,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_status: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<RunOutcome>,
    pub source: JobSource,
    /// Set for jobs driven by a service-manager timer instead of the crontab.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_unit: Option<String>,
}

impl Job {
    /// A fresh, enabled record with no run history.
    pub fn new(
        id: u64,
        schedule: &str,
        command: &str,
        description: &str,
        source: JobSource,
    ) -> Self {
        Self {
            id,
            schedule: schedule.to_string(),
            command: command.to_string(),
            description: description.to_string(),
            enabled: true,
            created: Utc::now(),
            last_run: None,
            last_status: 0,
            last_outcome: None,
            source,
            timer_unit: None,
        }
    }

    pub fn is_timer_backed(&self) -> bool {
        self.timer_unit.is_some()
    }

    pub fn same_entry(&self, schedule: &str, command: &str) -> bool {
        self.schedule == schedule && self.command == command
    }

    /// Record the result of an on-demand run.
    pub fn record_run(&mut self, at: DateTime<Utc>, outcome: RunOutcome) {
        self.last_run = Some(at);
        self.last_status = outcome.exit_status();
        self.last_outcome = Some(outcome);
    }
}

/// Fields an edit may change; `None` leaves the field as is.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub schedule: Option<String>,
    pub command: Option<String>,
    pub description: Option<String>,
}

impl JobUpdate {
    pub fn is_empty(&self) -> bool {
        self.schedule.is_none() && self.command.is_none() && self.description.is_none()
    }
}

/// What a reconciliation run merged into the metadata store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Records created from marker-tagged crontab entries.
    pub tagged: usize,
    /// Unmarked crontab entries adopted and tagged.
    pub adopted: usize,
    /// Records created from timer units.
    pub timers: usize,
    /// Timer records whose schedule changed on the unit side.
    pub refreshed: usize,
    /// Legacy timer records replaced.
    pub healed: usize,
}

impl SyncReport {
    pub fn changes(&self) -> usize {
        self.tagged + self.adopted + self.timers + self.refreshed + self.healed
    }
}

/// Result of running a job on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub id: u64,
    pub outcome: RunOutcome,
    /// Combined stdout + stderr, ANSI-stripped and truncated.
    pub output: String,
    pub duration_ms: u64,
}

/// Aggregate view served by the status command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronStatus {
    pub total: usize,
    /// Records whose command references the application.
    pub managed: usize,
    /// `total - managed`.
    pub custom: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub daemon_active: bool,
    /// First recorded run in store order; not necessarily the latest.
    pub last_run: Option<DateTime<Utc>>,
}
