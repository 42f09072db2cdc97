use thiserror::Error;

/// Errors that can occur within the cron reconciliation subsystem.
#[derive(Debug, Error)]
pub enum CronError {
    /// The schedule is not a five-field cron expression.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// The command is empty or spans more than one line.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// No metadata record exists for the given ID.
    #[error("Job not found: {id}")]
    JobNotFound { id: u64 },

    /// A record file for this ID already exists.
    #[error("Job ID already in use: {id}")]
    IdInUse { id: u64 },

    /// An identical schedule + command pair is already managed.
    #[error("Job already exists with the same schedule and command: {id}")]
    DuplicateJob { id: u64 },

    #[error("Job {id} is already enabled")]
    AlreadyEnabled { id: u64 },

    #[error("Job {id} is already disabled")]
    AlreadyDisabled { id: u64 },

    /// Filesystem failure, with what was being attempted.
    #[error("I/O error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The schedule-install command rejected the new schedule.
    #[error("Crontab install failed: {0}")]
    InstallFailed(String),

    /// An external command (crontab -l, systemctl) exited non-zero.
    #[error("Command `{command}` failed: {reason}")]
    Command { command: String, reason: String },

    /// A metadata record exists but cannot be decoded.
    #[error("Corrupt job record {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock error: {0}")]
    Lock(String),

    /// The job command could not be started.
    #[error("Execution error: {0}")]
    Exec(String),
}

impl CronError {
    /// Wrap an I/O error with a short description of the failed step.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        CronError::Io {
            context: context.into(),
            source,
        }
    }

    /// Short error code string used in machine-readable output.
    pub fn code(&self) -> &'static str {
        match self {
            CronError::InvalidSchedule(_) => "INVALID_SCHEDULE",
            CronError::InvalidCommand(_) => "INVALID_COMMAND",
            CronError::JobNotFound { .. } => "JOB_NOT_FOUND",
            CronError::IdInUse { .. } => "ID_IN_USE",
            CronError::DuplicateJob { .. } => "DUPLICATE_JOB",
            CronError::AlreadyEnabled { .. } => "ALREADY_ENABLED",
            CronError::AlreadyDisabled { .. } => "ALREADY_DISABLED",
            CronError::Io { .. } => "IO_ERROR",
            CronError::InstallFailed(_) => "INSTALL_FAILED",
            CronError::Command { .. } => "COMMAND_FAILED",
            CronError::Corrupt { .. } => "CORRUPT_RECORD",
            CronError::Serialization(_) => "SERIALIZATION_ERROR",
            CronError::Lock(_) => "LOCK_ERROR",
            CronError::Exec(_) => "EXEC_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CronError>;
