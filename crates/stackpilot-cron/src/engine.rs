//! `CronEngine`: the operation surface consumed by the CLI.
//!
//! Every operation except log retrieval takes the store lock, reconciles the
//! metadata store against the live schedule and timer units, and only then
//! acts. Job-level changes are applied to the live schedule before the
//! metadata record, so a failed install leaves the record untouched.

use stackpilot_core::config::{LogsConfig, StackpilotConfig};
use tracing::{debug, info, warn};

use crate::crontab::{CrontabAdapter, CrontabBackend, SystemCrontab};
use crate::error::{CronError, Result};
use crate::executor::JobExecutor;
use crate::lock::StoreLock;
use crate::reconcile::{next_job_id, Reconciler};
use crate::schedule::{validate_command, validate_schedule};
use crate::status;
use crate::store::{JobFilter, MetadataStore};
use crate::timers::{NoServiceManager, ServiceManager, Systemctl, TimerScanner};
use crate::types::{CronStatus, Job, JobSource, JobUpdate, RunReport, SyncReport};

pub struct CronEngine {
    store: MetadataStore,
    crontab: CrontabAdapter,
    services: Box<dyn ServiceManager>,
    scanner: Option<TimerScanner>,
    executor: JobExecutor,
    app_patterns: Vec<String>,
    /// Marker prefix plus app patterns: what "managed" means for list/status.
    managed_needles: Vec<String>,
    logs: LogsConfig,
}

impl CronEngine {
    /// Engine over the host's `crontab` and, when installed, `systemctl`.
    pub fn from_config(config: &StackpilotConfig) -> Self {
        let crontab = SystemCrontab::new(&config.cron.crontab_bin, config.cron.crontab_user.as_deref());
        let services: Box<dyn ServiceManager> = match which::which(&config.timers.systemctl_bin) {
            Ok(path) => {
                debug!(path = %path.display(), "using service manager");
                Box::new(Systemctl::new(&path.to_string_lossy()))
            }
            Err(e) => {
                warn!(
                    bin = %config.timers.systemctl_bin,
                    "service manager not found, timer sync and daemon health disabled: {e}"
                );
                Box::new(NoServiceManager)
            }
        };
        Self::with_backends(config, Box::new(crontab), services)
    }

    pub fn with_backends(
        config: &StackpilotConfig,
        crontab: Box<dyn CrontabBackend>,
        services: Box<dyn ServiceManager>,
    ) -> Self {
        let mut managed_needles = vec![config.cron.marker_prefix.clone()];
        managed_needles.extend(config.cron.app_patterns.iter().cloned());

        Self {
            store: MetadataStore::new(&config.cron.metadata_dir),
            crontab: CrontabAdapter::new(crontab, &config.cron.marker_prefix),
            services,
            scanner: config
                .timers
                .enabled
                .then(|| TimerScanner::new(&config.timers.unit_prefix)),
            executor: JobExecutor::new(&config.exec),
            app_patterns: config.cron.app_patterns.clone(),
            managed_needles,
            logs: config.logs.clone(),
        }
    }

    fn lock(&self) -> Result<StoreLock> {
        StoreLock::acquire(self.store.dir())
    }

    fn reconcile_locked(&self) -> Result<SyncReport> {
        let reconciler = Reconciler::new(&self.store, &self.crontab, &self.app_patterns);
        match &self.scanner {
            Some(scanner) => reconciler.with_timers(scanner, self.services.as_ref()).run(),
            None => reconciler.run(),
        }
    }

    /// Lock, then bring the store up to date with external sources.
    fn prepare(&self) -> Result<StoreLock> {
        let lock = self.lock()?;
        self.reconcile_locked()?;
        Ok(lock)
    }

    /// Run reconciliation on its own.
    pub fn reconcile(&self) -> Result<SyncReport> {
        let _lock = self.lock()?;
        self.reconcile_locked()
    }

    /// Create a manual job and install its entry.
    pub fn add_job(&self, schedule: &str, command: &str, description: &str) -> Result<Job> {
        let schedule = validate_schedule(schedule)?;
        let command = validate_command(command)?;
        let _lock = self.prepare()?;

        self.ensure_unique(&schedule, &command, None)?;
        let job = Job::new(
            next_job_id(&self.store, &self.crontab)?,
            &schedule,
            &command,
            description,
            JobSource::Manual,
        );
        self.crontab.append_job(&job)?;
        self.store.create(&job)?;
        info!(job_id = job.id, schedule = %job.schedule, "job created");
        Ok(job)
    }

    /// Record a job another subsystem has already installed. The live
    /// schedule is not touched. Registering a known `(schedule, command)`
    /// pair returns the existing record.
    pub fn register_job(
        &self,
        source: JobSource,
        schedule: &str,
        command: &str,
        description: &str,
    ) -> Result<Job> {
        let schedule = validate_schedule(schedule)?;
        let command = validate_command(command)?;
        let _lock = self.prepare()?;

        if let Some(existing) = self
            .store
            .list(JobFilter::All)?
            .into_iter()
            .find(|j| j.same_entry(&schedule, &command))
        {
            debug!(job_id = existing.id, "register: entry already recorded");
            return Ok(existing);
        }

        let job = Job::new(
            next_job_id(&self.store, &self.crontab)?,
            &schedule,
            &command,
            description,
            source,
        );
        self.store.create(&job)?;
        info!(job_id = job.id, source = %job.source, "job registered");
        Ok(job)
    }

    /// All jobs, or only those whose command identifies the application.
    pub fn list_jobs(&self, managed_only: bool) -> Result<Vec<Job>> {
        let _lock = self.prepare()?;
        if managed_only {
            self.store.list(JobFilter::CommandContains(&self.managed_needles))
        } else {
            self.store.list(JobFilter::All)
        }
    }

    pub fn get_job(&self, id: u64) -> Result<Job> {
        let _lock = self.prepare()?;
        self.store.read(id)
    }

    /// Change schedule, command or description. An enabled crontab job has
    /// its entry rewritten in place under the same marker.
    ///
    /// Schedule and command of a timer-backed job are owned by the unit and
    /// are refreshed from it by the next reconciliation.
    pub fn update_job(&self, id: u64, update: JobUpdate) -> Result<Job> {
        let schedule = update.schedule.as_deref().map(validate_schedule).transpose()?;
        let command = update.command.as_deref().map(validate_command).transpose()?;
        let _lock = self.prepare()?;

        let mut job = self.store.read(id)?;
        if update.is_empty() {
            return Ok(job);
        }
        if let Some(schedule) = schedule {
            job.schedule = schedule;
        }
        if let Some(command) = command {
            job.command = command;
        }
        if let Some(description) = update.description {
            job.description = description;
        }
        self.ensure_unique(&job.schedule, &job.command, Some(id))?;

        if job.enabled && !job.is_timer_backed() {
            self.crontab.update_job(&job)?;
        }
        self.store.update(&job)?;
        info!(job_id = id, schedule = %job.schedule, "job updated");
        Ok(job)
    }

    /// Remove the record and its live-schedule entry, returning the record.
    ///
    /// A timer-backed record loses only its metadata; the unit is re-adopted
    /// by the next reconciliation while it still exists.
    pub fn delete_job(&self, id: u64) -> Result<Job> {
        let _lock = self.prepare()?;
        let job = self.store.read(id)?;

        if !job.is_timer_backed() {
            self.crontab.remove_job(id)?;
        }
        self.store.delete(id)?;
        info!(job_id = id, "job deleted");
        Ok(job)
    }

    /// Run the job's command now and record the outcome.
    ///
    /// The lock is released while the command runs so a long job does not
    /// block other invocations.
    pub async fn run_job(&self, id: u64) -> Result<RunReport> {
        let job = {
            let _lock = self.prepare()?;
            self.store.read(id)?
        };

        let started_at = chrono::Utc::now();
        let report = self.executor.run(&job).await?;

        let _lock = self.lock()?;
        match self.store.read(id) {
            Ok(mut current) => {
                current.record_run(started_at, report.outcome.clone());
                self.store.update(&current)?;
            }
            Err(CronError::JobNotFound { .. }) => {
                warn!(job_id = id, "job deleted while running, outcome not recorded");
            }
            Err(e) => return Err(e),
        }
        Ok(report)
    }

    pub fn enable_job(&self, id: u64) -> Result<Job> {
        self.set_enabled(id, true)
    }

    pub fn disable_job(&self, id: u64) -> Result<Job> {
        self.set_enabled(id, false)
    }

    fn set_enabled(&self, id: u64, enabled: bool) -> Result<Job> {
        let _lock = self.prepare()?;
        let mut job = self.store.read(id)?;
        if job.enabled == enabled {
            return Err(if enabled {
                CronError::AlreadyEnabled { id }
            } else {
                CronError::AlreadyDisabled { id }
            });
        }

        job.enabled = enabled;
        match job.timer_unit.as_deref() {
            Some(unit) => self.services.set_timer_enabled(unit, enabled)?,
            // The entry can already be live if an earlier record write failed.
            None if enabled => self.crontab.update_job(&job)?,
            None => {
                self.crontab.remove_job(id)?;
            }
        }
        self.store.update(&job)?;
        info!(job_id = id, enabled, "job toggled");
        Ok(job)
    }

    /// Aggregate counts and daemon health.
    pub fn status(&self) -> Result<CronStatus> {
        let _lock = self.prepare()?;
        let jobs = self.store.list(JobFilter::All)?;
        let active = status::daemon_active(self.services.as_ref(), &self.logs.daemon_units);
        Ok(status::summarize(&jobs, &self.managed_needles, active))
    }

    /// Last `count` cron log lines, optionally containing `pattern`.
    pub fn logs(&self, count: usize, pattern: Option<&str>) -> Result<Vec<String>> {
        status::recent_log_lines(&self.logs, count, pattern)
    }

    /// Refuse a second record for a `(schedule, command)` pair.
    fn ensure_unique(&self, schedule: &str, command: &str, except: Option<u64>) -> Result<()> {
        let clash = self
            .store
            .list(JobFilter::All)?
            .into_iter()
            .find(|j| Some(j.id) != except && j.same_entry(schedule, command));
        match clash {
            Some(existing) => Err(CronError::DuplicateJob { id: existing.id }),
            None => Ok(()),
        }
    }
}
