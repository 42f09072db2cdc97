//! Metadata store: one `job-<id>.json` file per job.
//!
//! Records are written to a temp file in the same directory and renamed into
//! place, so a crash mid-write never damages an existing record and never
//! touches other jobs.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{CronError, Result};
use crate::types::Job;

/// Which records [`MetadataStore::list`] returns.
#[derive(Debug, Clone, Copy)]
pub enum JobFilter<'a> {
    All,
    /// Only records whose command contains at least one of these substrings.
    CommandContains(&'a [String]),
}

impl JobFilter<'_> {
    fn matches(&self, job: &Job) -> bool {
        match self {
            JobFilter::All => true,
            JobFilter::CommandContains(needles) => {
                needles.iter().any(|n| !n.is_empty() && job.command.contains(n.as_str()))
            }
        }
    }
}

pub struct MetadataStore {
    dir: PathBuf,
}

impl MetadataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the store directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| CronError::io(format!("creating {}", self.dir.display()), e))
    }

    fn path_for(&self, id: u64) -> PathBuf {
        self.dir.join(format!("job-{id}.json"))
    }

    /// IDs of every record file, ascending. A missing directory is an empty store.
    pub fn ids(&self) -> Result<Vec<u64>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CronError::io(format!("reading {}", self.dir.display()), e)),
        };

        let mut ids: Vec<u64> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| parse_record_name(&entry.file_name().to_string_lossy()))
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Next free ID: highest existing + 1, or 1 for an empty store.
    ///
    /// Gaps left by deleted jobs are never reused. Callers must hold the
    /// store lock between allocation and `create`.
    pub fn allocate_id(&self) -> Result<u64> {
        Ok(self.ids()?.last().map_or(1, |max| max + 1))
    }

    pub fn exists(&self, id: u64) -> bool {
        self.path_for(id).is_file()
    }

    /// Persist a new record. Fails with `IdInUse` if one exists for `job.id`.
    pub fn create(&self, job: &Job) -> Result<()> {
        if self.exists(job.id) {
            return Err(CronError::IdInUse { id: job.id });
        }
        self.ensure_dir()?;
        self.write_record(job)?;
        debug!(job_id = job.id, source = %job.source, "job record created");
        Ok(())
    }

    pub fn read(&self, id: u64) -> Result<Job> {
        let path = self.path_for(id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CronError::JobNotFound { id })
            }
            Err(e) => return Err(CronError::io(format!("reading {}", path.display()), e)),
        };
        serde_json::from_str(&raw).map_err(|e| CronError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Overwrite an existing record.
    pub fn update(&self, job: &Job) -> Result<()> {
        if !self.exists(job.id) {
            return Err(CronError::JobNotFound { id: job.id });
        }
        self.write_record(job)
    }

    pub fn delete(&self, id: u64) -> Result<()> {
        let path = self.path_for(id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(job_id = id, "job record deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CronError::JobNotFound { id }),
            Err(e) => Err(CronError::io(format!("removing {}", path.display()), e)),
        }
    }

    /// All readable records matching `filter`, in ascending ID order.
    ///
    /// Undecodable records are skipped with a warning so one damaged file
    /// cannot hide the rest.
    pub fn list(&self, filter: JobFilter<'_>) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        for id in self.ids()? {
            match self.read(id) {
                Ok(job) if filter.matches(&job) => jobs.push(job),
                Ok(_) => {}
                Err(CronError::JobNotFound { .. }) => {}
                Err(e @ CronError::Corrupt { .. }) => warn!(job_id = id, "skipping record: {e}"),
                Err(e) => return Err(e),
            }
        }
        Ok(jobs)
    }

    fn write_record(&self, job: &Job) -> Result<()> {
        let path = self.path_for(job.id);
        let json = serde_json::to_string_pretty(job)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| CronError::io(format!("creating temp file in {}", self.dir.display()), e))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.write_all(b"\n"))
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| CronError::io(format!("writing record for job {}", job.id), e))?;
        tmp.persist(&path)
            .map_err(|e| CronError::io(format!("replacing {}", path.display()), e.error))?;
        Ok(())
    }
}

/// `job-12.json` → `Some(12)`.
fn parse_record_name(name: &str) -> Option<u64> {
    let id = name.strip_prefix("job-")?.strip_suffix(".json")?;
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok().filter(|id| *id > 0)
}
