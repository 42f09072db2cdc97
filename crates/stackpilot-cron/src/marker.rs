//! Marker comments that tie a crontab entry to its job record.
//!
//! Grammar (one line, leading/trailing whitespace ignored):
//!
//! ```text
//! marker := "#" [ws] prefix "-" tag "-" id
//! tag    := "job" | "backup" | "ssl" | "dns" | "systemd" | "webstack"
//! id     := positive decimal integer
//! ```
//!
//! `job` is the tag for manually created jobs. Every path that writes or scans
//! the live schedule goes through [`Marker::encode`] and [`Marker::parse`].

use crate::types::{Job, JobSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub prefix: String,
    pub source: JobSource,
    pub id: u64,
}

impl Marker {
    pub fn new(prefix: &str, source: JobSource, id: u64) -> Self {
        Self {
            prefix: prefix.to_string(),
            source,
            id,
        }
    }

    pub fn for_job(prefix: &str, job: &Job) -> Self {
        Self::new(prefix, job.source, job.id)
    }

    /// Render the full comment line, without a trailing newline.
    pub fn encode(&self) -> String {
        format!("# {}-{}-{}", self.prefix, self.source.tag(), self.id)
    }

    /// Decode `line` if it is a marker carrying `prefix`.
    pub fn parse(line: &str, prefix: &str) -> Option<Self> {
        let body = line.trim().strip_prefix('#')?.trim_start();
        let rest = body.strip_prefix(prefix)?.strip_prefix('-')?;
        let (tag, id) = rest.rsplit_once('-')?;

        let source = JobSource::from_tag(tag)?;
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let id: u64 = id.parse().ok()?;
        if id == 0 {
            return None;
        }

        Some(Self::new(prefix, source, id))
    }
}
