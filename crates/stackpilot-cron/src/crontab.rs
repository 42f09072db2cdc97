//! Crontab adapter: treats the live schedule as opaque text where every job
//! entry is a marker line followed by its `schedule command` body line.
//!
//! The live file is never edited in place. New text goes to a temp file that
//! the schedule-install command (`crontab <file>`) installs atomically; if
//! the install fails the previous schedule stays in effect.

use std::io::Write;
use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use crate::error::{CronError, Result};
use crate::marker::Marker;
use crate::types::Job;

/// Access to the live schedule.
pub trait CrontabBackend: Send + Sync {
    /// Current schedule text, `None` when no crontab is installed.
    fn read(&self) -> Result<Option<String>>;

    /// Install the file at `path` as the new live schedule.
    fn install(&self, path: &Path) -> Result<()>;
}

/// The system `crontab` command, optionally for another user.
pub struct SystemCrontab {
    bin: String,
    user: Option<String>,
}

impl SystemCrontab {
    pub fn new(bin: &str, user: Option<&str>) -> Self {
        Self {
            bin: bin.to_string(),
            user: user.map(str::to_string),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.bin);
        if let Some(ref user) = self.user {
            cmd.arg("-u").arg(user);
        }
        cmd
    }
}

impl CrontabBackend for SystemCrontab {
    fn read(&self) -> Result<Option<String>> {
        let output = self
            .command()
            .arg("-l")
            .output()
            .map_err(|e| CronError::io(format!("running {} -l", self.bin), e))?;

        if output.status.success() {
            return Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()));
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        // `crontab -l` exits 1 with "no crontab for <user>" before first install.
        if stderr.to_lowercase().contains("no crontab") {
            return Ok(None);
        }
        Err(CronError::Command {
            command: format!("{} -l", self.bin),
            reason: stderr.trim().to_string(),
        })
    }

    fn install(&self, path: &Path) -> Result<()> {
        let output = self
            .command()
            .arg(path)
            .output()
            .map_err(|e| CronError::io(format!("running {} {}", self.bin, path.display()), e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(CronError::InstallFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

/// Job-level operations on the live schedule.
pub struct CrontabAdapter {
    backend: Box<dyn CrontabBackend>,
    prefix: String,
}

impl CrontabAdapter {
    pub fn new(backend: Box<dyn CrontabBackend>, prefix: &str) -> Self {
        Self {
            backend,
            prefix: prefix.to_string(),
        }
    }

    /// Marker prefix used for every entry this adapter writes or scans.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full current text, empty when no schedule exists yet.
    pub fn read(&self) -> Result<String> {
        Ok(self.backend.read()?.unwrap_or_default())
    }

    /// Install `text` as the live schedule via a temp file.
    pub fn write(&self, text: &str) -> Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix("stackpilot-crontab-")
            .tempfile()
            .map_err(|e| CronError::io("creating crontab temp file", e))?;

        let mut body = text.to_string();
        // crontab rejects a final entry without a newline.
        if !body.is_empty() && !body.ends_with('\n') {
            body.push('\n');
        }
        tmp.write_all(body.as_bytes())
            .and_then(|_| tmp.flush())
            .map_err(|e| CronError::io("writing crontab temp file", e))?;

        self.backend.install(tmp.path())?;
        debug!(bytes = body.len(), "crontab installed");
        Ok(())
    }

    /// Append the marker + body pair for `job`. No-op for disabled jobs.
    pub fn append_job(&self, job: &Job) -> Result<()> {
        if !job.enabled {
            return Ok(());
        }
        let text = self.read()?;
        self.write(&append_entry(&text, &self.prefix, job))?;
        info!(job_id = job.id, "crontab entry added");
        Ok(())
    }

    /// Remove every marker tagged `id` and its body line.
    ///
    /// Returns `false` (and writes nothing) when no marker matched, which is
    /// the normal case for disabled jobs.
    pub fn remove_job(&self, id: u64) -> Result<bool> {
        let text = self.read()?;
        let (stripped, removed) = strip_entry(&text, &self.prefix, id);
        if !removed {
            debug!(job_id = id, "no crontab entry to remove");
            return Ok(false);
        }
        self.write(&stripped)?;
        info!(job_id = id, "crontab entry removed");
        Ok(true)
    }

    /// Rewrite the entry for `job` in place, appending it if it is missing.
    pub fn update_job(&self, job: &Job) -> Result<()> {
        let text = self.read()?;
        match replace_entry(&text, &self.prefix, job) {
            Some(updated) => {
                self.write(&updated)?;
                info!(job_id = job.id, "crontab entry updated");
                Ok(())
            }
            None => self.append_job(job),
        }
    }
}

/// A line that could carry a job: non-blank and not a comment.
pub fn is_body_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

/// Highest ID carried by any marker in `text`, 0 when there is none.
pub fn max_marker_id(text: &str, prefix: &str) -> u64 {
    text.lines()
        .filter_map(|line| Marker::parse(line, prefix))
        .map(|marker| marker.id)
        .max()
        .unwrap_or(0)
}

/// Marker and body line for `job`, newline-terminated.
pub fn render_entry(prefix: &str, job: &Job) -> String {
    format!(
        "{}\n{} {}\n",
        Marker::for_job(prefix, job).encode(),
        job.schedule,
        job.command
    )
}

pub fn append_entry(text: &str, prefix: &str, job: &Job) -> String {
    let mut out = text.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&render_entry(prefix, job));
    out
}

/// Drop each marker for `id` plus the first body line after it.
///
/// Comments and blanks between a marker and its body are kept. Runs of blank
/// lines left behind are collapsed to one.
pub fn strip_entry(text: &str, prefix: &str, id: u64) -> (String, bool) {
    let mut kept: Vec<&str> = Vec::new();
    let mut removed = false;
    let mut skip_body = false;

    for line in text.lines() {
        if let Some(marker) = Marker::parse(line, prefix) {
            // A marker without a body must not swallow the next job's line.
            skip_body = false;
            if marker.id == id {
                removed = true;
                skip_body = true;
                continue;
            }
        } else if skip_body && is_body_line(line) {
            skip_body = false;
            continue;
        }
        kept.push(line);
    }

    (join_lines(&collapse_blank_runs(kept)), removed)
}

/// Replace the marker and body for `job.id`; `None` if no marker exists.
///
/// Duplicate markers for the same job are dropped with their bodies. A marker
/// that lost its body line gets the new body written after it.
pub fn replace_entry(text: &str, prefix: &str, job: &Job) -> Option<String> {
    let marker_line = Marker::for_job(prefix, job).encode();
    let body_line = format!("{} {}", job.schedule, job.command);

    let mut out: Vec<&str> = Vec::new();
    let mut found = false;
    let mut replace_body = false;
    let mut drop_body = false;

    for line in text.lines() {
        if let Some(marker) = Marker::parse(line, prefix) {
            if replace_body {
                out.push(&body_line);
                replace_body = false;
            }
            drop_body = false;
            if marker.id == job.id {
                if found {
                    drop_body = true;
                } else {
                    found = true;
                    replace_body = true;
                    out.push(&marker_line);
                }
                continue;
            }
        } else if is_body_line(line) {
            if replace_body {
                replace_body = false;
                out.push(&body_line);
                continue;
            }
            if drop_body {
                drop_body = false;
                continue;
            }
        }
        out.push(line);
    }
    if replace_body {
        out.push(&body_line);
    }

    found.then(|| join_lines(&out))
}

/// Insert each marker directly above the line at its index.
pub fn insert_markers(text: &str, inserts: &[(usize, Marker)]) -> String {
    let mut out: Vec<String> = Vec::new();
    for (index, line) in text.lines().enumerate() {
        for (_, marker) in inserts.iter().filter(|(at, _)| *at == index) {
            out.push(marker.encode());
        }
        out.push(line.to_string());
    }
    let lines: Vec<&str> = out.iter().map(String::as_str).collect();
    join_lines(&lines)
}

fn collapse_blank_runs(lines: Vec<&str>) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    for line in lines {
        let blank = line.trim().is_empty();
        if blank && out.last().is_some_and(|prev| prev.trim().is_empty()) {
            continue;
        }
        out.push(line);
    }
    out
}

fn join_lines(lines: &[&str]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryCrontab;
    use crate::types::JobSource;

    const PREFIX: &str = "myapp";

    fn job(id: u64, schedule: &str, command: &str) -> Job {
        Job::new(id, schedule, command, "", JobSource::Manual)
    }

    fn adapter(initial: Option<&str>) -> (MemoryCrontab, CrontabAdapter) {
        let backend = MemoryCrontab::new(initial);
        let adapter = CrontabAdapter::new(Box::new(backend.clone()), PREFIX);
        (backend, adapter)
    }

    #[test]
    fn read_without_crontab_is_empty() {
        let (_backend, adapter) = adapter(None);
        assert_eq!(adapter.read().unwrap(), "");
    }

    #[test]
    fn append_writes_marker_then_body() {
        let (backend, adapter) = adapter(Some("MAILTO=root\n"));
        adapter.append_job(&job(7, "0 2 * * *", "/usr/bin/true")).unwrap();
        assert_eq!(
            backend.text(),
            "MAILTO=root\n# myapp-job-7\n0 2 * * * /usr/bin/true\n"
        );
    }

    #[test]
    fn append_disabled_job_is_noop() {
        let (backend, adapter) = adapter(Some("x\n"));
        let mut disabled = job(1, "* * * * *", "true");
        disabled.enabled = false;
        adapter.append_job(&disabled).unwrap();
        assert_eq!(backend.installs(), 0);
    }

    #[test]
    fn remove_leaves_other_entries_untouched() {
        let text = "\
SHELL=/bin/sh
# myapp-job-1
0 1 * * * one
# myapp-job-2
0 2 * * * two
# unrelated note
15 4 * * * /opt/third-party
# myapp-ssl-3
0 3 * * * three
";
        let (backend, adapter) = adapter(Some(text));
        assert!(adapter.remove_job(2).unwrap());
        assert_eq!(
            backend.text(),
            "\
SHELL=/bin/sh
# myapp-job-1
0 1 * * * one
# unrelated note
15 4 * * * /opt/third-party
# myapp-ssl-3
0 3 * * * three
"
        );
    }

    #[test]
    fn remove_missing_marker_is_noop() {
        let (backend, adapter) = adapter(Some("# myapp-job-1\n0 1 * * * one\n"));
        assert!(!adapter.remove_job(5).unwrap());
        assert_eq!(backend.installs(), 0);
    }

    #[test]
    fn remove_collapses_blank_runs() {
        let text = "a\n\n# myapp-job-4\n0 4 * * * four\n\nb\n";
        let (stripped, removed) = strip_entry(text, PREFIX, 4);
        assert!(removed);
        assert_eq!(stripped, "a\n\nb\n");
    }

    #[test]
    fn body_search_skips_comments_but_not_other_markers() {
        let text = "# myapp-job-1\n# myapp-job-2\n0 2 * * * two\n";
        let (stripped, removed) = strip_entry(text, PREFIX, 1);
        assert!(removed);
        assert_eq!(stripped, "# myapp-job-2\n0 2 * * * two\n");

        let text = "# myapp-job-1\n# keep me\n0 1 * * * one\nrest\n";
        let (stripped, _) = strip_entry(text, PREFIX, 1);
        assert_eq!(stripped, "# keep me\nrest\n");
    }

    #[test]
    fn removing_last_entry_yields_empty_text() {
        let (stripped, removed) = strip_entry("# myapp-job-1\n0 1 * * * one\n", PREFIX, 1);
        assert!(removed);
        assert_eq!(stripped, "");
    }

    #[test]
    fn update_replaces_body_under_same_marker() {
        let text = "# myapp-job-1\n0 2 * * * /usr/bin/true\n# myapp-job-2\n5 5 * * * other\n";
        let (backend, adapter) = adapter(Some(text));
        adapter
            .update_job(&job(1, "30 3 * * *", "/usr/bin/true"))
            .unwrap();

        let live = backend.text();
        assert_eq!(
            live,
            "# myapp-job-1\n30 3 * * * /usr/bin/true\n# myapp-job-2\n5 5 * * * other\n"
        );
        assert!(!live.contains("0 2 * * *"));
    }

    #[test]
    fn update_drops_duplicate_markers_for_the_same_job() {
        let text = "# myapp-job-1\n0 1 * * * a\n# myapp-job-1\n0 1 * * * a\n";
        let updated = replace_entry(text, PREFIX, &job(1, "0 9 * * *", "a")).unwrap();
        assert_eq!(updated, "# myapp-job-1\n0 9 * * * a\n");
    }

    #[test]
    fn update_restores_a_missing_body() {
        let text = "# myapp-job-1\n# myapp-job-2\n0 2 * * * two\n";
        let updated = replace_entry(text, PREFIX, &job(1, "0 1 * * *", "one")).unwrap();
        assert_eq!(
            updated,
            "# myapp-job-1\n0 1 * * * one\n# myapp-job-2\n0 2 * * * two\n"
        );
    }

    #[test]
    fn update_without_marker_appends() {
        let (backend, adapter) = adapter(Some(""));
        adapter.update_job(&job(3, "0 0 * * *", "x")).unwrap();
        assert_eq!(backend.text(), "# myapp-job-3\n0 0 * * * x\n");
    }

    #[test]
    fn failed_install_leaves_schedule_untouched() {
        let (backend, adapter) = adapter(Some("# myapp-job-1\n0 1 * * * one\n"));
        backend.fail_installs(true);

        let err = adapter.append_job(&job(2, "0 2 * * *", "two")).unwrap_err();
        assert!(matches!(err, CronError::InstallFailed(_)));
        assert_eq!(backend.text(), "# myapp-job-1\n0 1 * * * one\n");
    }

    #[test]
    fn max_marker_id_ignores_foreign_prefixes() {
        let text = "# myapp-backup-4\n@daily x\n# other-job-9\n# myapp-job-2\n";
        assert_eq!(max_marker_id(text, PREFIX), 4);
        assert_eq!(max_marker_id("0 1 * * * one\n", PREFIX), 0);
    }

    #[test]
    fn insert_markers_above_lines() {
        let text = "a\nb\nc\n";
        let out = insert_markers(
            text,
            &[
                (1, Marker::new(PREFIX, JobSource::Backup, 4)),
                (2, Marker::new(PREFIX, JobSource::Webstack, 5)),
            ],
        );
        assert_eq!(out, "a\n# myapp-backup-4\nb\n# myapp-webstack-5\nc\n");
    }
}
