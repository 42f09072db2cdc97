//! Reconciliation: pull externally created entries into the metadata store.
//!
//! Three passes run in order, each idempotent:
//!
//! 1. **Marker sync** — marker-tagged crontab entries whose ID has no record.
//! 2. **Untagged sync** — unmarked crontab lines that reference the
//!    application. Adopted lines get a marker written above them, so from then
//!    on they are handled by pass 1 and by job-level crontab edits.
//! 3. **Timer sync** — prefixed timer units, including replacement of records
//!    stored in the legacy `ExecStart` encoding.
//!
//! No pass creates a record whose `(schedule, command)` pair already exists.

use tracing::{info, warn};

use crate::crontab::{insert_markers, is_body_line, max_marker_id, CrontabAdapter};
use crate::error::Result;
use crate::marker::Marker;
use crate::schedule::split_cron_line;
use crate::store::{JobFilter, MetadataStore};
use crate::timers::{is_legacy_command, DiscoveredTimer, ServiceManager, TimerScanner};
use crate::types::{Job, JobSource, SyncReport};

pub struct Reconciler<'a> {
    store: &'a MetadataStore,
    crontab: &'a CrontabAdapter,
    timers: Option<(&'a TimerScanner, &'a dyn ServiceManager)>,
    app_patterns: &'a [String],
}

impl<'a> Reconciler<'a> {
    pub fn new(
        store: &'a MetadataStore,
        crontab: &'a CrontabAdapter,
        app_patterns: &'a [String],
    ) -> Self {
        Self {
            store,
            crontab,
            timers: None,
            app_patterns,
        }
    }

    /// Enable the timer pass.
    pub fn with_timers(mut self, scanner: &'a TimerScanner, services: &'a dyn ServiceManager) -> Self {
        self.timers = Some((scanner, services));
        self
    }

    /// Run all passes. The caller must hold the store lock.
    pub fn run(&self) -> Result<SyncReport> {
        let mut report = SyncReport {
            tagged: self.sync_markers()?,
            adopted: self.sync_untagged()?,
            ..SyncReport::default()
        };
        if let Some((scanner, services)) = self.timers {
            self.sync_timers(&scanner.scan(services), &mut report)?;
        }
        if report.changes() > 0 {
            info!(
                tagged = report.tagged,
                adopted = report.adopted,
                timers = report.timers,
                refreshed = report.refreshed,
                healed = report.healed,
                "reconciliation merged external entries"
            );
        }
        Ok(report)
    }

    /// Pass 1: create records for marker IDs the store does not know.
    pub fn sync_markers(&self) -> Result<usize> {
        let text = self.crontab.read()?;
        let lines: Vec<&str> = text.lines().collect();
        let mut jobs = self.store.list(JobFilter::All)?;
        let mut created = 0;

        for (index, line) in lines.iter().enumerate() {
            let Some(marker) = Marker::parse(line, self.crontab.prefix()) else {
                continue;
            };
            if self.store.exists(marker.id) {
                continue;
            }
            let Some((schedule, command)) = body_after(&lines, index, self.crontab.prefix())
                .and_then(split_cron_line)
            else {
                warn!(job_id = marker.id, "marker without a valid entry line, skipping");
                continue;
            };
            if let Some(existing) = jobs.iter().find(|j| j.same_entry(&schedule, &command)) {
                warn!(
                    job_id = marker.id,
                    existing_id = existing.id,
                    "marker duplicates an existing job, skipping"
                );
                continue;
            }

            let job = Job::new(marker.id, &schedule, &command, "", marker.source);
            self.store.create(&job)?;
            info!(job_id = job.id, source = %job.source, "adopted marker-tagged entry");
            jobs.push(job);
            created += 1;
        }
        Ok(created)
    }

    /// Pass 2: adopt and tag unmarked lines that reference the application.
    pub fn sync_untagged(&self) -> Result<usize> {
        let text = self.crontab.read()?;
        let prefix = self.crontab.prefix();
        let existing = self.store.list(JobFilter::All)?;
        let mut next_id = self.store.allocate_id()?.max(max_marker_id(&text, prefix) + 1);

        let mut adopted: Vec<Job> = Vec::new();
        let mut inserts: Vec<(usize, Marker)> = Vec::new();
        let mut after_marker = false;

        for (index, line) in text.lines().enumerate() {
            if Marker::parse(line, prefix).is_some() {
                after_marker = true;
                continue;
            }
            if !is_body_line(line) {
                continue;
            }
            if after_marker {
                // Body of a tagged entry; pass 1 owns it.
                after_marker = false;
                continue;
            }
            let Some((schedule, command)) = split_cron_line(line) else {
                continue;
            };
            if !self.references_app(&command) {
                continue;
            }
            let known = existing
                .iter()
                .chain(adopted.iter())
                .any(|j| j.same_entry(&schedule, &command));
            if known {
                continue;
            }

            let source = JobSource::classify(&command, JobSource::Webstack);
            let job = Job::new(next_id, &schedule, &command, "", source);
            next_id += 1;
            inserts.push((index, Marker::for_job(prefix, &job)));
            adopted.push(job);
        }

        if adopted.is_empty() {
            return Ok(0);
        }

        // Tag the live schedule first: if record creation then fails, the next
        // marker pass recovers the records from the new markers.
        self.crontab.write(&insert_markers(&text, &inserts))?;
        for job in &adopted {
            self.store.create(job)?;
            info!(job_id = job.id, source = %job.source, "adopted untagged crontab entry");
        }
        Ok(adopted.len())
    }

    /// Pass 3: merge discovered timer units.
    pub fn sync_timers(&self, timers: &[DiscoveredTimer], report: &mut SyncReport) -> Result<()> {
        let mut jobs = self.store.list(JobFilter::All)?;

        for timer in timers {
            if jobs.iter().any(|j| j.same_entry(&timer.schedule, &timer.command)) {
                continue;
            }

            let stale = jobs
                .iter()
                .position(|j| {
                    j.schedule == timer.schedule
                        && j.description == timer.description
                        && is_legacy_command(&j.command)
                });
            if let Some(pos) = stale {
                let old = jobs.remove(pos);
                self.store.delete(old.id)?;
                let job = self.timer_job(next_job_id(self.store, self.crontab)?, timer);
                self.store.create(&job)?;
                info!(old_id = old.id, job_id = job.id, unit = %timer.unit, "replaced legacy timer record");
                jobs.push(job);
                report.healed += 1;
                continue;
            }

            let moved = jobs
                .iter_mut()
                .find(|j| j.timer_unit.as_deref() == Some(timer.unit.as_str()));
            if let Some(job) = moved {
                job.schedule = timer.schedule.clone();
                job.command = timer.command.clone();
                self.store.update(job)?;
                info!(job_id = job.id, unit = %timer.unit, schedule = %job.schedule, "timer schedule refreshed");
                report.refreshed += 1;
                continue;
            }

            let job = self.timer_job(next_job_id(self.store, self.crontab)?, timer);
            self.store.create(&job)?;
            info!(job_id = job.id, unit = %timer.unit, "adopted timer unit");
            jobs.push(job);
            report.timers += 1;
        }
        Ok(())
    }

    fn timer_job(&self, id: u64, timer: &DiscoveredTimer) -> Job {
        let mut job = Job::new(id, &timer.schedule, &timer.command, &timer.description, timer.source);
        job.enabled = timer.enabled;
        job.timer_unit = Some(timer.unit.clone());
        job
    }

    fn references_app(&self, command: &str) -> bool {
        self.app_patterns
            .iter()
            .any(|p| !p.is_empty() && command.contains(p.as_str()))
    }
}

/// Next free job ID: above every stored record and every marker in the live
/// schedule, including markers no record was created for. Call with the store
/// lock held.
pub fn next_job_id(store: &MetadataStore, crontab: &CrontabAdapter) -> Result<u64> {
    let text = crontab.read()?;
    Ok(store.allocate_id()?.max(max_marker_id(&text, crontab.prefix()) + 1))
}

/// First body line after `lines[index]`, stopping at the next marker.
fn body_after<'l>(lines: &[&'l str], index: usize, prefix: &str) -> Option<&'l str> {
    lines[index + 1..]
        .iter()
        .take_while(|line| Marker::parse(line, prefix).is_none())
        .find(|line| is_body_line(line))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeServices, MemoryCrontab};

    struct Fixture {
        _dir: tempfile::TempDir,
        store: MetadataStore,
        backend: MemoryCrontab,
        crontab: CrontabAdapter,
        services: FakeServices,
        scanner: TimerScanner,
        patterns: Vec<String>,
    }

    impl Fixture {
        fn new(crontab_text: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = MetadataStore::new(dir.path().join("jobs"));
            let backend = MemoryCrontab::new(Some(crontab_text));
            let crontab = CrontabAdapter::new(Box::new(backend.clone()), "myapp");
            Self {
                _dir: dir,
                store,
                backend,
                crontab,
                services: FakeServices::default(),
                scanner: TimerScanner::new("myapp-"),
                patterns: vec!["myapp".to_string(), "certbot renew".to_string()],
            }
        }

        fn reconciler(&self) -> Reconciler<'_> {
            Reconciler::new(&self.store, &self.crontab, &self.patterns)
                .with_timers(&self.scanner, &self.services)
        }

        fn all(&self) -> Vec<Job> {
            self.store.list(JobFilter::All).unwrap()
        }
    }

    #[test]
    fn marker_entry_becomes_record() {
        let fx = Fixture::new("# myapp-job-7\n0 2 * * * /usr/bin/true\n");
        let report = fx.reconciler().run().unwrap();
        assert_eq!(report.tagged, 1);

        let job = fx.store.read(7).unwrap();
        assert_eq!(job.id, 7);
        assert_eq!(job.schedule, "0 2 * * *");
        assert_eq!(job.command, "/usr/bin/true");
        assert_eq!(job.source, JobSource::Manual);
        assert!(job.enabled);
    }

    #[test]
    fn marker_source_tag_is_kept() {
        let fx = Fixture::new("# myapp-backup-3\n30 1 * * * /opt/backup.sh\n");
        fx.reconciler().run().unwrap();
        assert_eq!(fx.store.read(3).unwrap().source, JobSource::Backup);
    }

    #[test]
    fn marker_for_known_id_is_left_alone() {
        let fx = Fixture::new("# myapp-job-1\n0 2 * * * changed-outside\n");
        let original = Job::new(1, "0 2 * * *", "original", "", JobSource::Manual);
        fx.store.create(&original).unwrap();

        fx.reconciler().run().unwrap();
        assert_eq!(fx.store.read(1).unwrap().command, "original");
    }

    #[test]
    fn marker_without_body_is_skipped() {
        let fx = Fixture::new("# myapp-job-4\n# myapp-job-5\n0 5 * * * five\n");
        let report = fx.reconciler().run().unwrap();
        assert_eq!(report.tagged, 1);
        assert!(!fx.store.exists(4));
        assert_eq!(fx.store.read(5).unwrap().command, "five");
    }

    #[test]
    fn untagged_app_line_is_adopted_and_tagged() {
        let fx = Fixture::new(
            "MAILTO=root\n0 3 * * * /usr/local/bin/myapp backup --all\n15 4 * * * /opt/vendor/rotate\n",
        );
        let report = fx.reconciler().run().unwrap();
        assert_eq!(report.adopted, 1);

        let jobs = fx.all();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, 1);
        assert_eq!(jobs[0].source, JobSource::Backup);
        assert_eq!(jobs[0].command, "/usr/local/bin/myapp backup --all");

        assert_eq!(
            fx.backend.text(),
            "MAILTO=root\n# myapp-backup-1\n0 3 * * * /usr/local/bin/myapp backup --all\n15 4 * * * /opt/vendor/rotate\n"
        );
    }

    #[test]
    fn untagged_keyword_classification_defaults_to_webstack() {
        let fx = Fixture::new("*/5 * * * * myapp queue:work\n0 0 * * 1 certbot renew -q\n");
        fx.reconciler().run().unwrap();

        let jobs = fx.all();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].source, JobSource::Webstack);
        assert_eq!(jobs[1].source, JobSource::Ssl);
        assert!(fx.backend.text().contains("# myapp-webstack-1\n*/5 * * * * myapp queue:work"));
        assert!(fx.backend.text().contains("# myapp-ssl-2\n0 0 * * 1 certbot renew -q"));
    }

    #[test]
    fn untagged_line_matching_existing_record_is_not_duplicated() {
        let fx = Fixture::new("0 3 * * * myapp backup\n");
        let mut disabled = Job::new(9, "0 3 * * *", "myapp backup", "", JobSource::Backup);
        disabled.enabled = false;
        fx.store.create(&disabled).unwrap();

        let report = fx.reconciler().run().unwrap();
        assert_eq!(report.adopted, 0);
        assert_eq!(fx.all().len(), 1);
        assert_eq!(fx.backend.installs(), 0);
    }

    #[test]
    fn identical_untagged_lines_adopt_once() {
        let fx = Fixture::new("0 3 * * * myapp backup\n0 3 * * * myapp backup\n");
        let report = fx.reconciler().run().unwrap();
        assert_eq!(report.adopted, 1);
        assert_eq!(fx.all().len(), 1);
    }

    #[test]
    fn timer_is_adopted_once() {
        let fx = Fixture::new("");
        fx.services
            .add_timer("myapp-backup.timer", "*-*-* 03:15:00", "myapp-backup.service");

        let report = fx.reconciler().run().unwrap();
        assert_eq!(report.timers, 1);

        let job = &fx.all()[0];
        assert_eq!(job.schedule, "15 3 * * *");
        assert_eq!(job.command, "systemctl start myapp-backup.service");
        assert_eq!(job.description, "Timer unit myapp-backup.timer");
        assert_eq!(job.source, JobSource::Backup);
        assert_eq!(job.timer_unit.as_deref(), Some("myapp-backup.timer"));
        // Timer-backed jobs never touch the crontab.
        assert_eq!(fx.backend.installs(), 0);
    }

    #[test]
    fn legacy_timer_record_is_replaced() {
        let fx = Fixture::new("");
        fx.services.add_timer("myapp-dns.timer", "daily", "myapp-dns.service");
        let legacy = Job::new(
            2,
            "0 0 * * *",
            "{ path=/usr/bin/dns-sync ; argv[]=/usr/bin/dns-sync ; }",
            "Timer unit myapp-dns.timer",
            JobSource::Dns,
        );
        fx.store.create(&legacy).unwrap();

        let report = fx.reconciler().run().unwrap();
        assert_eq!(report.healed, 1);
        assert_eq!(report.timers, 0);

        let jobs = fx.all();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].command, "systemctl start myapp-dns.service");
        // The stale record is gone; its replacement takes max + 1 of what is left.
        assert!(!fx.store.exists(2));
        assert_eq!(jobs[0].id, 1);
    }

    #[test]
    fn timer_calendar_change_refreshes_record() {
        let fx = Fixture::new("");
        fx.services.add_timer("myapp-clean.timer", "daily", "myapp-clean.service");
        fx.reconciler().run().unwrap();

        fx.services.set_calendar("myapp-clean.timer", "*-*-* 04:30");
        let report = fx.reconciler().run().unwrap();
        assert_eq!(report.refreshed, 1);

        let jobs = fx.all();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].schedule, "30 4 * * *");
    }

    #[test]
    fn adopted_lines_skip_ids_of_unrecorded_markers() {
        let fx = Fixture::new("# myapp-backup-4\n@daily /usr/local/bin/myapp backup\n0 3 * * * myapp rotate\n");
        let report = fx.reconciler().run().unwrap();
        assert_eq!(report.tagged, 0);
        assert_eq!(report.adopted, 1);
        assert_eq!(fx.all()[0].id, 5);
        assert!(fx.backend.text().contains("# myapp-webstack-5\n0 3 * * * myapp rotate"));
    }

    #[test]
    fn timer_ids_skip_ids_of_unrecorded_markers() {
        let fx = Fixture::new("# myapp-job-3\n");
        fx.services.add_timer("myapp-clean.timer", "daily", "myapp-clean.service");
        fx.reconciler().run().unwrap();
        assert_eq!(fx.all()[0].id, 4);
    }

    #[test]
    fn second_run_creates_nothing() {
        let fx = Fixture::new(
            "# myapp-job-7\n0 2 * * * /usr/bin/true\n0 3 * * * myapp backup\n",
        );
        fx.services.add_timer("myapp-ssl.timer", "weekly", "myapp-ssl.service");

        let first = fx.reconciler().run().unwrap();
        assert_eq!(first.changes(), 3);
        let after_first = fx.all();
        let text_after_first = fx.backend.text();

        let second = fx.reconciler().run().unwrap();
        assert_eq!(second, SyncReport::default());
        assert_eq!(fx.all(), after_first);
        assert_eq!(fx.backend.text(), text_after_first);
    }

    #[test]
    fn broken_timer_listing_does_not_fail_reconciliation() {
        let fx = Fixture::new("# myapp-job-1\n0 1 * * * one\n");
        fx.services.break_listing();
        let report = fx.reconciler().run().unwrap();
        assert_eq!(report.tagged, 1);
    }
}
