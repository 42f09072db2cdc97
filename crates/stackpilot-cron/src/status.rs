//! Read-only views: aggregate counts, daemon health and cron log lines.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use stackpilot_core::config::LogsConfig;
use tracing::debug;

use crate::error::{CronError, Result};
use crate::timers::ServiceManager;
use crate::types::{CronStatus, Job};

/// Count jobs. `managed_needles` identifies application-owned commands.
///
/// `last_run` is the first recorded run in the order given, which for the
/// store's ascending-ID listing is not necessarily the most recent one.
pub fn summarize(jobs: &[Job], managed_needles: &[String], daemon_active: bool) -> CronStatus {
    let total = jobs.len();
    let managed = jobs
        .iter()
        .filter(|j| {
            managed_needles
                .iter()
                .any(|n| !n.is_empty() && j.command.contains(n.as_str()))
        })
        .count();
    let enabled = jobs.iter().filter(|j| j.enabled).count();

    CronStatus {
        total,
        managed,
        custom: total - managed,
        enabled,
        disabled: total - enabled,
        daemon_active,
        last_run: jobs.iter().find_map(|j| j.last_run),
    }
}

/// True when any of `units` (e.g. `cron`, `crond`) is active.
pub fn daemon_active(services: &dyn ServiceManager, units: &[String]) -> bool {
    units.iter().any(|unit| services.is_active(unit))
}

/// The dedicated cron log when present, otherwise the system log.
pub fn select_log(config: &LogsConfig) -> Option<PathBuf> {
    [&config.cron_log, &config.system_log]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

/// Last `count` cron lines from the tail window of the selected log.
///
/// Only the final `window_lines` lines of the file are examined. Lines must
/// contain the configured marker token and, when given, `pattern`.
pub fn recent_log_lines(config: &LogsConfig, count: usize, pattern: Option<&str>) -> Result<Vec<String>> {
    let Some(path) = select_log(config) else {
        return Err(CronError::io(
            format!("no log found at {} or {}", config.cron_log, config.system_log),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ));
    };
    debug!(path = %path.display(), "reading cron log");

    let window = tail_lines(&path, config.window_lines)?;
    let matching: Vec<String> = window
        .into_iter()
        .filter(|line| line.contains(config.marker.as_str()))
        .filter(|line| pattern.is_none_or(|p| line.contains(p)))
        .collect();

    let skip = matching.len().saturating_sub(count);
    Ok(matching.into_iter().skip(skip).collect())
}

/// The last `window` lines of `path`; invalid UTF-8 is replaced, not fatal.
fn tail_lines(path: &Path, window: usize) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| CronError::io(format!("opening {}", path.display()), e))?;
    let mut reader = BufReader::new(file);
    let mut tail: VecDeque<String> = VecDeque::with_capacity(window.min(4096));
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| CronError::io(format!("reading {}", path.display()), e))?;
        if n == 0 {
            break;
        }
        if window == 0 {
            continue;
        }
        if tail.len() == window {
            tail.pop_front();
        }
        let line = String::from_utf8_lossy(&buf);
        tail.push_back(line.trim_end_matches(['\n', '\r']).to_string());
    }
    Ok(tail.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeServices;
    use crate::types::JobSource;
    use chrono::{TimeZone, Utc};

    fn job(id: u64, command: &str, enabled: bool) -> Job {
        let mut job = Job::new(id, "0 0 * * *", command, "", JobSource::Manual);
        job.enabled = enabled;
        job
    }

    #[test]
    fn counts_add_up() {
        let jobs = vec![
            job(1, "stackpilot backup", true),
            job(2, "/opt/custom.sh", false),
            job(3, "/usr/local/bin/stackpilot ssl renew", true),
            job(4, "find /tmp -delete", true),
        ];
        let status = summarize(&jobs, &["stackpilot".to_string()], true);
        assert_eq!(status.total, 4);
        assert_eq!(status.managed, 2);
        assert_eq!(status.custom, 2);
        assert_eq!(status.enabled, 3);
        assert_eq!(status.disabled, 1);
        assert!(status.daemon_active);
        assert!(status.last_run.is_none());
    }

    #[test]
    fn last_run_is_first_found_in_order() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut a = job(1, "a", true);
        let mut b = job(2, "b", true);
        let c = job(3, "c", true);
        a.last_run = Some(early);
        b.last_run = Some(late);

        let status = summarize(&[c, a, b], &[], false);
        assert_eq!(status.last_run, Some(early));
    }

    #[test]
    fn daemon_health_tries_each_unit() {
        let services = FakeServices::default();
        let units = vec!["cron".to_string(), "crond".to_string()];
        assert!(!daemon_active(&services, &units));
        services.set_active("crond");
        assert!(daemon_active(&services, &units));
    }

    fn logs_config(dir: &Path) -> LogsConfig {
        LogsConfig {
            cron_log: dir.join("cron.log").display().to_string(),
            system_log: dir.join("syslog").display().to_string(),
            window_lines: 500,
            ..LogsConfig::default()
        }
    }

    #[test]
    fn prefers_cron_log_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let config = logs_config(dir.path());
        assert_eq!(select_log(&config), None);

        std::fs::write(dir.path().join("syslog"), "").unwrap();
        assert_eq!(select_log(&config), Some(dir.path().join("syslog")));

        std::fs::write(dir.path().join("cron.log"), "").unwrap();
        assert_eq!(select_log(&config), Some(dir.path().join("cron.log")));
    }

    #[test]
    fn filters_marker_then_pattern_and_keeps_last_n() {
        let dir = tempfile::tempdir().unwrap();
        let config = logs_config(dir.path());
        std::fs::write(
            dir.path().join("syslog"),
            "\
May 5 01:00:01 host CRON[101]: (root) CMD (stackpilot backup)
May 5 01:00:02 host sshd[7]: Accepted publickey
May 5 02:00:01 host CRON[102]: (root) CMD (certbot renew)
May 5 03:00:01 host CRON[103]: (root) CMD (stackpilot backup)
May 5 04:00:01 host CRON[104]: (root) CMD (stackpilot backup)
",
        )
        .unwrap();

        let all = recent_log_lines(&config, 10, None).unwrap();
        assert_eq!(all.len(), 4);

        let last_two = recent_log_lines(&config, 2, None).unwrap();
        assert!(last_two[0].contains("CRON[103]"));
        assert!(last_two[1].contains("CRON[104]"));

        let renewals = recent_log_lines(&config, 10, Some("certbot")).unwrap();
        assert_eq!(renewals.len(), 1);
        assert!(renewals[0].contains("CRON[102]"));
    }

    #[test]
    fn only_the_tail_window_is_scanned() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = logs_config(dir.path());
        config.window_lines = 2;
        std::fs::write(
            dir.path().join("cron.log"),
            "CRON old\nCRON middle\nCRON newest\n",
        )
        .unwrap();

        let lines = recent_log_lines(&config, 10, None).unwrap();
        assert_eq!(lines, vec!["CRON middle", "CRON newest"]);
    }

    #[test]
    fn missing_logs_are_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = logs_config(dir.path());
        assert!(matches!(
            recent_log_lines(&config, 5, None),
            Err(CronError::Io { .. })
        ));
    }
}
