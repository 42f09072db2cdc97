//! Timer scanner: discovers service-manager timer units that carry the
//! configured name prefix and turns each into a job-shaped tuple.
//!
//! Discovery is best-effort. Any unit whose listing or properties cannot be
//! read is skipped with a warning; it never fails reconciliation.

use std::process::Command;

use tracing::{debug, warn};

use crate::error::{CronError, Result};
use crate::schedule::calendar_to_cron;
use crate::types::JobSource;

/// Service-manager queries used by timer sync, daemon health and
/// enable/disable of timer-backed jobs.
pub trait ServiceManager: Send + Sync {
    /// Timer unit names (`<name>.timer`) starting with `prefix`.
    fn list_timer_units(&self, prefix: &str) -> Result<Vec<String>>;

    /// The unit's `OnCalendar=` expression.
    fn timer_calendar(&self, unit: &str) -> Result<String>;

    /// The unit the timer activates, e.g. `stackpilot-backup.service`.
    fn timer_target(&self, unit: &str) -> Result<String>;

    fn is_active(&self, unit: &str) -> bool;

    fn is_enabled(&self, unit: &str) -> bool;

    /// Enable (and start) or disable (and stop) a timer unit.
    fn set_timer_enabled(&self, unit: &str, enabled: bool) -> Result<()>;
}

/// `systemctl` on the local host.
pub struct Systemctl {
    bin: String,
}

impl Systemctl {
    pub fn new(bin: &str) -> Self {
        Self {
            bin: bin.to_string(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.bin)
            .args(args)
            .output()
            .map_err(|e| CronError::io(format!("running {} {}", self.bin, args.join(" ")), e))?;

        if !output.status.success() {
            return Err(CronError::Command {
                command: format!("{} {}", self.bin, args.join(" ")),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn succeeds(&self, args: &[&str]) -> bool {
        Command::new(&self.bin)
            .args(args)
            .output()
            .is_ok_and(|o| o.status.success())
    }
}

impl ServiceManager for Systemctl {
    fn list_timer_units(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{prefix}*");
        let listing = self.run(&["list-timers", "--all", "--no-legend", "--plain", &pattern])?;
        Ok(parse_timer_listing(&listing, prefix))
    }

    fn timer_calendar(&self, unit: &str) -> Result<String> {
        let value = self.run(&["show", unit, "--property=TimersCalendar", "--value"])?;
        parse_timers_calendar(&value).ok_or_else(|| CronError::Command {
            command: format!("{} show {unit}", self.bin),
            reason: format!("no OnCalendar in {:?}", value.trim()),
        })
    }

    fn timer_target(&self, unit: &str) -> Result<String> {
        let value = self.run(&["show", unit, "--property=Unit", "--value"])?;
        let target = value.trim();
        if target.is_empty() {
            return Err(CronError::Command {
                command: format!("{} show {unit}", self.bin),
                reason: "timer has no target unit".to_string(),
            });
        }
        Ok(target.to_string())
    }

    fn is_active(&self, unit: &str) -> bool {
        self.succeeds(&["is-active", "--quiet", unit])
    }

    fn is_enabled(&self, unit: &str) -> bool {
        self.succeeds(&["is-enabled", "--quiet", unit])
    }

    fn set_timer_enabled(&self, unit: &str, enabled: bool) -> Result<()> {
        let verb = if enabled { "enable" } else { "disable" };
        self.run(&[verb, "--now", unit]).map(|_| ())
    }
}

/// Stand-in for hosts without a service manager: no timers, nothing active.
pub struct NoServiceManager;

impl ServiceManager for NoServiceManager {
    fn list_timer_units(&self, _prefix: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn timer_calendar(&self, unit: &str) -> Result<String> {
        Err(unavailable(unit))
    }

    fn timer_target(&self, unit: &str) -> Result<String> {
        Err(unavailable(unit))
    }

    fn is_active(&self, _unit: &str) -> bool {
        false
    }

    fn is_enabled(&self, _unit: &str) -> bool {
        false
    }

    fn set_timer_enabled(&self, unit: &str, _enabled: bool) -> Result<()> {
        Err(unavailable(unit))
    }
}

fn unavailable(unit: &str) -> CronError {
    CronError::Command {
        command: format!("systemctl ... {unit}"),
        reason: "no service manager available on this host".to_string(),
    }
}

/// Pick prefixed `.timer` names out of `list-timers --plain` output.
///
/// Columns are NEXT LEFT LAST PASSED UNIT ACTIVATES, where the time columns
/// contain spaces or `n/a`, so the unit is located by suffix rather than
/// position. Lines without such a token are ignored.
pub fn parse_timer_listing(listing: &str, prefix: &str) -> Vec<String> {
    let mut units: Vec<String> = listing
        .lines()
        .filter_map(|line| {
            line.split_whitespace()
                .find(|token| token.starts_with(prefix) && token.ends_with(".timer"))
                .map(str::to_string)
        })
        .collect();
    units.sort();
    units.dedup();
    units
}

/// Extract the first `OnCalendar=` value from a `TimersCalendar` property,
/// e.g. `{ OnCalendar=*-*-* 03:15:00 ; next_elapse=... }`.
pub fn parse_timers_calendar(value: &str) -> Option<String> {
    let start = value.find("OnCalendar=")? + "OnCalendar=".len();
    let rest = &value[start..];
    let end = rest.find([';', '}']).unwrap_or(rest.len());
    let calendar = rest[..end].trim();
    (!calendar.is_empty()).then(|| calendar.to_string())
}

/// Commands stored by an older encoding that copied the raw `ExecStart`
/// property (`{ path=... ; argv[]=... }`) instead of a start command.
pub fn is_legacy_command(command: &str) -> bool {
    command.contains("argv[]") || command.contains('{') || command.contains('}')
}

/// Job-shaped view of one timer unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredTimer {
    pub unit: String,
    pub service: String,
    pub calendar: String,
    pub schedule: String,
    pub command: String,
    pub description: String,
    pub source: JobSource,
    pub enabled: bool,
}

impl DiscoveredTimer {
    pub fn new(unit: &str, service: &str, calendar: &str, enabled: bool) -> Self {
        Self {
            unit: unit.to_string(),
            service: service.to_string(),
            calendar: calendar.to_string(),
            schedule: calendar_to_cron(calendar),
            command: format!("systemctl start {service}"),
            description: format!("Timer unit {unit}"),
            source: JobSource::classify(unit, JobSource::Systemd),
            enabled,
        }
    }
}

pub struct TimerScanner {
    unit_prefix: String,
}

impl TimerScanner {
    pub fn new(unit_prefix: &str) -> Self {
        Self {
            unit_prefix: unit_prefix.to_string(),
        }
    }

    /// Every readable prefixed timer. Errors are logged and skipped.
    pub fn scan(&self, services: &dyn ServiceManager) -> Vec<DiscoveredTimer> {
        let units = match services.list_timer_units(&self.unit_prefix) {
            Ok(units) => units,
            Err(e) => {
                warn!("timer listing unavailable, skipping timer sync: {e}");
                return Vec::new();
            }
        };

        let mut found = Vec::with_capacity(units.len());
        for unit in units {
            let calendar = match services.timer_calendar(&unit) {
                Ok(c) => c,
                Err(e) => {
                    warn!(unit = %unit, "skipping timer: {e}");
                    continue;
                }
            };
            let service = match services.timer_target(&unit) {
                Ok(s) => s,
                Err(e) => {
                    warn!(unit = %unit, "skipping timer: {e}");
                    continue;
                }
            };
            let timer = DiscoveredTimer::new(&unit, &service, &calendar, services.is_enabled(&unit));
            debug!(unit = %unit, schedule = %timer.schedule, "timer discovered");
            found.push(timer);
        }
        found
    }
}
