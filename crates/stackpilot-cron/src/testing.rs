//! In-memory stand-ins for `crontab` and `systemctl` used by unit tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::crontab::CrontabBackend;
use crate::error::{CronError, Result};
use crate::timers::ServiceManager;

#[derive(Default)]
struct CrontabState {
    text: Option<String>,
    installs: usize,
    fail_installs: bool,
}

/// Crontab held in memory; clones share state.
#[derive(Clone, Default)]
pub struct MemoryCrontab {
    state: Arc<Mutex<CrontabState>>,
}

impl MemoryCrontab {
    pub fn new(initial: Option<&str>) -> Self {
        let backend = Self::default();
        backend.state.lock().unwrap().text = initial.map(str::to_string);
        backend
    }

    pub fn text(&self) -> String {
        self.state.lock().unwrap().text.clone().unwrap_or_default()
    }

    pub fn set_text(&self, text: &str) {
        self.state.lock().unwrap().text = Some(text.to_string());
    }

    pub fn installs(&self) -> usize {
        self.state.lock().unwrap().installs
    }

    pub fn fail_installs(&self, fail: bool) {
        self.state.lock().unwrap().fail_installs = fail;
    }
}

impl CrontabBackend for MemoryCrontab {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().text.clone())
    }

    fn install(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_installs {
            return Err(CronError::InstallFailed("errors in crontab file".to_string()));
        }
        let text = std::fs::read_to_string(path).map_err(|e| CronError::io("reading install file", e))?;
        state.text = Some(text);
        state.installs += 1;
        Ok(())
    }
}

#[derive(Clone)]
pub struct FakeTimer {
    pub calendar: String,
    pub target: String,
    pub enabled: bool,
}

#[derive(Default)]
struct ServiceState {
    timers: HashMap<String, FakeTimer>,
    active_units: Vec<String>,
    broken_listing: bool,
}

/// Service manager with scripted timers; clones share state.
#[derive(Clone, Default)]
pub struct FakeServices {
    state: Arc<Mutex<ServiceState>>,
}

impl FakeServices {
    pub fn add_timer(&self, unit: &str, calendar: &str, target: &str) {
        self.state.lock().unwrap().timers.insert(
            unit.to_string(),
            FakeTimer {
                calendar: calendar.to_string(),
                target: target.to_string(),
                enabled: true,
            },
        );
    }

    pub fn set_calendar(&self, unit: &str, calendar: &str) {
        if let Some(timer) = self.state.lock().unwrap().timers.get_mut(unit) {
            timer.calendar = calendar.to_string();
        }
    }

    pub fn timer(&self, unit: &str) -> Option<FakeTimer> {
        self.state.lock().unwrap().timers.get(unit).cloned()
    }

    pub fn set_active(&self, unit: &str) {
        self.state.lock().unwrap().active_units.push(unit.to_string());
    }

    pub fn break_listing(&self) {
        self.state.lock().unwrap().broken_listing = true;
    }
}

impl ServiceManager for FakeServices {
    fn list_timer_units(&self, prefix: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if state.broken_listing {
            return Err(CronError::Command {
                command: "systemctl list-timers".to_string(),
                reason: "Failed to connect to bus".to_string(),
            });
        }
        let mut units: Vec<String> = state
            .timers
            .keys()
            .filter(|u| u.starts_with(prefix))
            .cloned()
            .collect();
        units.sort();
        Ok(units)
    }

    fn timer_calendar(&self, unit: &str) -> Result<String> {
        self.timer(unit).map(|t| t.calendar).ok_or_else(|| CronError::Command {
            command: format!("systemctl show {unit}"),
            reason: "unit not found".to_string(),
        })
    }

    fn timer_target(&self, unit: &str) -> Result<String> {
        self.timer(unit).map(|t| t.target).ok_or_else(|| CronError::Command {
            command: format!("systemctl show {unit}"),
            reason: "unit not found".to_string(),
        })
    }

    fn is_active(&self, unit: &str) -> bool {
        self.state.lock().unwrap().active_units.iter().any(|u| u == unit)
    }

    fn is_enabled(&self, unit: &str) -> bool {
        self.timer(unit).is_some_and(|t| t.enabled)
    }

    fn set_timer_enabled(&self, unit: &str, enabled: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.timers.get_mut(unit) {
            Some(timer) => {
                timer.enabled = enabled;
                Ok(())
            }
            None => Err(CronError::Command {
                command: format!("systemctl enable {unit}"),
                reason: "unit not found".to_string(),
            }),
        }
    }
}
