use crate::error::{CronError, Result};

/// Schedule used when a timer calendar cannot be translated.
pub const MIDNIGHT_DAILY: &str = "0 0 * * *";

/// Check that `schedule` has exactly five whitespace-separated fields.
///
/// Returns the schedule with runs of whitespace collapsed to single spaces;
/// field contents are not interpreted.
pub fn validate_schedule(schedule: &str) -> Result<String> {
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(CronError::InvalidSchedule(format!(
            "expected 5 fields (minute hour day-of-month month day-of-week), got {}: {schedule:?}",
            fields.len()
        )));
    }
    Ok(fields.join(" "))
}

/// A command must fit on the single body line of its entry.
pub fn validate_command(command: &str) -> Result<String> {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return Err(CronError::InvalidCommand("command is empty".to_string()));
    }
    if trimmed.contains(['\n', '\r']) {
        return Err(CronError::InvalidCommand(format!(
            "command must be a single line: {trimmed:?}"
        )));
    }
    Ok(trimmed.to_string())
}

/// Split a crontab line into `(schedule, command)`.
///
/// Returns `None` for comments, blank lines, environment assignments,
/// `@reboot`-style specials and anything without a command after five fields.
pub fn split_cron_line(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('@') {
        return None;
    }

    let mut fields = Vec::with_capacity(5);
    let mut rest = trimmed;
    for _ in 0..5 {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace)?;
        let field = &rest[..end];
        if !is_cron_field(field) {
            return None;
        }
        fields.push(field);
        rest = &rest[end..];
    }

    let command = rest.trim();
    if command.is_empty() {
        return None;
    }
    Some((fields.join(" "), command.to_string()))
}

fn is_cron_field(field: &str) -> bool {
    field
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '/' | ',' | '-' | '?'))
}

/// Approximate a timer `OnCalendar=` expression as a five-field cron schedule.
///
/// This is a lossy, best-effort table rather than a calendar parser:
///
/// | Calendar                      | Cron          |
/// |-------------------------------|---------------|
/// | `daily`                       | `0 0 * * *`   |
/// | `weekly`                      | `0 0 * * 0`   |
/// | `monthly`                     | `0 0 1 * *`   |
/// | anything with `HH:MM[:SS]`    | `MM HH * * *` |
/// | anything else                 | `0 0 * * *`   |
///
/// Weekday and date components next to a time are dropped.
pub fn calendar_to_cron(calendar: &str) -> String {
    let spec = calendar.trim().to_lowercase();
    match spec.as_str() {
        "daily" => return MIDNIGHT_DAILY.to_string(),
        "weekly" => return "0 0 * * 0".to_string(),
        "monthly" => return "0 0 1 * *".to_string(),
        _ => {}
    }

    spec.split_whitespace()
        .find_map(parse_time_of_day)
        .map(|(hour, minute)| format!("{minute} {hour} * * *"))
        .unwrap_or_else(|| MIDNIGHT_DAILY.to_string())
}

/// Parse `HH:MM` or `HH:MM:SS` into `(hour, minute)`.
fn parse_time_of_day(token: &str) -> Option<(u32, u32)> {
    let parts: Vec<&str> = token.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return None;
    }
    if parts
        .iter()
        .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }
    let hour: u32 = parts[0].parse().ok()?;
    let minute: u32 = parts[1].parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}
