//! Human and JSON rendering for cron command results.

use chrono::{DateTime, Utc};
use serde::Serialize;
use stackpilot_cron::{CronStatus, Job, SyncReport};

const COMMAND_WIDTH: usize = 48;

pub fn json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// `{"error": {"code": ..., "message": ...}}` for `--json` callers.
pub fn json_error(code: &str, message: &str) -> String {
    serde_json::json!({
        "error": {
            "code": code,
            "message": message,
        }
    })
    .to_string()
}

pub fn job_table(jobs: &[Job]) -> String {
    if jobs.is_empty() {
        return "No jobs found\n".to_string();
    }

    let rows: Vec<[String; 6]> = jobs
        .iter()
        .map(|j| {
            [
                j.id.to_string(),
                if j.enabled { "yes" } else { "no" }.to_string(),
                j.source.to_string(),
                j.schedule.clone(),
                ellipsize(&j.command, COMMAND_WIDTH),
                last_run(j),
            ]
        })
        .collect();
    let header = ["ID", "ENABLED", "SOURCE", "SCHEDULE", "COMMAND", "LAST RUN"];

    let mut widths = header.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &header.map(String::from), &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String; 6], widths: &[usize; 6]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, &w)| format!("{cell:<w$}"))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

pub fn job_detail(job: &Job) -> String {
    let mut out = String::new();
    let mut field = |name: &str, value: &str| {
        out.push_str(&format!("{name:<12} {value}\n"));
    };
    field("ID", &job.id.to_string());
    field("Schedule", &job.schedule);
    field("Command", &job.command);
    if !job.description.is_empty() {
        field("Description", &job.description);
    }
    field("Enabled", if job.enabled { "yes" } else { "no" });
    field("Source", &job.source.to_string());
    if let Some(unit) = &job.timer_unit {
        field("Timer", unit);
    }
    field("Created", &timestamp(job.created));
    field("Last run", &last_run(job));
    if job.last_run.is_some() {
        let status = match &job.last_outcome {
            Some(outcome) => outcome.to_string(),
            None => format!("exited with {}", job.last_status),
        };
        field("Last status", &status);
    }
    out
}

pub fn status_summary(status: &CronStatus) -> String {
    format!(
        "Cron daemon   {}\n\
         Jobs          {} total, {} enabled, {} disabled\n\
         Managed       {}\n\
         Custom        {}\n\
         Last run      {}\n",
        if status.daemon_active { "active" } else { "inactive" },
        status.total,
        status.enabled,
        status.disabled,
        status.managed,
        status.custom,
        status.last_run.map(timestamp).unwrap_or_else(|| "never".to_string()),
    )
}

pub fn sync_summary(report: &SyncReport) -> String {
    if report.changes() == 0 {
        return "Already in sync\n".to_string();
    }
    format!(
        "Tagged {}, adopted {}, timers {}, refreshed {}, healed {}\n",
        report.tagged, report.adopted, report.timers, report.refreshed, report.healed
    )
}

fn last_run(job: &Job) -> String {
    job.last_run.map(timestamp).unwrap_or_else(|| "-".to_string())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn ellipsize(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{kept}…")
}
