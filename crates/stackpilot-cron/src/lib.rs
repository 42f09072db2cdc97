//! `stackpilot-cron` — keeps job metadata and the live crontab in step.
//!
//! # Overview
//!
//! Each job is a `job-<id>.json` record in the metadata directory plus, while
//! enabled, a two-line entry in the user's crontab:
//!
//! ```text
//! # stackpilot-job-7
//! 0 2 * * * /usr/bin/true
//! ```
//!
//! Before serving any operation the [`reconcile::Reconciler`] pulls in
//! entries created outside the tool: marker-tagged lines, unmarked lines that
//! reference the application, and prefixed service-manager timers.
//!
//! # Marker tags
//!
//! | Source     | Marker                    |
//! |------------|---------------------------|
//! | `manual`   | `# <prefix>-job-<id>`     |
//! | `backup`   | `# <prefix>-backup-<id>`  |
//! | `ssl`      | `# <prefix>-ssl-<id>`     |
//! | `dns`      | `# <prefix>-dns-<id>`     |
//! | `systemd`  | `# <prefix>-systemd-<id>` |
//! | `webstack` | `# <prefix>-webstack-<id>`|

pub mod crontab;
pub mod engine;
pub mod error;
pub mod executor;
pub mod lock;
pub mod marker;
pub mod reconcile;
pub mod schedule;
pub mod status;
pub mod store;
pub mod timers;
pub mod types;

#[cfg(test)]
mod testing;

pub use engine::CronEngine;
pub use error::{CronError, Result};
pub use types::{CronStatus, Job, JobSource, JobUpdate, RunOutcome, RunReport, SyncReport};
