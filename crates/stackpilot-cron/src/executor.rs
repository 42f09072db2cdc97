//! Job executor: runs a job's command on demand under the configured
//! timeout and reports how it ended.

use std::time::Instant;

use stackpilot_core::config::ExecConfig;
use stackpilot_terminal::{ExecOptions, TerminalError, TerminalManager};
use tracing::{info, warn};

use crate::error::{CronError, Result};
use crate::types::{Job, RunOutcome, RunReport};

pub struct JobExecutor {
    terminal: TerminalManager,
    options: ExecOptions,
}

impl JobExecutor {
    pub fn new(config: &ExecConfig) -> Self {
        Self {
            terminal: TerminalManager::with_shell(&config.shell),
            options: ExecOptions {
                timeout_secs: config.timeout_secs,
                max_output_chars: config.max_output_chars,
            },
        }
    }

    /// Run `job.command` and wait for it, at most `timeout_secs`.
    ///
    /// A timeout is an outcome, not an error; its report carries the output
    /// written before the kill. Only failure to start the command is
    /// returned as `Err`.
    pub async fn run(&self, job: &Job) -> Result<RunReport> {
        let started = Instant::now();
        info!(job_id = job.id, "running job");

        let (outcome, output) = match self.terminal.exec(&job.command, self.options.clone()).await {
            Ok(result) => (
                RunOutcome::Exited {
                    code: result.exit_code,
                },
                result.combined(),
            ),
            Err(TerminalError::Timeout { ms, partial }) => {
                warn!(job_id = job.id, timeout_ms = ms, "job timed out");
                (RunOutcome::TimedOut { after_secs: ms / 1_000 }, partial.combined())
            }
            Err(e) => return Err(CronError::Exec(e.to_string())),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(job_id = job.id, outcome = %outcome, duration_ms, "job finished");
        Ok(RunReport {
            id: job.id,
            outcome,
            output,
            duration_ms,
        })
    }
}
