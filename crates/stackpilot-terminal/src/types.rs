use serde::{Deserialize, Serialize};

use crate::truncate::DEFAULT_MAX_CHARS;

/// Configuration knobs for one-shot command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOptions {
    /// Timeout in seconds. The child is killed if it runs longer.
    ///
    /// Zero is treated as one second; a job always gets some budget.
    pub timeout_secs: u64,

    /// Maximum characters per stream before middle-omission truncation.
    pub max_output_chars: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 3600,
            max_output_chars: DEFAULT_MAX_CHARS,
        }
    }
}

impl ExecOptions {
    pub(crate) fn effective_timeout_secs(&self) -> u64 {
        self.timeout_secs.max(1)
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    /// Exit code, or -1 when the child was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    /// Stdout followed by stderr, separated by a newline when both are present.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => {
                let mut out = self.stdout.clone();
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&self.stderr);
                out
            }
        }
    }
}
