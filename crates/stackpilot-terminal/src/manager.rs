//! `TerminalManager` — spawns job commands and enforces their time budget.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command as AsyncCommand;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    error::{Result, TerminalError},
    truncate,
    types::{ExecOptions, ExecResult},
};

/// Runs one-shot shell commands.
pub struct TerminalManager {
    shell: String,
}

impl TerminalManager {
    /// Manager that runs commands through `sh -c`.
    pub fn new() -> Self {
        Self::with_shell("sh")
    }

    pub fn with_shell(shell: &str) -> Self {
        Self {
            shell: shell.to_string(),
        }
    }

    /// Execute `command` via `<shell> -c`, wait for it within
    /// `options.timeout_secs` and return its captured output.
    ///
    /// The shell leads its own process group so a timeout kills everything
    /// the command started, not just the shell.
    ///
    /// # Errors
    ///
    /// - `Timeout`  — budget exceeded; the group was sent SIGKILL.
    /// - `Spawn`    — child could not be spawned.
    /// - `IoError`  — waiting for the child failed.
    pub async fn exec(&self, command: &str, options: ExecOptions) -> Result<ExecResult> {
        debug!(shell = %self.shell, "exec: {command}");

        let timeout_secs = options.effective_timeout_secs();

        let mut cmd = AsyncCommand::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);
        let mut child = cmd
            .spawn()
            .map_err(|e| TerminalError::Spawn(format!("{}: {e}", self.shell)))?;

        let pid = child.id();
        let (stdout_buf, stdout_task) = capture(child.stdout.take());
        let (stderr_buf, stderr_task) = capture(child.stderr.take());
        let render = |buf: &Captured| {
            truncate::truncate_output(&strip_text(&snapshot(buf)), options.max_output_chars)
        };

        let finished = async {
            let status = child.wait().await?;
            // Readers end at EOF, once every process holding the pipes exits.
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            Ok::<_, std::io::Error>(status)
        };

        let waited = tokio::time::timeout(Duration::from_secs(timeout_secs), finished).await;
        match waited {
            Ok(Ok(status)) => Ok(ExecResult {
                exit_code: status.code().unwrap_or(-1),
                stdout: render(&stdout_buf),
                stderr: render(&stderr_buf),
            }),

            Ok(Err(e)) => Err(TerminalError::IoError(e)),

            Err(_elapsed) => {
                if let Some(raw_pid) = pid {
                    warn!(pid = raw_pid, timeout_secs, "command timed out, killing its process group");
                    kill_group(raw_pid);
                }
                let _ = child.start_kill();
                let _ = child.wait().await;
                Err(TerminalError::Timeout {
                    ms: timeout_secs * 1_000,
                    partial: ExecResult {
                        exit_code: -1,
                        stdout: render(&stdout_buf),
                        stderr: render(&stderr_buf),
                    },
                })
            }
        }
    }
}

impl Default for TerminalManager {
    fn default() -> Self {
        Self::new()
    }
}

type Captured = Arc<Mutex<Vec<u8>>>;

/// Copy a child pipe into a shared buffer until EOF. The buffer stays
/// readable if the child is killed before the pipe closes.
fn capture<R>(pipe: Option<R>) -> (Captured, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = Captured::default();
    let sink = Arc::clone(&buf);
    let task = tokio::spawn(async move {
        let Some(mut pipe) = pipe else { return };
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]),
            }
        }
    });
    (buf, task)
}

fn snapshot(buf: &Captured) -> Vec<u8> {
    buf.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// SIGKILL the process group led by `pid`.
#[cfg(unix)]
fn kill_group(pid: u32) {
    // Safety: `pid` leads a group created at spawn and has not been reaped.
    unsafe {
        libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

/// Strip ANSI escape codes and convert bytes to a UTF-8 string.
fn strip_text(raw: &[u8]) -> String {
    let clean = strip_ansi_escapes::strip(raw);
    String::from_utf8_lossy(&clean).into_owned()
}
