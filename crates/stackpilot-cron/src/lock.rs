//! Single-writer critical section around the metadata store and crontab.
//!
//! An exclusive `flock(2)` on `<metadata_dir>/.lock`, held until the guard is
//! dropped. Covers ID allocation + create and the crontab read-modify-install
//! sequence for concurrent invocations on the same host.

use std::fs::{File, OpenOptions};
use std::path::Path;

use tracing::debug;

use crate::error::{CronError, Result};

const LOCK_FILE: &str = ".lock";

/// Guard holding the advisory lock; released on drop (the fd is closed).
pub struct StoreLock {
    _file: File,
}

impl StoreLock {
    /// Block until the exclusive lock on `dir` is held.
    pub fn acquire(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| CronError::io(format!("creating {}", dir.display()), e))?;
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| CronError::io(format!("opening {}", path.display()), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;

            // Safety: the fd is valid for the lifetime of `file`.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc != 0 {
                return Err(CronError::Lock(format!(
                    "flock on {}: {}",
                    path.display(),
                    std::io::Error::last_os_error()
                )));
            }
        }

        debug!(path = %path.display(), "store lock acquired");
        Ok(Self { _file: file })
    }
}
