//! Error types for the stackpilot-terminal crate.

use thiserror::Error;

use crate::types::ExecResult;

/// All errors that can originate from command execution.
#[derive(Debug, Error)]
pub enum TerminalError {
    /// The child process could not be spawned.
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// Underlying I/O failure while collecting output.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The child exceeded its time budget and its process group was killed.
    /// `partial` holds whatever output arrived before the kill.
    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64, partial: ExecResult },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, TerminalError>;
