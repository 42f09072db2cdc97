//! stackpilot-terminal — one-shot shell execution for scheduled jobs.
//!
//! Commands run through `<shell> -c` with a hard timeout. Output is captured,
//! stripped of ANSI escapes and truncated with middle-omission so a chatty job
//! cannot flood the caller.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use stackpilot_terminal::{ExecOptions, TerminalManager};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mgr = TerminalManager::new();
//!     let result = mgr.exec("echo hello", ExecOptions::default()).await.unwrap();
//!     println!("{}", result.stdout);
//! }
//! ```

pub mod error;
pub mod manager;
pub mod truncate;
pub mod types;

pub use error::{Result, TerminalError};
pub use manager::TerminalManager;
pub use types::{ExecOptions, ExecResult};
