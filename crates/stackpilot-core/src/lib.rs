//! `stackpilot-core` — configuration and shared error types used by every
//! stackpilot crate.

pub mod config;
pub mod error;

pub use config::StackpilotConfig;
pub use error::{Result, StackpilotError};
