use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackpilotError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StackpilotError {
    /// Short error code string used in machine-readable CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            StackpilotError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, StackpilotError>;
