//! Run-level error taxonomy and its mapping onto process exit codes.
use crate::browser::BrowserError;
use crate::config::ConfigError;
use crate::pacing::Interrupted;
use crate::records::RecordError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("no pins could be collected from {0}")]
    Collection(String),
    #[error("inventory not found at {0}; run `copy` to create it")]
    MissingInventory(PathBuf),
    #[error("{0} duplicate pins need manual cleanup before resuming")]
    DuplicateState(usize),
    #[error("login failed: {0}")]
    Login(String),
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("record error: {0}")]
    Records(#[from] RecordError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl RunError {
    /// 0 is reserved for success and "nothing to do".
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Config(_) => 1,
            RunError::Interrupted(_) => 130,
            _ => 2,
        }
    }
}
