use crate::config_manager::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CountError {
    /// The computation was abandoned: the token was cancelled or the program
    /// snapshot was disposed while the query was running.
    #[error("Computation cancelled")]
    Cancelled,

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Invalid program: {0}")]
    InvalidProgram(String),

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CountError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, CountError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, CountError>;
