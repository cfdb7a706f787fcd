use thiserror::Error;

pub type StepResult<T> = Result<T, StepError>;

#[derive(Error, Debug)]
pub enum StepError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid reporting offset: {0}")]
    InvalidOffset(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Event store error: {0}")]
    Storage(String),

    #[error("Journal error: {0}")]
    Journal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl StepError {
    /// True for errors caused by caller input rather than by the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StepError::Validation(_) | StepError::InvalidOffset(_) | StepError::InvalidDate(_)
        )
    }
}
