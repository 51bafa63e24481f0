//! Error Types for ICD Coder

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoderError>;

#[derive(Error, Debug)]
pub enum CoderError {
    #[error("'{0}' is not a valid ICD-10-CM code format")]
    InvalidCode(String),

    #[error("Search term must not be empty")]
    EmptyTerm,

    #[error("Catalog error: {0}")]
    Catalog(String),
}

impl From<CoderError> for AgentError {
    fn from(err: CoderError) -> Self {
        match err {
            CoderError::InvalidCode(_) | CoderError::EmptyTerm => {
                AgentError::ToolValidation(err.to_string())
            }
            CoderError::Catalog(_) => AgentError::ToolExecution(err.to_string()),
        }
    }
}
