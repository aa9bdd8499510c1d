use thiserror::Error;

use crate::config::ConfigError;
use crate::eval::EvaluationError;
use crate::model::DescriptorError;
use crate::runner::{RunError, ScenarioError, VerificationError};
use crate::session::SessionError;
use crate::types::FieldResolutionError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Resolution error: {0}")]
    Resolution(#[from] FieldResolutionError),
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    // scenario failures
    #[error("Scenario error: {0}")]
    Scenario(#[from] ScenarioError),
    #[error("Verification error: {0}")]
    Verification(#[from] VerificationError),
    // run level
    #[error("Run error: {0}")]
    Run(#[from] RunError),
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
