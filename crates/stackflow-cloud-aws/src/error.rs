//! CloudFormation error classification

use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use stackflow_core::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudFormationError {
    #[error("Stack does not exist: {0}")]
    StackNotFound(String),

    #[error("No updates are to be performed")]
    NoUpdates,

    #[error("Stack already exists: {0}")]
    AlreadyExists(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Throttled: {0}")]
    Throttled(String),

    #[error("{code}: {message}")]
    Service { code: String, message: String },

    #[error("Request failed: {0}")]
    Transport(String),
}

impl CloudFormationError {
    /// Classifies a service error from its code and message
    ///
    /// CloudFormation reports both a missing stack and an empty update as a
    /// `ValidationError`, so the message decides.
    pub fn classify(code: Option<&str>, message: &str) -> Self {
        if message.contains("does not exist") {
            return Self::StackNotFound(message.to_string());
        }
        if message.contains("No updates are to be performed") {
            return Self::NoUpdates;
        }
        match code {
            Some("AlreadyExistsException") => Self::AlreadyExists(message.to_string()),
            Some("ValidationError") | Some("InsufficientCapabilitiesException") => {
                Self::Validation(message.to_string())
            }
            Some("Throttling") | Some("ThrottlingException") | Some("RequestLimitExceeded") => {
                Self::Throttled(message.to_string())
            }
            code => Self::Service {
                code: code.unwrap_or("Unknown").to_string(),
                message: message.to_string(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::StackNotFound(_))
    }
}

impl<E> From<SdkError<E>> for CloudFormationError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    fn from(err: SdkError<E>) -> Self {
        match &err {
            SdkError::ServiceError(_) => Self::classify(err.code(), err.message().unwrap_or_default()),
            _ => Self::Transport(DisplayErrorContext(&err).to_string()),
        }
    }
}

impl From<CloudFormationError> for GatewayError {
    fn from(err: CloudFormationError) -> Self {
        match err {
            CloudFormationError::StackNotFound(message) => GatewayError::NotFound(message),
            CloudFormationError::NoUpdates => GatewayError::NoUpdateNeeded,
            CloudFormationError::AlreadyExists(message) => GatewayError::Conflict(message),
            CloudFormationError::Validation(message) => GatewayError::Validation(message),
            CloudFormationError::Throttled(message) | CloudFormationError::Transport(message) => {
                GatewayError::Transient(message)
            }
            err @ CloudFormationError::Service { .. } => GatewayError::Transient(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudFormationError>;
