//! OpenStack gateway error types

use stackflow_core::GatewayError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenStackError {
    #[error("clouds.yaml not found (looked in OS_CLIENT_CONFIG_FILE, ./, ~/.config/openstack/, /etc/openstack/)")]
    CloudsFileNotFound,

    #[error("Cloud {name} is not defined in {path}")]
    CloudNotFound { name: String, path: PathBuf },

    #[error("Invalid cloud configuration: {0}")]
    InvalidCloud(String),

    #[error("Failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("No {service_type} endpoint in the service catalog")]
    MissingEndpoint { service_type: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OpenStackError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Http { status: 404, .. })
    }
}

impl From<OpenStackError> for GatewayError {
    fn from(err: OpenStackError) -> Self {
        match err {
            OpenStackError::Http { status: 400, message } => GatewayError::Validation(message),
            OpenStackError::Http { status: 404, message } => GatewayError::NotFound(message),
            OpenStackError::Http { status: 409, message } => GatewayError::Conflict(message),
            OpenStackError::Http { status, message } if (400..500).contains(&status) && status != 401 && status != 403 && status != 429 => {
                GatewayError::Validation(format!("HTTP {}: {}", status, message))
            }
            OpenStackError::InvalidParameter(message) => GatewayError::Validation(message),
            err @ (OpenStackError::CloudsFileNotFound
            | OpenStackError::CloudNotFound { .. }
            | OpenStackError::InvalidCloud(_)
            | OpenStackError::Yaml { .. }
            | OpenStackError::MissingEndpoint { .. }) => GatewayError::Validation(err.to_string()),
            OpenStackError::Io(err) => GatewayError::Io(err),
            OpenStackError::Json(err) => GatewayError::Json(err),
            err => GatewayError::Transient(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, OpenStackError>;

/// Turns a 404 into `None`
pub(crate) fn absent<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}
