use stackflow_core::ReconcileError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error(
        "Blueprint not found. Looked in:\n\
        - the current directory: stackflow.yaml, .stackflow.yaml\n\
        - ./.stackflow/stackflow.yaml\n\
        - ~/.config/stackflow/stackflow.yaml\n\
        Set STACKFLOW_BLUEPRINT to point at one directly"
    )]
    BlueprintNotFound,

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid blueprint: {0}")]
    InvalidBlueprint(String),

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
