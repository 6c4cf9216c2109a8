//! Reconciler and gateway error types

use crate::handle::{ResourceKind, ResourceStatus};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a [`ProviderGateway`](crate::ProviderGateway)
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Transient provider failure: {0}")]
    Transient(String),

    #[error("Provider {provider} cannot manage {kind} resources")]
    NotSupported { provider: String, kind: ResourceKind },

    #[error("Resource already exists: {0}")]
    Conflict(String),

    #[error("Rejected by provider: {0}")]
    Validation(String),

    #[error("No updates are to be performed")]
    NoUpdateNeeded,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Timed out after {}s waiting for {name} to become {target}", elapsed.as_secs())]
    Timeout {
        name: String,
        target: ResourceStatus,
        elapsed: Duration,
    },

    #[error("{name} entered terminal status {status}")]
    BackendFailed { name: String, status: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    pub fn not_supported(provider: impl Into<String>, kind: ResourceKind) -> Self {
        Self::NotSupported {
            provider: provider.into(),
            kind,
        }
    }

    /// Whether re-invoking the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::Timeout { .. } | Self::BackendFailed { .. }
        )
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// The reconciliation step an error was raised from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Find,
    Create,
    Update,
    Delete,
    Wait,
    ReadTemplate,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Find => write!(f, "find"),
            Step::Create => write!(f, "create"),
            Step::Update => write!(f, "update"),
            Step::Delete => write!(f, "delete"),
            Step::Wait => write!(f, "wait"),
            Step::ReadTemplate => write!(f, "read template"),
        }
    }
}

/// Errors produced while planning or running a reconciliation
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Duplicate resource name: {0}")]
    DuplicateSpec(String),

    #[error("{spec} depends on unknown resource {dependency}")]
    UnknownDependency { spec: String, dependency: String },

    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Failed to read template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{spec} needs {what} of {dependency}, which is not available")]
    MissingReference {
        spec: String,
        dependency: String,
        what: String,
    },

    #[error("{0} is declared external but does not exist")]
    ExternalMissing(String),

    #[error("{spec} has drifted from its template:\n{diff}")]
    Drifted { spec: String, diff: String },

    #[error("{spec} ({kind}): {step} failed: {source}")]
    Gateway {
        spec: String,
        kind: ResourceKind,
        step: Step,
        #[source]
        source: GatewayError,
    },

    #[error("{spec} is stuck in {status} and needs manual attention")]
    Stuck { spec: String, status: String },

    #[error("Reconciliation cancelled before {0}")]
    Cancelled(String),
}

impl ReconcileError {
    pub(crate) fn gateway(
        spec: impl Into<String>,
        kind: ResourceKind,
        step: Step,
        source: GatewayError,
    ) -> Self {
        Self::Gateway {
            spec: spec.into(),
            kind,
            step,
            source,
        }
    }

    /// Errors caused by the blueprint or templates rather than the provider
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Configuration(_)
            | Self::DuplicateSpec(_)
            | Self::UnknownDependency { .. }
            | Self::Cycle(_)
            | Self::Template { .. }
            | Self::MissingReference { .. }
            | Self::ExternalMissing(_)
            | Self::Drifted { .. } => true,
            Self::Gateway { source, .. } => matches!(
                source,
                GatewayError::Validation(_) | GatewayError::NotSupported { .. }
            ),
            Self::Stuck { .. } | Self::Cancelled(_) => false,
        }
    }

    /// Errors after which re-running `apply` is expected to make progress
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Gateway { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let cycle = ReconcileError::Cycle(vec!["a".into(), "b".into(), "a".into()]);
        assert!(cycle.is_configuration());
        assert!(!cycle.is_retryable());
        assert_eq!(cycle.to_string(), "Dependency cycle detected: a -> b -> a");

        let timeout = ReconcileError::gateway(
            "network",
            ResourceKind::Stack,
            Step::Wait,
            GatewayError::Timeout {
                name: "network".into(),
                target: ResourceStatus::Ready,
                elapsed: Duration::from_secs(300),
            },
        );
        assert!(timeout.is_retryable());
        assert!(!timeout.is_configuration());

        let rejected = ReconcileError::gateway(
            "network",
            ResourceKind::Stack,
            Step::Create,
            GatewayError::Validation("Template format error".into()),
        );
        assert!(rejected.is_configuration());
        assert!(rejected.to_string().starts_with("network (stack): create failed"));

        let stuck = ReconcileError::Stuck {
            spec: "deployment".into(),
            status: "UPDATE_ROLLBACK_FAILED".into(),
        };
        assert!(!stuck.is_configuration());
        assert!(!stuck.is_retryable());
    }
}
