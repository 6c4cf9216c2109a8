//! Process exit codes

use stackflow_cloud_aws::CloudFormationError;
use stackflow_cloud_openstack::OpenStackError;
use stackflow_config::ConfigError;
use stackflow_core::ReconcileError;
use std::process::ExitCode;

pub const CONFIGURATION: u8 = 2;
pub const PROVIDER: u8 = 3;
pub const TEARDOWN_FAILED: u8 = 4;
pub const CANCELLED: u8 = 130;
pub const OTHER: u8 = 1;

pub fn code_for(err: &anyhow::Error) -> ExitCode {
    ExitCode::from(classify(err))
}

fn classify(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(err) = cause.downcast_ref::<ConfigError>() {
            return match err {
                ConfigError::Reconcile(err) => reconcile(err),
                _ => CONFIGURATION,
            };
        }
        if let Some(err) = cause.downcast_ref::<ReconcileError>() {
            return reconcile(err);
        }
        if let Some(err) = cause.downcast_ref::<OpenStackError>() {
            return match err {
                OpenStackError::CloudsFileNotFound
                | OpenStackError::CloudNotFound { .. }
                | OpenStackError::InvalidCloud(_)
                | OpenStackError::Yaml { .. } => CONFIGURATION,
                _ => PROVIDER,
            };
        }
        if cause.downcast_ref::<CloudFormationError>().is_some() {
            return PROVIDER;
        }
    }
    OTHER
}

fn reconcile(err: &ReconcileError) -> u8 {
    match err {
        ReconcileError::Cancelled(_) => CANCELLED,
        err if err.is_configuration() => CONFIGURATION,
        ReconcileError::Gateway { .. } | ReconcileError::Stuck { .. } => PROVIDER,
        _ => OTHER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackflow_core::{GatewayError, ResourceKind, ResourceStatus, Step};
    use std::time::Duration;

    fn gateway(source: GatewayError) -> anyhow::Error {
        ReconcileError::Gateway {
            spec: "seed-network".into(),
            kind: ResourceKind::Stack,
            step: Step::Wait,
            source,
        }
        .into()
    }

    #[test]
    fn test_configuration_errors() {
        let cycle = ReconcileError::Cycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(classify(&cycle.into()), CONFIGURATION);
        assert_eq!(classify(&ConfigError::BlueprintNotFound.into()), CONFIGURATION);

        let wrapped = ConfigError::Reconcile(ReconcileError::DuplicateSpec("a".into()));
        assert_eq!(classify(&wrapped.into()), CONFIGURATION);

        assert_eq!(classify(&gateway(GatewayError::Validation("bad".into()))), CONFIGURATION);
        assert_eq!(classify(&OpenStackError::CloudsFileNotFound.into()), CONFIGURATION);
    }

    #[test]
    fn test_provider_errors() {
        let timeout = gateway(GatewayError::Timeout {
            name: "seed-network".into(),
            target: ResourceStatus::Ready,
            elapsed: Duration::from_secs(300),
        });
        assert_eq!(classify(&timeout), PROVIDER);
        assert_eq!(classify(&gateway(GatewayError::Transient("503".into()))), PROVIDER);
        let stuck = ReconcileError::Stuck {
            spec: "seed-deployment".into(),
            status: "UPDATE_ROLLBACK_FAILED".into(),
        };
        assert_eq!(classify(&stuck.into()), PROVIDER);
        assert_eq!(
            classify(&OpenStackError::Authentication("HTTP 401".into()).into()),
            PROVIDER
        );
    }

    #[test]
    fn test_context_is_looked_through() {
        let err = anyhow::Error::from(ReconcileError::Cancelled("seed-network".into()))
            .context("apply failed");
        assert_eq!(classify(&err), CANCELLED);
        assert_eq!(classify(&anyhow::anyhow!("something else")), OTHER);
    }
}
