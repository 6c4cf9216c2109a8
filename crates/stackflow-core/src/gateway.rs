//! Provider gateway trait definition

use crate::error::{GatewayError, GatewayResult};
use crate::handle::{ResourceHandle, ResourceKind, ResourceStatus};
use crate::spec::{Parameters, StackOverrides, Template};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Polling configuration for [`ProviderGateway::await_status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Delay between two status reads
    pub poll_interval: Duration,

    /// Give up after this long
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(300),
        }
    }
}

impl WaitConfig {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Timeout rounded up to whole minutes, the unit stack APIs take
    pub fn timeout_minutes(&self) -> u32 {
        let secs = self.timeout.as_secs();
        u32::try_from(secs.div_ceil(60)).unwrap_or(u32::MAX).max(1)
    }
}

/// Everything a gateway needs to create or update one resource
#[derive(Debug, Clone, Copy)]
pub struct ResourceRequest<'a> {
    pub kind: ResourceKind,
    pub name: &'a str,
    pub template: Option<&'a Template>,
    pub parameters: &'a Parameters,
    pub wait: &'a WaitConfig,
    pub stack: &'a StackOverrides,
}

/// Template and parameters a stack-like resource is currently deployed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedTemplate {
    pub body: Vec<u8>,
    pub parameters: Parameters,
}

/// Boundary between the reconciler and a cloud backend
///
/// Every backend (CloudFormation, OpenStack, ...) implements this trait. The
/// reconciler only ever talks to `dyn ProviderGateway`.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Backend name used in logs and errors (e.g. "openstack")
    fn name(&self) -> &str;

    /// Look a resource up by kind and name
    async fn find(&self, kind: ResourceKind, name: &str) -> GatewayResult<Option<ResourceHandle>>;

    /// Create a resource; the returned handle may still be pending
    async fn create(&self, request: &ResourceRequest<'_>) -> GatewayResult<ResourceHandle>;

    /// Update a resource in place; the returned handle may still be pending
    async fn update(&self, request: &ResourceRequest<'_>) -> GatewayResult<ResourceHandle>;

    /// Delete a resource. Deleting an absent resource succeeds.
    async fn delete(&self, kind: ResourceKind, name: &str) -> GatewayResult<()>;

    /// Re-read the resource behind a handle
    async fn refresh(&self, handle: &ResourceHandle) -> GatewayResult<Option<ResourceHandle>> {
        self.find(handle.kind(), handle.name()).await
    }

    /// Poll until the resource reaches `target`
    async fn await_status(
        &self,
        handle: &ResourceHandle,
        target: ResourceStatus,
        wait: &WaitConfig,
    ) -> GatewayResult<ResourceHandle> {
        poll_status(self, handle, target, wait).await
    }

    /// Template and parameters the resource is currently deployed with
    async fn current_template(&self, handle: &ResourceHandle) -> GatewayResult<DeployedTemplate> {
        Err(GatewayError::not_supported(self.name(), handle.kind()))
    }
}

/// Polls [`ProviderGateway::refresh`] until `target` is reached
///
/// Fails with `BackendFailed` once the resource lands in
/// [`ResourceStatus::Failed`] and with `Timeout` after `wait.timeout`. A
/// resource that disappears while waiting for `Deleted` has reached it; one
/// that disappears while waiting for anything else fails with `NotFound`.
pub async fn poll_status<G>(
    gateway: &G,
    handle: &ResourceHandle,
    target: ResourceStatus,
    wait: &WaitConfig,
) -> GatewayResult<ResourceHandle>
where
    G: ProviderGateway + ?Sized,
{
    let started = Instant::now();
    let mut current = handle.clone();

    loop {
        if current.status() == target {
            return Ok(current);
        }
        if current.status() == ResourceStatus::Deleted {
            return Err(GatewayError::NotFound(current.name().to_string()));
        }
        if current.status() == ResourceStatus::Failed {
            return Err(GatewayError::BackendFailed {
                name: current.name().to_string(),
                status: current.provider_status().to_string(),
            });
        }

        let elapsed = started.elapsed();
        if elapsed >= wait.timeout {
            return Err(GatewayError::Timeout {
                name: current.name().to_string(),
                target,
                elapsed,
            });
        }

        tracing::debug!(
            kind = %current.kind(),
            name = current.name(),
            status = current.provider_status(),
            target = %target,
            "Waiting for resource"
        );
        tokio::time::sleep(wait.poll_interval.min(wait.timeout - elapsed)).await;

        current = match gateway.refresh(&current).await? {
            Some(next) => next,
            None if target == ResourceStatus::Deleted => {
                return Ok(current.superseded(ResourceStatus::Deleted, "DELETED"));
            }
            None => return Err(GatewayError::NotFound(current.name().to_string())),
        };
    }
}
