//! Fetch-or-create-or-update for a single resource

use crate::drift::{self, DriftPolicy};
use crate::error::{GatewayError, ReconcileError, Result, Step};
use crate::gateway::{ProviderGateway, ResourceRequest, WaitConfig};
use crate::handle::{ResourceHandle, ResourceStatus};
use crate::outcome::{Action, Outcome};
use crate::spec::{Parameters, ResourceSpec, UpdateStrategy};

/// Per-run knobs for [`ensure`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnsureOptions {
    /// Default polling; a spec's own wait configuration takes precedence
    pub wait: WaitConfig,
    pub drift: DriftPolicy,
    /// Report what would happen without calling create, update or delete
    pub dry_run: bool,
}

impl ResourceSpec {
    /// Brings the resource behind this spec to its desired state
    pub async fn reconcile(
        &self,
        gateway: &dyn ProviderGateway,
        parameters: &Parameters,
        options: &EnsureOptions,
    ) -> Result<Outcome> {
        ensure(gateway, self, parameters, options).await
    }
}

/// Ensures one spec with already-resolved parameters
pub async fn ensure(
    gateway: &dyn ProviderGateway,
    spec: &ResourceSpec,
    parameters: &Parameters,
    options: &EnsureOptions,
) -> Result<Outcome> {
    Ensure {
        gateway,
        spec,
        parameters,
        wait: spec.wait().copied().unwrap_or(options.wait),
        drift: options.drift,
        dry_run: options.dry_run,
    }
    .run()
    .await
}

struct Ensure<'a> {
    gateway: &'a dyn ProviderGateway,
    spec: &'a ResourceSpec,
    parameters: &'a Parameters,
    wait: WaitConfig,
    drift: DriftPolicy,
    dry_run: bool,
}

impl Ensure<'_> {
    async fn run(&self) -> Result<Outcome> {
        let spec = self.spec;
        tracing::debug!(spec = spec.name(), kind = %spec.kind(), "Looking up resource");

        let found = self
            .gateway
            .find(spec.kind(), spec.name())
            .await
            .map_err(|e| self.error(Step::Find, e))?
            .filter(|handle| handle.status() != ResourceStatus::Deleted);

        let Some(existing) = found else {
            tracing::debug!(spec = spec.name(), kind = %spec.kind(), "Resource not found");
            if spec.is_external() {
                return Err(ReconcileError::ExternalMissing(spec.name().to_string()));
            }
            let handle = self.create().await?;
            return Ok(self.outcome(Action::Created, handle, None));
        };

        tracing::debug!(
            spec = spec.name(),
            kind = %spec.kind(),
            provider_id = existing.provider_id(),
            status = existing.provider_status(),
            "Resource found"
        );

        if spec.is_external() {
            return Ok(self.outcome(Action::Unchanged, existing, None));
        }

        let existing = match existing.status() {
            ResourceStatus::Failed if existing.failed_on_create() => {
                tracing::warn!(
                    spec = spec.name(),
                    kind = %spec.kind(),
                    provider_id = existing.provider_id(),
                    status = existing.provider_status(),
                    "Resource failed to create, replacing it"
                );
                let handle = self.replace(&existing).await?;
                return Ok(self.outcome(Action::Replaced, handle, None));
            }
            ResourceStatus::Failed => {
                tracing::error!(
                    spec = spec.name(),
                    kind = %spec.kind(),
                    provider_id = existing.provider_id(),
                    status = existing.provider_status(),
                    "Resource is in a failed state and still holds live resources"
                );
                return Err(ReconcileError::Stuck {
                    spec: spec.name().to_string(),
                    status: existing.provider_status().to_string(),
                });
            }
            ResourceStatus::Pending if !self.dry_run => {
                match self
                    .gateway
                    .await_status(&existing, ResourceStatus::Ready, &self.wait)
                    .await
                {
                    Ok(handle) => handle,
                    Err(GatewayError::NotFound(_)) => {
                        tracing::info!(
                            spec = spec.name(),
                            kind = %spec.kind(),
                            provider_id = existing.provider_id(),
                            "Resource disappeared while settling, creating it"
                        );
                        let handle = self.create().await?;
                        return Ok(self.outcome(Action::Created, handle, None));
                    }
                    Err(e) => return Err(self.error(Step::Wait, e)),
                }
            }
            _ => existing,
        };

        if !spec.tracks_drift() {
            return Ok(self.outcome(Action::Unchanged, existing, None));
        }

        let Some(drift) = self.detect_drift(&existing).await? else {
            return Ok(self.outcome(Action::Unchanged, existing, None));
        };

        let diff = Some(drift.diff.clone());
        match self.drift {
            DriftPolicy::Warn => {
                tracing::warn!(
                    spec = spec.name(),
                    kind = %spec.kind(),
                    provider_id = existing.provider_id(),
                    "Resource has drifted:\n{}",
                    drift.diff
                );
                Ok(self.outcome(Action::Unchanged, existing, diff))
            }
            DriftPolicy::Fail => Err(ReconcileError::Drifted {
                spec: spec.name().to_string(),
                diff: drift.diff,
            }),
            DriftPolicy::Apply => match spec.strategy() {
                UpdateStrategy::Replace => {
                    let handle = self.replace(&existing).await?;
                    Ok(self.outcome(Action::Replaced, handle, diff))
                }
                _ => self.update(existing, drift.diff).await,
            },
        }
    }

    async fn detect_drift(&self, existing: &ResourceHandle) -> Result<Option<drift::Drift>> {
        let Some(template) = self.spec.template() else {
            return Ok(None);
        };

        // Nothing to compare against before the stack exists in a dry run
        if existing.is_planned() {
            return Ok(None);
        }

        let deployed = match self.gateway.current_template(existing).await {
            Ok(deployed) => deployed,
            Err(GatewayError::NotSupported { .. }) => {
                tracing::warn!(
                    spec = self.spec.name(),
                    provider = self.gateway.name(),
                    "Provider cannot read deployed templates, skipping drift check"
                );
                return Ok(None);
            }
            Err(e) => return Err(self.error(Step::ReadTemplate, e)),
        };

        Ok(drift::detect(template, self.parameters, &deployed))
    }

    async fn create(&self) -> Result<ResourceHandle> {
        let spec = self.spec;
        if self.dry_run {
            return Ok(ResourceHandle::planned(spec.kind(), spec.name()));
        }

        tracing::info!(spec = spec.name(), kind = %spec.kind(), action = "create", "Creating resource");
        let handle = self
            .gateway
            .create(&self.request())
            .await
            .map_err(|e| self.error(Step::Create, e))?;
        let handle = self.wait_for(&handle, ResourceStatus::Ready).await?;
        tracing::info!(
            spec = spec.name(),
            kind = %spec.kind(),
            action = "create",
            provider_id = handle.provider_id(),
            "Resource created"
        );
        Ok(handle)
    }

    async fn update(&self, existing: ResourceHandle, diff: String) -> Result<Outcome> {
        let spec = self.spec;
        if self.dry_run {
            return Ok(self.outcome(Action::Updated, existing, Some(diff)));
        }

        tracing::info!(
            spec = spec.name(),
            kind = %spec.kind(),
            action = "update",
            provider_id = existing.provider_id(),
            "Updating drifted resource:\n{}",
            diff
        );
        let handle = match self.gateway.update(&self.request()).await {
            Ok(handle) => handle,
            Err(GatewayError::NoUpdateNeeded) => {
                tracing::debug!(spec = spec.name(), "Provider reports no update needed");
                return Ok(self.outcome(Action::Unchanged, existing, None));
            }
            Err(GatewayError::Validation(message)) => {
                tracing::warn!(
                    spec = spec.name(),
                    kind = %spec.kind(),
                    provider_id = existing.provider_id(),
                    "Update rejected ({}), leaving resource as is. Drift:\n{}",
                    message,
                    diff
                );
                return Ok(self.outcome(Action::Unchanged, existing, Some(diff)));
            }
            Err(e) => return Err(self.error(Step::Update, e)),
        };

        let handle = self.wait_for(&handle, ResourceStatus::Ready).await?;
        tracing::info!(
            spec = spec.name(),
            kind = %spec.kind(),
            action = "update",
            provider_id = handle.provider_id(),
            "Resource updated"
        );
        Ok(self.outcome(Action::Updated, handle, Some(diff)))
    }

    /// Delete, wait for the deletion, then create afresh
    async fn replace(&self, existing: &ResourceHandle) -> Result<ResourceHandle> {
        let spec = self.spec;
        if self.dry_run {
            return Ok(ResourceHandle::planned(spec.kind(), spec.name()));
        }

        tracing::info!(
            spec = spec.name(),
            kind = %spec.kind(),
            action = "delete",
            provider_id = existing.provider_id(),
            "Deleting resource before recreating it"
        );
        self.gateway
            .delete(spec.kind(), spec.name())
            .await
            .map_err(|e| self.error(Step::Delete, e))?;

        let deleting = existing.superseded(ResourceStatus::Pending, "DELETE_IN_PROGRESS");
        match self
            .gateway
            .await_status(&deleting, ResourceStatus::Deleted, &self.wait)
            .await
        {
            Ok(_) | Err(GatewayError::NotFound(_)) => {}
            Err(e) => return Err(self.error(Step::Wait, e)),
        }

        self.create().await
    }

    async fn wait_for(&self, handle: &ResourceHandle, target: ResourceStatus) -> Result<ResourceHandle> {
        self.gateway
            .await_status(handle, target, &self.wait)
            .await
            .map_err(|e| self.error(Step::Wait, e))
    }

    fn request(&self) -> ResourceRequest<'_> {
        ResourceRequest {
            kind: self.spec.kind(),
            name: self.spec.name(),
            template: self.spec.template(),
            parameters: self.parameters,
            wait: &self.wait,
            stack: self.spec.stack_overrides(),
        }
    }

    fn outcome(&self, action: Action, handle: ResourceHandle, diff: Option<String>) -> Outcome {
        Outcome::new(self.spec.name(), action, handle).with_diff(diff)
    }

    fn error(&self, step: Step, source: GatewayError) -> ReconcileError {
        ReconcileError::gateway(self.spec.name(), self.spec.kind(), step, source)
    }
}
