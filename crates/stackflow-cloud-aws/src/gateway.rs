//! `ProviderGateway` over the CloudFormation API

use crate::error::{CloudFormationError, Result};
use crate::session::AwsSession;
use async_trait::async_trait;
use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::types::{Capability, Parameter, Stack, Tag};
use stackflow_core::{
    DeployedTemplate, GatewayError, GatewayResult, Parameters, ProviderGateway, ResourceHandle,
    ResourceKind, ResourceRequest, ResourceStatus, StackOverrides, WaitConfig, poll_status,
};
use std::collections::BTreeMap;

/// Handle attributes holding deployed parameter values carry this prefix
const PARAMETER_ATTRIBUTE: &str = "parameter.";

/// Settings applied to every stack this gateway creates or updates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackOptions {
    /// e.g. `CAPABILITY_IAM`, `CAPABILITY_NAMED_IAM`
    pub capabilities: Vec<String>,
    pub tags: BTreeMap<String, String>,
    /// Restricts which resource types a template may declare
    pub resource_types: Vec<String>,
}

impl StackOptions {
    /// These defaults with one stack's own settings applied
    pub fn with_overrides(&self, overrides: &StackOverrides) -> StackOptions {
        let mut tags = self.tags.clone();
        tags.extend(overrides.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        StackOptions {
            capabilities: overrides
                .capabilities
                .clone()
                .unwrap_or_else(|| self.capabilities.clone()),
            tags,
            resource_types: overrides
                .resource_types
                .clone()
                .unwrap_or_else(|| self.resource_types.clone()),
        }
    }

    fn sdk_tags(&self) -> GatewayResult<Vec<Tag>> {
        self.tags
            .iter()
            .map(|(key, value)| {
                Ok(Tag::builder().key(key).value(value).build())
            })
            .collect()
    }

    fn sdk_capabilities(&self) -> Vec<Capability> {
        self.capabilities
            .iter()
            .map(|c| Capability::from(c.as_str()))
            .collect()
    }

    fn sdk_resource_types(&self) -> Option<Vec<String>> {
        if self.resource_types.is_empty() {
            None
        } else {
            Some(self.resource_types.clone())
        }
    }
}

pub struct CloudFormationGateway {
    client: Client,
    options: StackOptions,
}

impl CloudFormationGateway {
    pub fn new(session: &AwsSession, options: StackOptions) -> Self {
        Self {
            client: Client::new(session.sdk_config()),
            options,
        }
    }

    /// Describes a stack by name or id; `None` once it is gone
    async fn describe(&self, name_or_id: &str) -> Result<Option<Stack>> {
        tracing::debug!(stack = name_or_id, "Describing stack");
        match self.client.describe_stacks().stack_name(name_or_id).send().await {
            Ok(output) => Ok(output.stacks().first().cloned()),
            Err(err) => match CloudFormationError::from(err) {
                err if err.is_not_found() => Ok(None),
                err => Err(err),
            },
        }
    }
}

fn ensure_stack(kind: ResourceKind) -> GatewayResult<()> {
    match kind {
        ResourceKind::Stack => Ok(()),
        kind => Err(GatewayError::not_supported("aws", kind)),
    }
}

fn template_body(request: &ResourceRequest<'_>) -> GatewayResult<String> {
    let template = request
        .template
        .ok_or_else(|| GatewayError::Validation(format!("stack {} has no template", request.name)))?;
    template.text().map(str::to_string).ok_or_else(|| {
        GatewayError::Validation(format!("template {} is not UTF-8", template.path().display()))
    })
}

/// Converts resolved parameters into CloudFormation parameters
pub fn to_parameters(parameters: &Parameters) -> Vec<Parameter> {
    parameters
        .iter()
        .map(|(key, value)| {
            Parameter::builder()
                .parameter_key(key)
                .parameter_value(value)
                .build()
        })
        .collect()
}

/// Snapshot of a described stack
pub fn to_handle(name: &str, stack: &Stack) -> ResourceHandle {
    let status = stack
        .stack_status()
        .map(|s| s.as_str().to_string())
        .unwrap_or_default();

    let mut handle = ResourceHandle::new(
        ResourceKind::Stack,
        name,
        stack.stack_id().unwrap_or_default(),
        ResourceStatus::from_stack_status(&status),
    )
    .with_provider_status(status)
    .with_outputs(stack.outputs().iter().filter_map(|output| {
        Some((output.output_key()?.to_string(), output.output_value()?.to_string()))
    }));

    if let Some(reason) = stack.stack_status_reason() {
        handle = handle.with_attribute("status_reason", reason);
    }
    for parameter in stack.parameters() {
        if let (Some(key), Some(value)) = (parameter.parameter_key(), parameter.parameter_value()) {
            handle = handle.with_attribute(format!("{}{}", PARAMETER_ATTRIBUTE, key), value);
        }
    }
    handle
}

/// Whether a wait for `Ready` ended in a rollback that started during the wait
fn rolled_back(before: &ResourceHandle, after: &ResourceHandle, target: ResourceStatus) -> bool {
    target == ResourceStatus::Ready
        && after.provider_status().contains("ROLLBACK")
        && !before.provider_status().contains("ROLLBACK")
}

#[async_trait]
impl ProviderGateway for CloudFormationGateway {
    fn name(&self) -> &str {
        "aws"
    }

    async fn find(&self, kind: ResourceKind, name: &str) -> GatewayResult<Option<ResourceHandle>> {
        ensure_stack(kind)?;
        Ok(self.describe(name).await?.map(|stack| to_handle(name, &stack)))
    }

    async fn create(&self, request: &ResourceRequest<'_>) -> GatewayResult<ResourceHandle> {
        ensure_stack(request.kind)?;
        let timeout = i32::try_from(request.wait.timeout_minutes()).unwrap_or(i32::MAX);
        let options = self.options.with_overrides(request.stack);

        tracing::info!(stack = request.name, capabilities = ?options.capabilities, "Creating stack");
        let output = self
            .client
            .create_stack()
            .stack_name(request.name)
            .template_body(template_body(request)?)
            .set_parameters(Some(to_parameters(request.parameters)))
            .disable_rollback(true)
            .timeout_in_minutes(timeout)
            .set_capabilities(Some(options.sdk_capabilities()))
            .set_tags(Some(options.sdk_tags()?))
            .set_resource_types(options.sdk_resource_types())
            .send()
            .await
            .map_err(CloudFormationError::from)?;

        Ok(ResourceHandle::new(
            ResourceKind::Stack,
            request.name,
            output.stack_id().unwrap_or_default(),
            ResourceStatus::Pending,
        )
        .with_provider_status("CREATE_IN_PROGRESS"))
    }

    async fn update(&self, request: &ResourceRequest<'_>) -> GatewayResult<ResourceHandle> {
        ensure_stack(request.kind)?;
        let options = self.options.with_overrides(request.stack);

        tracing::info!(stack = request.name, capabilities = ?options.capabilities, "Updating stack");
        let output = self
            .client
            .update_stack()
            .stack_name(request.name)
            .template_body(template_body(request)?)
            .set_parameters(Some(to_parameters(request.parameters)))
            .set_capabilities(Some(options.sdk_capabilities()))
            .set_tags(Some(options.sdk_tags()?))
            .set_resource_types(options.sdk_resource_types())
            .send()
            .await
            .map_err(CloudFormationError::from)?;

        Ok(ResourceHandle::new(
            ResourceKind::Stack,
            request.name,
            output.stack_id().unwrap_or_default(),
            ResourceStatus::Pending,
        )
        .with_provider_status("UPDATE_IN_PROGRESS"))
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> GatewayResult<()> {
        ensure_stack(kind)?;

        tracing::info!(stack = name, "Deleting stack");
        match self.client.delete_stack().stack_name(name).send().await {
            Ok(_) => Ok(()),
            Err(err) => match CloudFormationError::from(err) {
                err if err.is_not_found() => Ok(()),
                err => Err(err.into()),
            },
        }
    }

    /// Deleted stacks can only be described by id
    async fn refresh(&self, handle: &ResourceHandle) -> GatewayResult<Option<ResourceHandle>> {
        let key = if handle.provider_id().is_empty() {
            handle.name()
        } else {
            handle.provider_id()
        };
        Ok(self
            .describe(key)
            .await?
            .map(|stack| to_handle(handle.name(), &stack)))
    }

    async fn await_status(
        &self,
        handle: &ResourceHandle,
        target: ResourceStatus,
        wait: &WaitConfig,
    ) -> GatewayResult<ResourceHandle> {
        let reached = poll_status(self, handle, target, wait).await?;
        if rolled_back(handle, &reached, target) {
            return Err(GatewayError::BackendFailed {
                name: reached.name().to_string(),
                status: reached.provider_status().to_string(),
            });
        }
        Ok(reached)
    }

    async fn current_template(&self, handle: &ResourceHandle) -> GatewayResult<DeployedTemplate> {
        ensure_stack(handle.kind())?;

        let output = self
            .client
            .get_template()
            .stack_name(handle.name())
            .send()
            .await
            .map_err(CloudFormationError::from)?;

        let parameters = handle
            .attributes()
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(PARAMETER_ATTRIBUTE)
                    .map(|key| (key.to_string(), value.clone()))
            })
            .collect();

        Ok(DeployedTemplate {
            body: output.template_body().unwrap_or_default().as_bytes().to_vec(),
            parameters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_parameters() {
        let mut parameters = Parameters::new();
        parameters.insert("external_network".into(), "net-1".into());
        parameters.insert("flavor".into(), "t3.small".into());

        let converted = to_parameters(&parameters);
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].parameter_key(), Some("external_network"));
        assert_eq!(converted[0].parameter_value(), Some("net-1"));
        assert_eq!(converted[1].parameter_key(), Some("flavor"));
    }

    #[test]
    fn test_rolled_back() {
        let stack = |status: &str| {
            ResourceHandle::new(ResourceKind::Stack, "seed-network", "arn", ResourceStatus::from_stack_status(status))
                .with_provider_status(status)
        };

        assert!(rolled_back(
            &stack("UPDATE_IN_PROGRESS"),
            &stack("UPDATE_ROLLBACK_COMPLETE"),
            ResourceStatus::Ready
        ));
        assert!(!rolled_back(
            &stack("UPDATE_ROLLBACK_IN_PROGRESS"),
            &stack("UPDATE_ROLLBACK_COMPLETE"),
            ResourceStatus::Ready
        ));
        assert!(!rolled_back(
            &stack("UPDATE_IN_PROGRESS"),
            &stack("UPDATE_COMPLETE"),
            ResourceStatus::Ready
        ));
    }

    #[test]
    fn test_stack_overrides_fall_back_to_defaults() {
        let defaults = StackOptions {
            capabilities: vec!["CAPABILITY_IAM".into()],
            tags: BTreeMap::from([("owner".to_string(), "seed".to_string())]),
            resource_types: Vec::new(),
        };

        let storage = defaults.with_overrides(&StackOverrides {
            resource_types: Some(vec!["AWS::S3::*".into()]),
            tags: BTreeMap::from([("tier".to_string(), "storage".to_string())]),
            ..StackOverrides::default()
        });
        assert_eq!(storage.capabilities, vec!["CAPABILITY_IAM"]);
        assert_eq!(storage.resource_types, vec!["AWS::S3::*"]);
        assert_eq!(storage.tags.len(), 2);
        assert_eq!(storage.sdk_resource_types(), Some(vec!["AWS::S3::*".to_string()]));

        let network = defaults.with_overrides(&StackOverrides {
            capabilities: Some(vec!["CAPABILITY_NAMED_IAM".into()]),
            tags: BTreeMap::from([("owner".to_string(), "ci".to_string())]),
            ..StackOverrides::default()
        });
        assert_eq!(network.sdk_capabilities(), vec![Capability::CapabilityNamedIam]);
        assert_eq!(network.tags["owner"], "ci");
        assert_eq!(network.sdk_resource_types(), None);

        assert_eq!(defaults.with_overrides(&StackOverrides::default()), defaults);
    }

    #[test]
    fn test_only_stacks_are_supported() {
        assert!(ensure_stack(ResourceKind::Stack).is_ok());
        assert!(matches!(
            ensure_stack(ResourceKind::Keypair),
            Err(GatewayError::NotSupported { .. })
        ));
    }
}
