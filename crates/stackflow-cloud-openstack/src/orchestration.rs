//! Heat stacks

use crate::error::{OpenStackError, Result, absent};
use crate::session::OpenStackSession;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use stackflow_core::{
    DeployedTemplate, GatewayError, GatewayResult, ResourceHandle, ResourceKind, ResourceRequest,
    ResourceStatus,
};
use std::collections::BTreeMap;

const SERVICE: &str = "orchestration";

/// Handle attributes holding deployed parameter values carry this prefix
pub(crate) const PARAMETER_ATTRIBUTE: &str = "parameter.";

#[derive(Debug, Deserialize)]
struct StackList {
    #[serde(default)]
    stacks: Vec<StackSummary>,
}

#[derive(Debug, Deserialize)]
struct StackSummary {
    id: String,
    stack_name: String,
}

#[derive(Debug, Deserialize)]
struct StackEnvelope {
    stack: StackDetail,
}

#[derive(Debug, Deserialize)]
struct StackDetail {
    id: String,
    #[serde(default)]
    stack_status: String,
    #[serde(default)]
    stack_status_reason: Option<String>,
    #[serde(default)]
    outputs: Vec<StackOutput>,
    #[serde(default)]
    parameters: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct StackOutput {
    output_key: String,
    #[serde(default)]
    output_value: Value,
}

#[derive(Debug, Deserialize)]
struct CreatedEnvelope {
    stack: CreatedStack,
}

#[derive(Debug, Deserialize)]
struct CreatedStack {
    id: String,
}

/// Strings stay as they are, everything else is rendered as JSON
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn to_handle(name: &str, stack: &StackDetail) -> ResourceHandle {
    let mut handle = ResourceHandle::new(
        ResourceKind::Stack,
        name,
        &stack.id,
        ResourceStatus::from_stack_status(&stack.stack_status),
    )
    .with_provider_status(&stack.stack_status)
    .with_outputs(
        stack
            .outputs
            .iter()
            .map(|output| (output.output_key.clone(), stringify(&output.output_value))),
    );

    if let Some(reason) = &stack.stack_status_reason {
        handle = handle.with_attribute("status_reason", reason);
    }
    // Heat adds OS::stack_id, OS::stack_name and OS::project_id
    for (key, value) in stack.parameters.iter().filter(|(k, _)| !k.starts_with("OS::")) {
        handle = handle.with_attribute(format!("{}{}", PARAMETER_ATTRIBUTE, key), stringify(value));
    }
    handle
}

fn template_text(request: &ResourceRequest<'_>) -> GatewayResult<String> {
    let template = request
        .template
        .ok_or_else(|| GatewayError::Validation(format!("stack {} has no template", request.name)))?;
    template.text().map(str::to_string).ok_or_else(|| {
        GatewayError::Validation(format!("template {} is not UTF-8", template.path().display()))
    })
}

async fn stack_id(session: &OpenStackSession, name: &str) -> Result<Option<String>> {
    let url = format!("{}/stacks", session.endpoint(SERVICE)?);
    let list: StackList = session
        .send_json(session.request(Method::GET, &url).query(&[("name", name)]))
        .await?;
    Ok(list
        .stacks
        .into_iter()
        .find(|stack| stack.stack_name == name)
        .map(|stack| stack.id))
}

async fn detail(session: &OpenStackSession, name: &str, id: &str) -> Result<Option<ResourceHandle>> {
    let url = format!("{}/stacks/{}/{}", session.endpoint(SERVICE)?, name, id);
    let envelope: Option<StackEnvelope> =
        absent(session.send_json(session.request(Method::GET, &url)).await)?;
    Ok(envelope.map(|e| to_handle(name, &e.stack)))
}

pub(crate) async fn find(session: &OpenStackSession, name: &str) -> Result<Option<ResourceHandle>> {
    match stack_id(session, name).await? {
        Some(id) => detail(session, name, &id).await,
        None => Ok(None),
    }
}

/// Deleted stacks drop out of the listing but stay readable by id
pub(crate) async fn refresh(session: &OpenStackSession, handle: &ResourceHandle) -> Result<Option<ResourceHandle>> {
    if handle.provider_id().is_empty() {
        return find(session, handle.name()).await;
    }
    detail(session, handle.name(), handle.provider_id()).await
}

pub(crate) async fn create(session: &OpenStackSession, request: &ResourceRequest<'_>) -> GatewayResult<ResourceHandle> {
    let url = format!("{}/stacks", session.endpoint(SERVICE)?);
    let body = json!({
        "stack_name": request.name,
        "template": template_text(request)?,
        "parameters": request.parameters,
        "timeout_mins": request.wait.timeout_minutes(),
        "disable_rollback": true,
    });

    tracing::info!(stack = request.name, "Creating Heat stack");
    let created: CreatedEnvelope = session
        .send_json(session.request(Method::POST, &url).json(&body))
        .await?;

    Ok(ResourceHandle::new(
        ResourceKind::Stack,
        request.name,
        created.stack.id,
        ResourceStatus::Pending,
    )
    .with_provider_status("CREATE_IN_PROGRESS"))
}

pub(crate) async fn update(session: &OpenStackSession, request: &ResourceRequest<'_>) -> GatewayResult<ResourceHandle> {
    let id = stack_id(session, request.name)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("stack {}", request.name)))?;
    let url = format!("{}/stacks/{}/{}", session.endpoint(SERVICE)?, request.name, id);
    let body = json!({
        "template": template_text(request)?,
        "parameters": request.parameters,
        "timeout_mins": request.wait.timeout_minutes(),
    });

    tracing::info!(stack = request.name, "Updating Heat stack");
    session.send(session.request(Method::PUT, &url).json(&body)).await?;

    Ok(
        ResourceHandle::new(ResourceKind::Stack, request.name, id, ResourceStatus::Pending)
            .with_provider_status("UPDATE_IN_PROGRESS"),
    )
}

pub(crate) async fn delete(session: &OpenStackSession, name: &str) -> Result<()> {
    let Some(id) = stack_id(session, name).await? else {
        return Ok(());
    };
    let url = format!("{}/stacks/{}/{}", session.endpoint(SERVICE)?, name, id);

    tracing::info!(stack = name, "Deleting Heat stack");
    absent(session.send(session.request(Method::DELETE, &url)).await)?;
    Ok(())
}

pub(crate) async fn current_template(session: &OpenStackSession, handle: &ResourceHandle) -> Result<DeployedTemplate> {
    let url = format!(
        "{}/stacks/{}/{}/template",
        session.endpoint(SERVICE)?,
        handle.name(),
        handle.provider_id()
    );
    let template: Value = session.send_json(session.request(Method::GET, &url)).await?;
    let body = serde_json::to_vec_pretty(&template).map_err(OpenStackError::from)?;

    let parameters = handle
        .attributes()
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(PARAMETER_ATTRIBUTE)
                .map(|key| (key.to_string(), value.clone()))
        })
        .collect();

    Ok(DeployedTemplate { body, parameters })
}
