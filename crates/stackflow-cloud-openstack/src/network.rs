//! Neutron networks

use crate::error::{Result, absent};
use crate::session::OpenStackSession;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use stackflow_core::{ResourceHandle, ResourceKind, ResourceRequest, ResourceStatus};

const SERVICE: &str = "network";

#[derive(Debug, Deserialize)]
struct NetworkList {
    #[serde(default)]
    networks: Vec<Network>,
}

#[derive(Debug, Deserialize)]
struct NetworkEnvelope {
    network: Network,
}

#[derive(Debug, Deserialize)]
struct Network {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default, rename = "router:external")]
    external: bool,
    #[serde(default)]
    subnets: Vec<String>,
}

pub(crate) fn network_status(status: &str) -> ResourceStatus {
    match status {
        "ACTIVE" => ResourceStatus::Ready,
        "ERROR" => ResourceStatus::Failed,
        _ => ResourceStatus::Pending,
    }
}

/// Catalog URLs may or may not carry the API version
fn base(session: &OpenStackSession) -> Result<String> {
    let endpoint = session.endpoint(SERVICE)?;
    if endpoint.ends_with("/v2.0") {
        Ok(endpoint)
    } else {
        Ok(format!("{}/v2.0", endpoint))
    }
}

fn to_handle(network: &Network) -> ResourceHandle {
    let mut handle = ResourceHandle::new(
        ResourceKind::Network,
        &network.name,
        &network.id,
        network_status(&network.status),
    )
    .with_provider_status(&network.status)
    .with_attribute("id", &network.id)
    .with_attribute("external", network.external.to_string());
    if let Some(subnet) = network.subnets.first() {
        handle = handle.with_attribute("subnet_id", subnet);
    }
    handle
}

pub(crate) async fn find(session: &OpenStackSession, name: &str) -> Result<Option<ResourceHandle>> {
    let url = format!("{}/networks", base(session)?);
    let list: NetworkList = session
        .send_json(session.request(Method::GET, &url).query(&[("name", name)]))
        .await?;
    Ok(list
        .networks
        .iter()
        .find(|network| network.name == name)
        .map(to_handle))
}

pub(crate) async fn refresh(session: &OpenStackSession, handle: &ResourceHandle) -> Result<Option<ResourceHandle>> {
    if handle.provider_id().is_empty() {
        return find(session, handle.name()).await;
    }
    let url = format!("{}/networks/{}", base(session)?, handle.provider_id());
    let envelope: Option<NetworkEnvelope> =
        absent(session.send_json(session.request(Method::GET, &url)).await)?;
    Ok(envelope.map(|e| to_handle(&e.network)))
}

pub(crate) async fn create(session: &OpenStackSession, request: &ResourceRequest<'_>) -> Result<ResourceHandle> {
    let url = format!("{}/networks", base(session)?);
    let mut network = json!({ "name": request.name, "admin_state_up": true });
    if let Some(mtu) = request.parameters.get("mtu").and_then(|m| m.parse::<u32>().ok()) {
        network["mtu"] = json!(mtu);
    }

    tracing::info!(network = request.name, "Creating network");
    let created: NetworkEnvelope = session
        .send_json(
            session
                .request(Method::POST, &url)
                .json(&json!({ "network": network })),
        )
        .await?;
    Ok(to_handle(&created.network))
}

pub(crate) async fn delete(session: &OpenStackSession, name: &str) -> Result<()> {
    let Some(network) = find(session, name).await? else {
        return Ok(());
    };
    let url = format!("{}/networks/{}", base(session)?, network.provider_id());
    tracing::info!(network = name, id = network.provider_id(), "Deleting network");
    absent(session.send(session.request(Method::DELETE, &url)).await)?;
    Ok(())
}
