//! Cinder volumes

use crate::error::{OpenStackError, Result, absent};
use crate::session::OpenStackSession;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use stackflow_core::{ResourceHandle, ResourceKind, ResourceRequest, ResourceStatus};

const SERVICES: &[&str] = &["volumev3", "block-storage"];

#[derive(Debug, Deserialize)]
struct VolumeList {
    #[serde(default)]
    volumes: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
struct VolumeEnvelope {
    volume: Volume,
}

#[derive(Debug, Deserialize)]
struct Volume {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    volume_type: Option<String>,
}

pub(crate) fn volume_status(status: &str) -> ResourceStatus {
    match status {
        "available" | "in-use" => ResourceStatus::Ready,
        s if s.starts_with("error") => ResourceStatus::Failed,
        _ => ResourceStatus::Pending,
    }
}

fn to_handle(name: &str, volume: &Volume) -> ResourceHandle {
    let mut handle = ResourceHandle::new(
        ResourceKind::Volume,
        volume.name.as_deref().unwrap_or(name),
        &volume.id,
        volume_status(&volume.status),
    )
    .with_provider_status(&volume.status)
    .with_attribute("id", &volume.id);
    if let Some(size) = volume.size {
        handle = handle.with_attribute("size", size.to_string());
    }
    if let Some(volume_type) = &volume.volume_type {
        handle = handle.with_attribute("volume_type", volume_type);
    }
    handle
}

pub(crate) async fn find(session: &OpenStackSession, name: &str) -> Result<Option<ResourceHandle>> {
    let url = format!("{}/volumes/detail", session.endpoint_any(SERVICES)?);
    let list: VolumeList = session
        .send_json(session.request(Method::GET, &url).query(&[("name", name)]))
        .await?;
    Ok(list
        .volumes
        .iter()
        .find(|volume| volume.name.as_deref() == Some(name))
        .map(|volume| to_handle(name, volume)))
}

pub(crate) async fn refresh(session: &OpenStackSession, handle: &ResourceHandle) -> Result<Option<ResourceHandle>> {
    if handle.provider_id().is_empty() {
        return find(session, handle.name()).await;
    }
    let url = format!("{}/volumes/{}", session.endpoint_any(SERVICES)?, handle.provider_id());
    let envelope: Option<VolumeEnvelope> =
        absent(session.send_json(session.request(Method::GET, &url)).await)?;
    Ok(envelope.map(|e| to_handle(handle.name(), &e.volume)))
}

/// Requires a `size` parameter (GiB); `volume_type` and `availability_zone`
/// are passed through when set
pub(crate) async fn create(session: &OpenStackSession, request: &ResourceRequest<'_>) -> Result<ResourceHandle> {
    let size: u64 = request
        .parameters
        .get("size")
        .ok_or_else(|| OpenStackError::InvalidParameter(format!("volume {} needs a size parameter", request.name)))?
        .parse()
        .map_err(|_| OpenStackError::InvalidParameter(format!("volume {}: size must be a whole number of GiB", request.name)))?;

    let mut volume = json!({ "name": request.name, "size": size });
    for key in ["volume_type", "availability_zone", "description"] {
        if let Some(value) = request.parameters.get(key) {
            volume[key] = Value::String(value.clone());
        }
    }

    let url = format!("{}/volumes", session.endpoint_any(SERVICES)?);
    tracing::info!(volume = request.name, size, "Creating volume");
    let created: VolumeEnvelope = session
        .send_json(
            session
                .request(Method::POST, &url)
                .json(&json!({ "volume": volume })),
        )
        .await?;
    Ok(to_handle(request.name, &created.volume))
}

pub(crate) async fn delete(session: &OpenStackSession, name: &str) -> Result<()> {
    let Some(volume) = find(session, name).await? else {
        return Ok(());
    };
    let url = format!("{}/volumes/{}", session.endpoint_any(SERVICES)?, volume.provider_id());
    tracing::info!(volume = name, id = volume.provider_id(), "Deleting volume");
    absent(session.send(session.request(Method::DELETE, &url)).await)?;
    Ok(())
}
