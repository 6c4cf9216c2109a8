//! Swift containers

use crate::error::{Result, absent};
use crate::session::OpenStackSession;
use reqwest::Method;
use reqwest::header::HeaderMap;
use stackflow_core::{ResourceHandle, ResourceKind, ResourceStatus};

const SERVICE: &str = "object-store";

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn to_handle(name: &str, url: &str, headers: &HeaderMap) -> ResourceHandle {
    let mut handle = ResourceHandle::new(ResourceKind::Container, name, name, ResourceStatus::Ready)
        .with_attribute("name", name)
        .with_attribute("url", url);
    for (header_name, attribute) in [
        ("X-Container-Object-Count", "object_count"),
        ("X-Container-Bytes-Used", "bytes_used"),
    ] {
        if let Some(value) = header(headers, header_name) {
            handle = handle.with_attribute(attribute, value);
        }
    }
    handle
}

fn container_url(session: &OpenStackSession, name: &str) -> Result<String> {
    Ok(format!("{}/{}", session.endpoint(SERVICE)?, name))
}

pub(crate) async fn find(session: &OpenStackSession, name: &str) -> Result<Option<ResourceHandle>> {
    let url = container_url(session, name)?;
    let response = absent(session.send(session.request(Method::HEAD, &url)).await)?;
    Ok(response.map(|r| to_handle(name, &url, r.headers())))
}

pub(crate) async fn create(session: &OpenStackSession, name: &str) -> Result<ResourceHandle> {
    let url = container_url(session, name)?;
    tracing::info!(container = name, "Creating container");
    session.send(session.request(Method::PUT, &url)).await?;
    Ok(ResourceHandle::new(ResourceKind::Container, name, name, ResourceStatus::Ready)
        .with_attribute("name", name)
        .with_attribute("url", url))
}

/// Swift refuses to delete a non-empty container with 409
pub(crate) async fn delete(session: &OpenStackSession, name: &str) -> Result<()> {
    let url = container_url(session, name)?;
    tracing::info!(container = name, "Deleting container");
    absent(session.send(session.request(Method::DELETE, &url)).await)?;
    Ok(())
}
