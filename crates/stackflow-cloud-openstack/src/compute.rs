//! Nova keypairs

use crate::error::{OpenStackError, Result, absent};
use crate::session::OpenStackSession;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use stackflow_core::{ResourceHandle, ResourceKind, ResourceRequest, ResourceStatus};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

const SERVICE: &str = "compute";

#[derive(Debug, Deserialize)]
struct KeypairEnvelope {
    keypair: Keypair,
}

#[derive(Debug, Deserialize)]
struct Keypair {
    name: String,
    #[serde(default)]
    fingerprint: Option<String>,
    #[serde(default)]
    public_key: Option<String>,
    /// Only present when Nova generated the key
    #[serde(default)]
    private_key: Option<String>,
}

/// Keypairs are ready as soon as they exist; Nova identifies them by name
fn to_handle(keypair: &Keypair) -> ResourceHandle {
    let mut handle = ResourceHandle::new(
        ResourceKind::Keypair,
        &keypair.name,
        &keypair.name,
        ResourceStatus::Ready,
    )
    .with_attribute("name", &keypair.name);
    if let Some(fingerprint) = &keypair.fingerprint {
        handle = handle.with_attribute("fingerprint", fingerprint);
    }
    if let Some(public_key) = &keypair.public_key {
        handle = handle.with_attribute("public_key", public_key.trim_end());
    }
    handle
}

pub(crate) async fn find(session: &OpenStackSession, name: &str) -> Result<Option<ResourceHandle>> {
    let url = format!("{}/os-keypairs/{}", session.endpoint(SERVICE)?, name);
    let envelope: Option<KeypairEnvelope> =
        absent(session.send_json(session.request(Method::GET, &url)).await)?;
    Ok(envelope.map(|e| to_handle(&e.keypair)))
}

/// Creates the keypair, importing the `public_key` parameter when given
///
/// A generated private key is written to `<key_dir>/<name>.pem`; Nova never
/// returns it again, so the keypair is deleted if the key cannot be saved.
pub(crate) async fn create(
    session: &OpenStackSession,
    request: &ResourceRequest<'_>,
    key_dir: &Path,
) -> Result<ResourceHandle> {
    let url = format!("{}/os-keypairs", session.endpoint(SERVICE)?);
    let mut keypair = json!({ "name": request.name });
    match request.parameters.get("public_key") {
        Some(public_key) => keypair["public_key"] = json!(public_key),
        None => {
            let pem = pem_path(key_dir, request.name);
            if tokio::fs::metadata(&pem).await.is_ok() {
                return Err(OpenStackError::InvalidParameter(format!(
                    "{} already exists, move it away before creating keypair {}",
                    pem.display(),
                    request.name
                )));
            }
        }
    }

    tracing::info!(keypair = request.name, "Creating keypair");
    let created: KeypairEnvelope = session
        .send_json(
            session
                .request(Method::POST, &url)
                .json(&json!({ "keypair": keypair })),
        )
        .await?;

    let mut handle = to_handle(&created.keypair);
    if let Some(private_key) = &created.keypair.private_key {
        let written = write_key_files(
            key_dir,
            request.name,
            private_key,
            created.keypair.public_key.as_deref(),
        )
        .await;
        let pem = match written {
            Ok((pem, _)) => pem,
            Err(err) => {
                tracing::error!(keypair = request.name, error = %err, "Could not save private key, deleting keypair");
                if let Err(cleanup) = delete(session, request.name).await {
                    tracing::warn!(keypair = request.name, error = %cleanup, "Failed to delete keypair");
                }
                return Err(err);
            }
        };
        tracing::info!(path = %pem.display(), "Wrote private key");
        handle = handle.with_attribute("private_key_path", pem.display().to_string());
    }
    Ok(handle)
}

pub(crate) async fn delete(session: &OpenStackSession, name: &str) -> Result<()> {
    let url = format!("{}/os-keypairs/{}", session.endpoint(SERVICE)?, name);
    tracing::info!(keypair = name, "Deleting keypair");
    absent(session.send(session.request(Method::DELETE, &url)).await)?;
    Ok(())
}

fn pem_path(key_dir: &Path, name: &str) -> PathBuf {
    key_dir.join(format!("{}.pem", name))
}

/// Writes `<name>.pem` (0600) and `<name>.pub` (0644) under `key_dir`
///
/// An existing private key file is never overwritten.
async fn write_key_files(
    key_dir: &Path,
    name: &str,
    private_key: &str,
    public_key: Option<&str>,
) -> Result<(PathBuf, Option<PathBuf>)> {
    tokio::fs::create_dir_all(key_dir).await?;

    let pem = pem_path(key_dir, name);
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    write_file(&mut options, &pem, private_key, 0o600).await?;

    let public = match public_key {
        Some(public_key) => {
            let path = key_dir.join(format!("{}.pub", name));
            let mut options = OpenOptions::new();
            options.write(true).create(true).truncate(true);
            write_file(&mut options, &path, public_key, 0o644).await?;
            Some(path)
        }
        None => None,
    };
    Ok((pem, public))
}

/// The mode is applied at creation, so the file is never readable more widely
async fn write_file(options: &mut OpenOptions, path: &Path, contents: &str, mode: u32) -> Result<()> {
    #[cfg(unix)]
    options.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(path).await?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
