//! `ProviderGateway` over the OpenStack APIs

use crate::session::OpenStackSession;
use crate::{block_storage, compute, network, object_store, orchestration};
use async_trait::async_trait;
use stackflow_core::{
    DeployedTemplate, GatewayError, GatewayResult, ProviderGateway, ResourceHandle, ResourceKind,
    ResourceRequest,
};
use std::path::{Path, PathBuf};

pub struct OpenStackGateway {
    session: OpenStackSession,
    key_dir: PathBuf,
}

impl OpenStackGateway {
    /// `key_dir` receives private keys of generated keypairs
    pub fn new(session: OpenStackSession, key_dir: impl Into<PathBuf>) -> Self {
        Self {
            session,
            key_dir: key_dir.into(),
        }
    }

    pub fn session(&self) -> &OpenStackSession {
        &self.session
    }

    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    fn unsupported(&self, kind: ResourceKind) -> GatewayError {
        GatewayError::not_supported(self.name(), kind)
    }
}

#[async_trait]
impl ProviderGateway for OpenStackGateway {
    fn name(&self) -> &str {
        "openstack"
    }

    async fn find(&self, kind: ResourceKind, name: &str) -> GatewayResult<Option<ResourceHandle>> {
        let session = &self.session;
        let found = match kind {
            ResourceKind::Stack => orchestration::find(session, name).await?,
            ResourceKind::Keypair => compute::find(session, name).await?,
            ResourceKind::Container => object_store::find(session, name).await?,
            ResourceKind::Volume => block_storage::find(session, name).await?,
            ResourceKind::Network => network::find(session, name).await?,
            kind => return Err(self.unsupported(kind)),
        };
        Ok(found)
    }

    async fn create(&self, request: &ResourceRequest<'_>) -> GatewayResult<ResourceHandle> {
        let session = &self.session;
        match request.kind {
            ResourceKind::Stack => orchestration::create(session, request).await,
            ResourceKind::Keypair => Ok(compute::create(session, request, &self.key_dir).await?),
            ResourceKind::Container => Ok(object_store::create(session, request.name).await?),
            ResourceKind::Volume => Ok(block_storage::create(session, request).await?),
            ResourceKind::Network => Ok(network::create(session, request).await?),
            kind => Err(self.unsupported(kind)),
        }
    }

    /// Only stacks can be changed in place
    async fn update(&self, request: &ResourceRequest<'_>) -> GatewayResult<ResourceHandle> {
        match request.kind {
            ResourceKind::Stack => orchestration::update(&self.session, request).await,
            kind => Err(self.unsupported(kind)),
        }
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> GatewayResult<()> {
        let session = &self.session;
        match kind {
            ResourceKind::Stack => orchestration::delete(session, name).await?,
            ResourceKind::Keypair => compute::delete(session, name).await?,
            ResourceKind::Container => object_store::delete(session, name).await?,
            ResourceKind::Volume => block_storage::delete(session, name).await?,
            ResourceKind::Network => network::delete(session, name).await?,
            kind => return Err(self.unsupported(kind)),
        }
        Ok(())
    }

    async fn refresh(&self, handle: &ResourceHandle) -> GatewayResult<Option<ResourceHandle>> {
        let session = &self.session;
        let refreshed = match handle.kind() {
            ResourceKind::Stack => orchestration::refresh(session, handle).await?,
            ResourceKind::Volume => block_storage::refresh(session, handle).await?,
            ResourceKind::Network => network::refresh(session, handle).await?,
            kind => return self.find(kind, handle.name()).await,
        };
        Ok(refreshed)
    }

    async fn current_template(&self, handle: &ResourceHandle) -> GatewayResult<DeployedTemplate> {
        match handle.kind() {
            ResourceKind::Stack => Ok(orchestration::current_template(&self.session, handle).await?),
            kind => Err(self.unsupported(kind)),
        }
    }
}
