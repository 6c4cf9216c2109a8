//! Blueprint, settings and gateway wiring shared by the commands

use crate::GlobalArgs;
use colored::Colorize;
use stackflow_cloud_aws::{AwsSession, CloudFormationGateway, StackOptions};
use stackflow_cloud_openstack::{CloudConfig, HttpTimeouts, OpenStackGateway, OpenStackSession};
use stackflow_config::{Blueprint, ProviderTarget, Settings};
use stackflow_core::{ProviderGateway, SpecGraph};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a command needs before talking to a provider
pub struct Workspace {
    pub path: PathBuf,
    pub blueprint: Blueprint,
    pub settings: Settings,
}

impl Workspace {
    /// Settings precedence: config file < environment < command-line flags
    pub fn load(global: &GlobalArgs) -> anyhow::Result<Self> {
        let path = match &global.blueprint {
            Some(path) => path.clone(),
            None => stackflow_config::find_blueprint()?,
        };
        let blueprint = Blueprint::load(&path)?;

        let mut settings = Settings::load()?;
        if let Some(cloud) = &global.cloud {
            settings.cloud = Some(cloud.clone());
        }
        if let Some(prefix) = &global.prefix {
            settings.prefix = Some(prefix.clone());
        }

        tracing::debug!(blueprint = %path.display(), "Using blueprint");
        Ok(Self {
            path,
            blueprint,
            settings,
        })
    }

    pub fn prefix(&self) -> Option<&str> {
        self.settings
            .prefix
            .as_deref()
            .or(self.blueprint.prefix.as_deref())
            .filter(|p| !p.is_empty())
    }

    pub fn graph(&self) -> anyhow::Result<SpecGraph> {
        Ok(self.blueprint.graph(self.settings.prefix.as_deref())?)
    }

    /// Maps root names as written in the blueprint to their prefixed names
    pub fn resolve_roots(&self, graph: &SpecGraph, roots: &[String]) -> Vec<String> {
        roots
            .iter()
            .map(|root| match self.prefix() {
                Some(prefix) if graph.get(root).is_none() => {
                    let prefixed = format!("{}-{}", prefix, root);
                    if graph.get(&prefixed).is_some() {
                        prefixed
                    } else {
                        root.clone()
                    }
                }
                _ => root.clone(),
            })
            .collect()
    }

    pub fn print_header(&self) {
        println!("Blueprint: {}", self.path.display().to_string().cyan());
        if let Some(prefix) = self.prefix() {
            println!("Prefix:    {}", prefix.cyan());
        }
    }

    /// Authenticates against the blueprint's provider and builds its gateway
    pub async fn connect(&self) -> anyhow::Result<Arc<dyn ProviderGateway>> {
        match self.blueprint.provider_target(&self.settings)? {
            ProviderTarget::OpenStack { cloud, key_dir } => {
                tracing::info!(provider = "openstack", cloud = %cloud, "Connecting");
                let config = CloudConfig::load(&cloud)?;
                let timeouts = HttpTimeouts {
                    request: self.settings.http_timeout(),
                    ..HttpTimeouts::default()
                };
                let session = OpenStackSession::authenticate_with(&config, timeouts).await?;
                Ok(Arc::new(OpenStackGateway::new(session, key_dir)))
            }
            ProviderTarget::Aws {
                region,
                profile,
                capabilities,
                tags,
                resource_types,
            } => {
                let session =
                    AwsSession::load(region.as_deref(), profile.as_deref(), self.settings.http_timeout()).await;
                tracing::info!(provider = "aws", region = session.region().unwrap_or("default"), "Connecting");
                let options = StackOptions {
                    capabilities,
                    tags,
                    resource_types,
                };
                Ok(Arc::new(CloudFormationGateway::new(&session, options)))
            }
        }
    }
}
