//! `clouds.yaml` discovery and parsing

use crate::error::{OpenStackError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CloudsFile {
    #[serde(default)]
    clouds: HashMap<String, CloudConfig>,
}

/// One entry under `clouds:`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CloudConfig {
    #[serde(default)]
    pub auth: AuthConfig,

    /// `password` (default) or `v3applicationcredential`
    #[serde(default)]
    pub auth_type: Option<String>,

    #[serde(default)]
    pub region_name: Option<String>,

    /// Endpoint interface to use from the catalog
    #[serde(default)]
    pub interface: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthConfig {
    pub auth_url: Option<String>,
    pub username: Option<String>,
    pub user_id: Option<String>,
    pub password: Option<String>,
    pub project_name: Option<String>,
    pub project_id: Option<String>,
    pub user_domain_name: Option<String>,
    pub user_domain_id: Option<String>,
    pub project_domain_name: Option<String>,
    pub project_domain_id: Option<String>,
    pub application_credential_id: Option<String>,
    pub application_credential_secret: Option<String>,
}

impl CloudConfig {
    /// Loads the named cloud from the first `clouds.yaml` found
    pub fn load(name: &str) -> Result<Self> {
        let path = find_clouds_file()?;
        Self::from_file(&path, name)
    }

    pub fn from_file(path: &Path, name: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let file: CloudsFile = serde_yaml::from_str(&text).map_err(|source| OpenStackError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cloud = file
            .clouds
            .get(name)
            .cloned()
            .ok_or_else(|| OpenStackError::CloudNotFound {
                name: name.to_string(),
                path: path.to_path_buf(),
            })?;

        // Passwords are commonly kept out of clouds.yaml
        if cloud.auth.password.is_none() {
            cloud.auth.password = std::env::var("OS_PASSWORD").ok().filter(|p| !p.is_empty());
        }

        tracing::debug!(cloud = name, path = %path.display(), "Loaded cloud configuration");
        Ok(cloud)
    }

    pub fn uses_application_credential(&self) -> bool {
        self.auth_type.as_deref() == Some("v3applicationcredential")
            || self.auth.application_credential_id.is_some()
    }

    pub fn auth_url(&self) -> Result<&str> {
        self.auth
            .auth_url
            .as_deref()
            .ok_or_else(|| OpenStackError::InvalidCloud("auth.auth_url is not set".to_string()))
    }

    pub fn interface(&self) -> &str {
        self.interface.as_deref().unwrap_or("public")
    }
}

/// Locates `clouds.yaml`
///
/// Search order:
/// 1. `OS_CLIENT_CONFIG_FILE`
/// 2. ./clouds.yaml
/// 3. ~/.config/openstack/clouds.yaml
/// 4. /etc/openstack/clouds.yaml
pub fn find_clouds_file() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("OS_CLIENT_CONFIG_FILE") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
    }

    let mut candidates = vec![std::env::current_dir()?.join("clouds.yaml")];
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join("openstack").join("clouds.yaml"));
    }
    candidates.push(PathBuf::from("/etc/openstack/clouds.yaml"));

    candidates
        .into_iter()
        .find(|path| path.exists())
        .ok_or(OpenStackError::CloudsFileNotFound)
}
