//! User settings (`~/.config/stackflow/config.yaml`)

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

pub const SETTINGS_FILE: &str = "config.yaml";

/// Per-user defaults shared by every blueprint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// OpenStack cloud name from `clouds.yaml`
    #[serde(default, alias = "os_cloud")]
    pub cloud: Option<String>,

    /// AWS region
    #[serde(default)]
    pub region: Option<String>,

    /// AWS shared-config profile
    #[serde(default)]
    pub profile: Option<String>,

    /// Name prefix for managed resources
    #[serde(default)]
    pub prefix: Option<String>,

    /// Where generated keypairs are written
    #[serde(default)]
    pub key_dir: Option<PathBuf>,

    /// Limit for a single provider API call
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
}

impl Settings {
    /// Default location of the settings file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stackflow").join(SETTINGS_FILE))
    }

    /// Loads the settings file, if there is one, then applies environment
    /// overrides
    pub fn load() -> Result<Self> {
        let settings = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        Ok(settings.with_env())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Applies `STACKFLOW_CLOUD` (or `OS_CLOUD`), `STACKFLOW_PREFIX`,
    /// `AWS_REGION` and `AWS_PROFILE`
    pub fn with_env(mut self) -> Self {
        if let Some(cloud) = env("STACKFLOW_CLOUD").or_else(|| env("OS_CLOUD")) {
            self.cloud = Some(cloud);
        }
        if let Some(prefix) = env("STACKFLOW_PREFIX") {
            self.prefix = Some(prefix);
        }
        if let Some(region) = env("AWS_REGION") {
            self.region = Some(region);
        }
        if let Some(profile) = env("AWS_PROFILE") {
            self.profile = Some(profile);
        }
        self
    }

    pub fn http_timeout(&self) -> Duration {
        self.http_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT)
    }

    /// Directory keypair files go to, falling back to
    /// `~/.config/stackflow/keys`
    pub fn key_dir(&self) -> Result<PathBuf> {
        match &self.key_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(crate::get_config_dir()?.join("keys")),
        }
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn clear_env() {
        for key in ["STACKFLOW_CLOUD", "OS_CLOUD", "STACKFLOW_PREFIX", "AWS_REGION", "AWS_PROFILE"] {
            unsafe {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn test_from_file_accepts_legacy_key() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "os_cloud: ovh\nprefix: seed\n").unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.cloud.as_deref(), Some("ovh"));
        assert_eq!(settings.prefix.as_deref(), Some("seed"));
        assert_eq!(settings.region, None);
    }

    #[test]
    fn test_from_file_rejects_unknown_keys() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "colud: ovh\n").unwrap();

        assert!(matches!(Settings::from_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_empty_file_is_default() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "\n").unwrap();

        assert_eq!(Settings::from_file(&path).unwrap(), Settings::default());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        unsafe {
            std::env::set_var("OS_CLOUD", "ovh");
            std::env::set_var("AWS_REGION", "eu-west-1");
        }

        let settings = Settings {
            cloud: Some("from-file".into()),
            ..Settings::default()
        }
        .with_env();
        assert_eq!(settings.cloud.as_deref(), Some("ovh"));
        assert_eq!(settings.region.as_deref(), Some("eu-west-1"));

        // STACKFLOW_CLOUD wins over OS_CLOUD
        unsafe {
            std::env::set_var("STACKFLOW_CLOUD", "infomaniak");
        }
        let settings = Settings::default().with_env();
        assert_eq!(settings.cloud.as_deref(), Some("infomaniak"));

        clear_env();
    }

    #[test]
    fn test_http_timeout() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "http_timeout_secs: 15\n").unwrap();

        assert_eq!(Settings::from_file(&path).unwrap().http_timeout(), Duration::from_secs(15));
        assert_eq!(Settings::default().http_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_explicit_key_dir() {
        let settings = Settings {
            key_dir: Some(PathBuf::from("/tmp/keys")),
            ..Settings::default()
        };
        assert_eq!(settings.key_dir().unwrap(), PathBuf::from("/tmp/keys"));
    }
}
