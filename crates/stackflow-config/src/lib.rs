pub mod blueprint;
pub mod error;
pub mod settings;

pub use blueprint::{Blueprint, ParameterEntry, ProviderConfig, ProviderTarget, ResourceEntry, WaitSettings};
pub use error::*;
pub use settings::Settings;

use std::path::PathBuf;

pub const BLUEPRINT_ENV: &str = "STACKFLOW_BLUEPRINT";

/// stackflow's configuration directory, created on first use
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("stackflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Locates the blueprint to use
///
/// Search order:
/// 1. `STACKFLOW_BLUEPRINT` (direct path)
/// 2. Current directory: stackflow.yaml, .stackflow.yaml
/// 3. ./.stackflow/stackflow.yaml
/// 4. ~/.config/stackflow/stackflow.yaml
pub fn find_blueprint() -> Result<PathBuf> {
    // 1. Explicit path
    if let Ok(path) = std::env::var(BLUEPRINT_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "{} points at a missing file", BLUEPRINT_ENV);
    }

    let current_dir = std::env::current_dir()?;

    // 2. Current directory
    for filename in ["stackflow.yaml", ".stackflow.yaml"] {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. ./.stackflow/
    let path = current_dir.join(".stackflow").join("stackflow.yaml");
    if path.exists() {
        return Ok(path);
    }

    // 4. Global
    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("stackflow").join("stackflow.yaml");
        if path.exists() {
            return Ok(path);
        }
    }

    Err(ConfigError::BlueprintNotFound)
}
