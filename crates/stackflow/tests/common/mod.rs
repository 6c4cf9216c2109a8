
use assert_cmd::{Command, cargo_bin_cmd};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A blueprint directory plus an isolated config home
pub struct TestProject {
    pub root: TempDir,
    config_home: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
            config_home: tempfile::tempdir().unwrap(),
        }
    }

    pub fn write_blueprint(&self, content: &str) {
        fs::write(self.root.path().join("stackflow.yaml"), content).unwrap();
    }

    pub fn write_template(&self, name: &str, content: &str) {
        let dir = self.root.path().join("stacks");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// `stackflow` running inside the project, unaffected by the caller's
    /// environment and config files
    pub fn command(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("stackflow");
        cmd.current_dir(self.root.path())
            .env("XDG_CONFIG_HOME", self.config_home.path())
            .env("HOME", self.config_home.path())
            .env_remove("STACKFLOW_BLUEPRINT")
            .env_remove("STACKFLOW_CLOUD")
            .env_remove("STACKFLOW_PREFIX")
            .env_remove("OS_CLOUD")
            .env_remove("OS_CLIENT_CONFIG_FILE")
            .env_remove("AWS_REGION")
            .env_remove("AWS_PROFILE")
            .env("NO_COLOR", "1");
        cmd
    }
}
