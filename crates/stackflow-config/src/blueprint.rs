//! Blueprint: the YAML declaration of one environment
//!
//! ```yaml
//! provider: { type: openstack, cloud: ovh }
//! prefix: seed
//! resources:
//!   - name: ext-net
//!     kind: network
//!     external: true
//!   - name: network
//!     kind: stack
//!     template: stacks/network.yaml
//!     parameters:
//!       external_network: { id_of: ext-net }
//! ```
//!
//! Relative paths are resolved against the blueprint's directory.

use crate::error::{ConfigError, Result};
use crate::settings::Settings;
use serde::Deserialize;
use stackflow_core::{
    DriftPolicy, ParameterValue, ResourceKind, ResourceSpec, SpecGraph, StackOverrides, Template,
    UpdateStrategy, WaitConfig,
};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Backend section of a blueprint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    Openstack {
        #[serde(default)]
        cloud: Option<String>,
    },
    Aws {
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        profile: Option<String>,
        /// e.g. `CAPABILITY_IAM`
        #[serde(default)]
        capabilities: Vec<String>,
        #[serde(default)]
        tags: BTreeMap<String, String>,
        #[serde(default)]
        resource_types: Vec<String>,
    },
}

/// Backend selection once settings and flags have been applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderTarget {
    OpenStack {
        cloud: String,
        key_dir: PathBuf,
    },
    Aws {
        region: Option<String>,
        profile: Option<String>,
        capabilities: Vec<String>,
        tags: BTreeMap<String, String>,
        resource_types: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    2
}

fn default_timeout() -> u64 {
    300
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_timeout(),
        }
    }
}

impl From<WaitSettings> for WaitConfig {
    fn from(wait: WaitSettings) -> Self {
        WaitConfig::new(
            Duration::from_secs(wait.poll_interval_secs),
            Duration::from_secs(wait.timeout_secs),
        )
    }
}

/// One entry of `parameters:`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParameterEntry {
    IdOf { id_of: String },
    OutputOf { output_of: String, key: String },
    AttributeOf { attribute_of: String, key: String },
    /// Contents of a file, read at load time
    File { file: PathBuf },
    Literal(serde_yaml::Value),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceEntry {
    pub name: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(default)]
    pub strategy: Option<UpdateStrategy>,
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterEntry>,
    /// Stack-only; replaces the provider's capabilities
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    /// Stack-only; merged over the provider's tags
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Stack-only; replaces the provider's resource types
    #[serde(default)]
    pub resource_types: Option<Vec<String>>,
}

impl ResourceEntry {
    fn stack_overrides(&self) -> StackOverrides {
        StackOverrides {
            capabilities: self.capabilities.clone(),
            tags: self.tags.clone(),
            resource_types: self.resource_types.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Blueprint {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub drift: DriftPolicy,
    #[serde(default)]
    pub wait: WaitSettings,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,

    /// Directory relative paths resolve against
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Blueprint {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let blueprint = Self::parse(&text, base_dir).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        tracing::debug!(
            path = %path.display(),
            resources = blueprint.resources.len(),
            "Loaded blueprint"
        );
        Ok(blueprint)
    }

    pub fn parse(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut blueprint: Blueprint =
            serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
                path: PathBuf::from("<blueprint>"),
                source,
            })?;
        blueprint.base_dir = base_dir.into();
        Ok(blueprint)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn wait_config(&self) -> WaitConfig {
        self.wait.into()
    }

    /// Merges the provider section with settings; settings win
    pub fn provider_target(&self, settings: &Settings) -> Result<ProviderTarget> {
        match &self.provider {
            ProviderConfig::Openstack { cloud } => {
                let cloud = settings.cloud.clone().or_else(|| cloud.clone()).ok_or_else(|| {
                    ConfigError::InvalidBlueprint(
                        "no OpenStack cloud configured; set provider.cloud, STACKFLOW_CLOUD or OS_CLOUD"
                            .to_string(),
                    )
                })?;
                Ok(ProviderTarget::OpenStack {
                    cloud,
                    key_dir: settings.key_dir()?,
                })
            }
            ProviderConfig::Aws {
                region,
                profile,
                capabilities,
                tags,
                resource_types,
            } => Ok(ProviderTarget::Aws {
                region: settings.region.clone().or_else(|| region.clone()),
                profile: settings.profile.clone().or_else(|| profile.clone()),
                capabilities: capabilities.clone(),
                tags: tags.clone(),
                resource_types: resource_types.clone(),
            }),
        }
    }

    /// Builds resource specs, reading every template and `file:` parameter
    ///
    /// Managed (non-external) names get `prefix-` prepended, and so does
    /// every reference to them. `prefix` overrides the blueprint's own.
    pub fn specs(&self, prefix: Option<&str>) -> Result<Vec<ResourceSpec>> {
        let prefix = prefix.or(self.prefix.as_deref()).filter(|p| !p.is_empty());
        let external: HashSet<&str> = self
            .resources
            .iter()
            .filter(|r| r.external)
            .map(|r| r.name.as_str())
            .collect();
        let full_name = |name: &str| match prefix {
            Some(prefix) if !external.contains(name) => format!("{}-{}", prefix, name),
            _ => name.to_string(),
        };

        let mut specs = Vec::with_capacity(self.resources.len());
        for entry in &self.resources {
            if entry.external && (entry.template.is_some() || !entry.parameters.is_empty()) {
                return Err(ConfigError::InvalidBlueprint(format!(
                    "{} is external and cannot have a template or parameters",
                    entry.name
                )));
            }

            let overrides = entry.stack_overrides();
            if !overrides.is_empty() && (entry.kind != ResourceKind::Stack || entry.external) {
                return Err(ConfigError::InvalidBlueprint(format!(
                    "{}: capabilities, tags and resource_types only apply to managed stacks",
                    entry.name
                )));
            }

            let mut spec = ResourceSpec::new(entry.kind, full_name(&entry.name))
                .with_stack_overrides(overrides);

            if let Some(template) = &entry.template {
                spec = spec.with_template(Template::load(self.base_dir.join(template))?);
            } else if entry.kind == ResourceKind::Stack && !entry.external {
                return Err(ConfigError::InvalidBlueprint(format!(
                    "stack {} needs a template",
                    entry.name
                )));
            }

            for dependency in &entry.depends_on {
                spec = spec.depends_on(full_name(dependency));
            }

            for (key, value) in &entry.parameters {
                let value = match value {
                    ParameterEntry::IdOf { id_of } => ParameterValue::provider_id(full_name(id_of)),
                    ParameterEntry::OutputOf { output_of, key } => {
                        ParameterValue::output(full_name(output_of), key.clone())
                    }
                    ParameterEntry::AttributeOf { attribute_of, key } => {
                        ParameterValue::attribute(full_name(attribute_of), key.clone())
                    }
                    ParameterEntry::File { file } => {
                        let path = self.base_dir.join(file);
                        let text = std::fs::read_to_string(&path)
                            .map_err(|source| ConfigError::ReadFile { path, source })?;
                        ParameterValue::literal(text)
                    }
                    ParameterEntry::Literal(value) => {
                        ParameterValue::literal(scalar(&entry.name, key, value)?)
                    }
                };
                spec = spec.with_parameter(key.clone(), value);
            }

            if let Some(strategy) = entry.strategy {
                spec = spec.with_strategy(strategy);
            }
            if entry.external {
                spec = spec.external();
            }
            if let Some(timeout_secs) = entry.timeout_secs {
                spec = spec.with_wait(WaitConfig::new(
                    Duration::from_secs(self.wait.poll_interval_secs),
                    Duration::from_secs(timeout_secs),
                ));
            }

            specs.push(spec);
        }
        Ok(specs)
    }

    /// Specs plus dependency validation
    pub fn graph(&self, prefix: Option<&str>) -> Result<SpecGraph> {
        Ok(SpecGraph::new(self.specs(prefix)?)?)
    }
}

fn scalar(resource: &str, key: &str, value: &serde_yaml::Value) -> Result<String> {
    match value {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ConfigError::InvalidBlueprint(format!(
            "{}: parameter {} must be a scalar or one of id_of, output_of, attribute_of, file",
            resource, key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackflow_core::ReconcileError;
    use std::fs;

    const SEED: &str = r#"
provider: { type: openstack, cloud: ovh }
prefix: seed
drift: warn
wait: { timeout_secs: 600 }
resources:
  - name: ext-net
    kind: network
    external: true
  - name: storage
    kind: stack
    template: stacks/storage.yaml
  - name: network
    kind: stack
    template: stacks/network.yaml
    parameters:
      external_network: { id_of: ext-net }
  - name: seed
    kind: keypair
  - name: deployment
    kind: stack
    template: stacks/deployment.yaml
    timeout_secs: 900
    parameters:
      seed_keypair: { attribute_of: seed, key: name }
      seed_network: { output_of: network, key: seed_network }
      seed_user_data: { file: cloud-config.yaml }
      flavor: s1-2
      count: 1
"#;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("stacks")).unwrap();
        for name in ["storage", "network", "deployment"] {
            fs::write(
                dir.path().join("stacks").join(format!("{}.yaml", name)),
                "heat_template_version: 2016-10-14\nresources: {}\n",
            )
            .unwrap();
        }
        fs::write(dir.path().join("cloud-config.yaml"), "#cloud-config\n").unwrap();
        fs::write(dir.path().join("stackflow.yaml"), SEED).unwrap();
        dir
    }

    #[test]
    fn test_load_blueprint() {
        let dir = project();
        let blueprint = Blueprint::load(&dir.path().join("stackflow.yaml")).unwrap();

        assert_eq!(blueprint.drift, DriftPolicy::Warn);
        assert_eq!(blueprint.wait.poll_interval_secs, 2);
        assert_eq!(blueprint.wait_config().timeout, Duration::from_secs(600));
        assert_eq!(blueprint.resources.len(), 5);
        assert_eq!(blueprint.base_dir(), dir.path());
    }

    #[test]
    fn test_specs_are_prefixed() {
        let dir = project();
        let blueprint = Blueprint::load(&dir.path().join("stackflow.yaml")).unwrap();
        let specs = blueprint.specs(None).unwrap();

        let names: Vec<&str> = specs.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec!["ext-net", "seed-storage", "seed-network", "seed-seed", "seed-deployment"]
        );

        let network = &specs[2];
        assert_eq!(network.dependencies(), ["ext-net"]);
        assert_eq!(
            network.parameters()["external_network"],
            ParameterValue::provider_id("ext-net")
        );

        let deployment = &specs[4];
        assert_eq!(deployment.dependencies(), ["seed-seed", "seed-network"]);
        assert_eq!(
            deployment.parameters()["seed_user_data"],
            ParameterValue::literal("#cloud-config\n")
        );
        assert_eq!(deployment.parameters()["count"], ParameterValue::literal("1"));
        assert_eq!(deployment.wait().map(|w| w.timeout), Some(Duration::from_secs(900)));
        assert!(specs[0].is_external());
    }

    #[test]
    fn test_prefix_override() {
        let dir = project();
        let blueprint = Blueprint::load(&dir.path().join("stackflow.yaml")).unwrap();
        let specs = blueprint.specs(Some("staging")).unwrap();
        assert_eq!(specs[1].name(), "staging-storage");
    }

    #[test]
    fn test_missing_template_is_an_error() {
        let dir = project();
        fs::remove_file(dir.path().join("stacks").join("network.yaml")).unwrap();

        let blueprint = Blueprint::load(&dir.path().join("stackflow.yaml")).unwrap();
        assert!(matches!(
            blueprint.specs(None),
            Err(ConfigError::Reconcile(ReconcileError::Template { .. }))
        ));
    }

    #[test]
    fn test_cycle_is_reported_by_graph() {
        let blueprint = Blueprint::parse(
            r#"
provider: { type: aws, region: eu-west-1 }
resources:
  - { name: a, kind: volume, depends_on: [b] }
  - { name: b, kind: volume, depends_on: [a] }
"#,
            ".",
        )
        .unwrap();

        let graph = blueprint.graph(None).unwrap();
        assert!(matches!(graph.plan(&[]), Err(ReconcileError::Cycle(_))));
    }

    #[test]
    fn test_rejects_bad_blueprints() {
        let unknown_key = "provider: { type: aws }\nresorces: []\n";
        assert!(matches!(Blueprint::parse(unknown_key, "."), Err(ConfigError::Parse { .. })));

        let stack_without_template = "provider: { type: aws }\nresources:\n  - { name: a, kind: stack }\n";
        let blueprint = Blueprint::parse(stack_without_template, ".").unwrap();
        assert!(matches!(blueprint.specs(None), Err(ConfigError::InvalidBlueprint(_))));

        let nested = "provider: { type: aws }\nresources:\n  - name: a\n    kind: volume\n    parameters:\n      size: [1, 2]\n";
        let blueprint = Blueprint::parse(nested, ".").unwrap();
        assert!(matches!(blueprint.specs(None), Err(ConfigError::InvalidBlueprint(_))));
    }

    #[test]
    fn test_per_stack_overrides() {
        let dir = project();
        let blueprint = Blueprint::parse(
            r#"
provider: { type: aws, capabilities: [CAPABILITY_IAM], tags: { owner: seed } }
resources:
  - name: storage
    kind: stack
    template: stacks/storage.yaml
    resource_types: ["AWS::S3::*"]
  - name: network
    kind: stack
    template: stacks/network.yaml
    capabilities: [CAPABILITY_NAMED_IAM]
    tags: { tier: network }
"#,
            dir.path(),
        )
        .unwrap();
        let specs = blueprint.specs(None).unwrap();

        let storage = specs[0].stack_overrides();
        assert_eq!(storage.resource_types, Some(vec!["AWS::S3::*".to_string()]));
        assert_eq!(storage.capabilities, None);

        let network = specs[1].stack_overrides();
        assert_eq!(network.capabilities, Some(vec!["CAPABILITY_NAMED_IAM".to_string()]));
        assert_eq!(network.tags["tier"], "network");

        let on_volume = "provider: { type: aws }\nresources:\n  - { name: a, kind: volume, capabilities: [CAPABILITY_IAM] }\n";
        let blueprint = Blueprint::parse(on_volume, ".").unwrap();
        assert!(matches!(blueprint.specs(None), Err(ConfigError::InvalidBlueprint(_))));
    }

    #[test]
    fn test_provider_target() {
        let blueprint = Blueprint::parse("provider: { type: openstack }\n", ".").unwrap();
        assert!(blueprint.provider_target(&Settings::default()).is_err());

        let settings = Settings {
            cloud: Some("ovh".into()),
            key_dir: Some(PathBuf::from("/tmp/keys")),
            ..Settings::default()
        };
        assert_eq!(
            blueprint.provider_target(&settings).unwrap(),
            ProviderTarget::OpenStack {
                cloud: "ovh".into(),
                key_dir: PathBuf::from("/tmp/keys"),
            }
        );

        let blueprint = Blueprint::parse(
            "provider:\n  type: aws\n  region: us-east-1\n  capabilities: [CAPABILITY_IAM]\n  tags: { team: infra }\n",
            ".",
        )
        .unwrap();
        match blueprint.provider_target(&Settings::default()).unwrap() {
            ProviderTarget::Aws {
                region,
                capabilities,
                tags,
                ..
            } => {
                assert_eq!(region.as_deref(), Some("us-east-1"));
                assert_eq!(capabilities, vec!["CAPABILITY_IAM".to_string()]);
                assert_eq!(tags["team"], "infra");
            }
            other => panic!("unexpected target {:?}", other),
        }
    }
}
