//! Resource specs: declarations of desired resources

use crate::error::{ReconcileError, Result};
use crate::gateway::WaitConfig;
use crate::handle::ResourceKind;
use crate::reconciler::ReconciliationCache;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolved parameter mapping handed to a gateway
pub type Parameters = BTreeMap<String, String>;

/// Value substituted for references a dry run cannot resolve yet
pub const UNKNOWN_UNTIL_APPLY: &str = "(known after apply)";

/// Template body loaded from disk
///
/// The body is shared, so cloning a template is cheap.
#[derive(Clone, PartialEq, Eq)]
pub struct Template {
    path: PathBuf,
    body: Arc<[u8]>,
}

impl Template {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let body = std::fs::read(path).map_err(|source| ReconcileError::Template {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_bytes(path, body))
    }

    pub fn from_bytes(path: impl Into<PathBuf>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            body: Arc::from(body.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as text, if it is valid UTF-8
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("path", &self.path)
            .field("len", &self.body.len())
            .finish()
    }
}

/// Source of one parameter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterValue {
    Literal(String),
    /// `provider_id` of another spec's handle
    ProviderId { of: String },
    /// Stack output of another spec
    Output { of: String, key: String },
    /// Handle attribute of another spec
    Attribute { of: String, key: String },
}

impl ParameterValue {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn provider_id(of: impl Into<String>) -> Self {
        Self::ProviderId { of: of.into() }
    }

    pub fn output(of: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Output {
            of: of.into(),
            key: key.into(),
        }
    }

    pub fn attribute(of: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Attribute {
            of: of.into(),
            key: key.into(),
        }
    }

    /// The resource spec this value is read from, if any
    pub fn referenced_spec(&self) -> Option<&str> {
        match self {
            Self::Literal(_) => None,
            Self::ProviderId { of } | Self::Output { of, .. } | Self::Attribute { of, .. } => {
                Some(of)
            }
        }
    }
}

/// Per-stack provider settings
///
/// Unset fields fall back to the gateway's defaults. Tags are merged with the
/// defaults, the stack's own values winning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOverrides {
    /// e.g. `CAPABILITY_NAMED_IAM`
    pub capabilities: Option<Vec<String>>,
    pub tags: BTreeMap<String, String>,
    /// e.g. `AWS::S3::*`
    pub resource_types: Option<Vec<String>>,
}

impl StackOverrides {
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_none() && self.tags.is_empty() && self.resource_types.is_none()
    }
}

/// What to do when a deployed resource has drifted from its spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStrategy {
    /// Update the resource where it stands
    InPlace,
    /// Delete and recreate it
    Replace,
    /// Fetch-or-create only
    Never,
}

impl UpdateStrategy {
    pub fn default_for(kind: ResourceKind) -> Self {
        if kind.supports_drift() {
            UpdateStrategy::InPlace
        } else {
            UpdateStrategy::Never
        }
    }
}

/// Declaration of one desired resource
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    name: String,
    kind: ResourceKind,
    template: Option<Template>,
    parameters: BTreeMap<String, ParameterValue>,
    dependencies: Vec<String>,
    strategy: UpdateStrategy,
    external: bool,
    wait: Option<WaitConfig>,
    stack: StackOverrides,
}

impl ResourceSpec {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            template: None,
            parameters: BTreeMap::new(),
            dependencies: Vec::new(),
            strategy: UpdateStrategy::default_for(kind),
            external: false,
            wait: None,
            stack: StackOverrides::default(),
        }
    }

    pub fn stack(name: impl Into<String>, template: Template) -> Self {
        Self::new(ResourceKind::Stack, name).with_template(template)
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.template = Some(template);
        self
    }

    /// Adds a parameter; a reference to another spec also becomes a dependency
    pub fn with_parameter(mut self, key: impl Into<String>, value: ParameterValue) -> Self {
        if let Some(of) = value.referenced_spec() {
            let of = of.to_string();
            self = self.depends_on(of);
        }
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.dependencies.contains(&name) {
            self.dependencies.push(name);
        }
        self
    }

    pub fn with_strategy(mut self, strategy: UpdateStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Marks the resource as pre-existing: it is looked up but never created,
    /// updated or deleted
    pub fn external(mut self) -> Self {
        self.external = true;
        self
    }

    pub fn with_wait(mut self, wait: WaitConfig) -> Self {
        self.wait = Some(wait);
        self
    }

    pub fn with_stack_overrides(mut self, stack: StackOverrides) -> Self {
        self.stack = stack;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn template(&self) -> Option<&Template> {
        self.template.as_ref()
    }

    pub fn parameters(&self) -> &BTreeMap<String, ParameterValue> {
        &self.parameters
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn strategy(&self) -> UpdateStrategy {
        self.strategy
    }

    pub fn is_external(&self) -> bool {
        self.external
    }

    pub fn wait(&self) -> Option<&WaitConfig> {
        self.wait.as_ref()
    }

    pub fn stack_overrides(&self) -> &StackOverrides {
        &self.stack
    }

    /// Whether a drifted deployment can be detected and acted upon
    pub fn tracks_drift(&self) -> bool {
        self.kind.supports_drift()
            && self.strategy != UpdateStrategy::Never
            && self.template.is_some()
            && !self.external
    }

    /// Resolves parameter references against the handles reconciled so far
    ///
    /// With `dry_run`, references that cannot be resolved yet become
    /// [`UNKNOWN_UNTIL_APPLY`] instead of failing.
    pub fn resolve_parameters(
        &self,
        cache: &ReconciliationCache,
        dry_run: bool,
    ) -> Result<Parameters> {
        let mut resolved = Parameters::new();
        for (key, value) in &self.parameters {
            let text = match value {
                ParameterValue::Literal(text) => Some(text.clone()),
                ParameterValue::ProviderId { of } => cache
                    .handle(of)
                    .filter(|h| !h.is_planned())
                    .map(|h| h.provider_id().to_string()),
                ParameterValue::Output { of, key } => cache
                    .handle(of)
                    .and_then(|h| h.output(key))
                    .map(str::to_string),
                ParameterValue::Attribute { of, key } => cache
                    .handle(of)
                    .and_then(|h| h.attribute(key))
                    .map(str::to_string),
            };

            let text = match (text, value.referenced_spec()) {
                (Some(text), _) => text,
                (None, _) if dry_run => UNKNOWN_UNTIL_APPLY.to_string(),
                (None, dependency) => {
                    return Err(ReconcileError::MissingReference {
                        spec: self.name.clone(),
                        dependency: dependency.unwrap_or_default().to_string(),
                        what: describe_reference(value),
                    });
                }
            };
            resolved.insert(key.clone(), text);
        }
        Ok(resolved)
    }
}

fn describe_reference(value: &ParameterValue) -> String {
    match value {
        ParameterValue::Literal(_) => "a literal".to_string(),
        ParameterValue::ProviderId { .. } => "the provider id".to_string(),
        ParameterValue::Output { key, .. } => format!("output {}", key),
        ParameterValue::Attribute { key, .. } => format!("attribute {}", key),
    }
}
