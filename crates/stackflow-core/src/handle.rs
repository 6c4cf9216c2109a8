//! Resource handles returned by provider gateways
//!
//! A [`ResourceHandle`] is a snapshot of one concrete provider resource. Handles
//! are never mutated once returned; the `with_*` builders consume the handle
//! and are meant for gateways assembling a fresh snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of resource a spec manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Stack,
    Network,
    Subnet,
    Router,
    Keypair,
    Volume,
    Container,
    Instance,
}

impl ResourceKind {
    /// Whether the deployed template of this kind can be read back and compared
    pub fn supports_drift(&self) -> bool {
        matches!(self, ResourceKind::Stack)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Stack => write!(f, "stack"),
            ResourceKind::Network => write!(f, "network"),
            ResourceKind::Subnet => write!(f, "subnet"),
            ResourceKind::Router => write!(f, "router"),
            ResourceKind::Keypair => write!(f, "keypair"),
            ResourceKind::Volume => write!(f, "volume"),
            ResourceKind::Container => write!(f, "container"),
            ResourceKind::Instance => write!(f, "instance"),
        }
    }
}

/// Normalised status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Being created, updated or deleted
    Pending,
    /// Usable
    Ready,
    /// A terminal failure (e.g. `CREATE_FAILED`)
    Failed,
    /// Gone
    Deleted,
}

impl ResourceStatus {
    /// Maps a CloudFormation or Heat stack status such as `CREATE_COMPLETE`
    ///
    /// `ROLLBACK_COMPLETE` is a create that was rolled back, so the stack is
    /// unusable. `UPDATE_ROLLBACK_COMPLETE` leaves the previous version running.
    pub fn from_stack_status(status: &str) -> Self {
        match status {
            "DELETE_COMPLETE" => ResourceStatus::Deleted,
            "ROLLBACK_COMPLETE" => ResourceStatus::Failed,
            s if s.ends_with("_IN_PROGRESS") => ResourceStatus::Pending,
            s if s.ends_with("_FAILED") => ResourceStatus::Failed,
            s if s.ends_with("_COMPLETE") => ResourceStatus::Ready,
            _ => ResourceStatus::Pending,
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceStatus::Pending => write!(f, "pending"),
            ResourceStatus::Ready => write!(f, "ready"),
            ResourceStatus::Failed => write!(f, "failed"),
            ResourceStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// Snapshot of one provider resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    kind: ResourceKind,
    name: String,
    provider_id: String,
    status: ResourceStatus,
    /// Raw backend status, e.g. `CREATE_COMPLETE`
    provider_status: String,
    attributes: BTreeMap<String, String>,
    outputs: BTreeMap<String, String>,
}

impl ResourceHandle {
    pub fn new(
        kind: ResourceKind,
        name: impl Into<String>,
        provider_id: impl Into<String>,
        status: ResourceStatus,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            provider_id: provider_id.into(),
            status,
            provider_status: status.to_string(),
            attributes: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Placeholder for a resource that a dry run would create
    pub fn planned(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::new(kind, name, "", ResourceStatus::Pending).with_provider_status("PLANNED")
    }

    pub fn with_provider_status(mut self, provider_status: impl Into<String>) -> Self {
        self.provider_status = provider_status.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    pub fn with_outputs<I, K, V>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.outputs
            .extend(outputs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// A new snapshot of the same resource in another status
    pub fn superseded(&self, status: ResourceStatus, provider_status: impl Into<String>) -> Self {
        Self {
            status,
            provider_status: provider_status.into(),
            ..self.clone()
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn status(&self) -> ResourceStatus {
        self.status
    }

    pub fn provider_status(&self) -> &str {
        &self.provider_status
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn outputs(&self) -> &BTreeMap<String, String> {
        &self.outputs
    }

    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }

    pub fn is_planned(&self) -> bool {
        self.provider_id.is_empty() && self.provider_status == "PLANNED"
    }

    /// Whether the resource failed before it ever became usable
    ///
    /// Only such a resource may be deleted and created again. A stack whose
    /// update or delete failed still holds live resources.
    pub fn failed_on_create(&self) -> bool {
        if self.status != ResourceStatus::Failed {
            return false;
        }
        match self.kind {
            ResourceKind::Stack => STACK_CREATE_FAILURES.contains(&self.provider_status.as_str()),
            _ => matches!(self.provider_status.to_ascii_lowercase().as_str(), "error" | "failed"),
        }
    }
}

/// Stack statuses left behind by a create that never produced a usable stack
const STACK_CREATE_FAILURES: &[&str] = &["CREATE_FAILED", "ROLLBACK_COMPLETE", "ROLLBACK_FAILED"];

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}, {})",
            self.kind, self.name, self.provider_id, self.provider_status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superseded_leaves_original_untouched() {
        let handle = ResourceHandle::new(ResourceKind::Stack, "seed-network", "s-1", ResourceStatus::Pending)
            .with_provider_status("CREATE_IN_PROGRESS")
            .with_output("seed_network", "net-1");

        let ready = handle.superseded(ResourceStatus::Ready, "CREATE_COMPLETE");

        assert_eq!(handle.status(), ResourceStatus::Pending);
        assert_eq!(ready.status(), ResourceStatus::Ready);
        assert_eq!(ready.provider_status(), "CREATE_COMPLETE");
        assert_eq!(ready.output("seed_network"), Some("net-1"));
        assert_eq!(ready.provider_id(), "s-1");
    }

    #[test]
    fn test_planned_handle() {
        let handle = ResourceHandle::planned(ResourceKind::Keypair, "seed");
        assert!(handle.is_planned());
        assert_eq!(handle.status(), ResourceStatus::Pending);
        assert!(!ResourceHandle::new(ResourceKind::Keypair, "seed", "seed", ResourceStatus::Ready).is_planned());
    }

    #[test]
    fn test_stack_status_mapping() {
        assert_eq!(ResourceStatus::from_stack_status("CREATE_IN_PROGRESS"), ResourceStatus::Pending);
        assert_eq!(ResourceStatus::from_stack_status("CREATE_COMPLETE"), ResourceStatus::Ready);
        assert_eq!(ResourceStatus::from_stack_status("UPDATE_COMPLETE"), ResourceStatus::Ready);
        assert_eq!(ResourceStatus::from_stack_status("UPDATE_ROLLBACK_COMPLETE"), ResourceStatus::Ready);
        assert_eq!(ResourceStatus::from_stack_status("CREATE_FAILED"), ResourceStatus::Failed);
        assert_eq!(ResourceStatus::from_stack_status("ROLLBACK_COMPLETE"), ResourceStatus::Failed);
        assert_eq!(ResourceStatus::from_stack_status("DELETE_COMPLETE"), ResourceStatus::Deleted);
        assert_eq!(ResourceStatus::from_stack_status("REVIEW_IN_PROGRESS"), ResourceStatus::Pending);
    }

    #[test]
    fn test_failed_on_create() {
        let stack = |status: &str| {
            ResourceHandle::new(ResourceKind::Stack, "seed-deployment", "s-1", ResourceStatus::from_stack_status(status))
                .with_provider_status(status)
        };
        assert!(stack("CREATE_FAILED").failed_on_create());
        assert!(stack("ROLLBACK_COMPLETE").failed_on_create());
        assert!(stack("ROLLBACK_FAILED").failed_on_create());
        assert!(!stack("UPDATE_FAILED").failed_on_create());
        assert!(!stack("UPDATE_ROLLBACK_FAILED").failed_on_create());
        assert!(!stack("DELETE_FAILED").failed_on_create());
        assert!(!stack("CREATE_COMPLETE").failed_on_create());

        let volume = |status: &str| {
            ResourceHandle::new(ResourceKind::Volume, "seed-volume", "v-1", ResourceStatus::Failed)
                .with_provider_status(status)
        };
        assert!(volume("error").failed_on_create());
        assert!(!volume("error_extending").failed_on_create());
    }

    #[test]
    fn test_kind_serde() {
        let kind: ResourceKind = serde_json::from_str("\"container\"").unwrap();
        assert_eq!(kind, ResourceKind::Container);
        assert_eq!(kind.to_string(), "container");
        assert!(ResourceKind::Stack.supports_drift());
        assert!(!ResourceKind::Volume.supports_drift());
    }
}
