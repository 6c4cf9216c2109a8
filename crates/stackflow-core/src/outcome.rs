//! Reconciliation outcomes and run reports

use crate::error::ReconcileError;
use crate::handle::ResourceHandle;
use serde::Serialize;
use std::fmt;

/// What reconciliation did to one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Created,
    Updated,
    Replaced,
    Unchanged,
    Deleted,
}

impl Action {
    pub fn is_change(&self) -> bool {
        !matches!(self, Action::Unchanged)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Created => write!(f, "created"),
            Action::Updated => write!(f, "updated"),
            Action::Replaced => write!(f, "replaced"),
            Action::Unchanged => write!(f, "unchanged"),
            Action::Deleted => write!(f, "deleted"),
        }
    }
}

/// Result of reconciling one spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// Name of the resource spec
    pub spec: String,

    pub action: Action,

    pub handle: ResourceHandle,

    /// Unified diff between deployed and desired template, when drift was seen
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl Outcome {
    pub fn new(spec: impl Into<String>, action: Action, handle: ResourceHandle) -> Self {
        Self {
            spec: spec.into(),
            action,
            handle,
            diff: None,
        }
    }

    pub fn with_diff(mut self, diff: Option<String>) -> Self {
        self.diff = diff;
        self
    }
}

/// Outcomes of one `apply` run, in reconciliation order
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub outcomes: Vec<Outcome>,

    /// Whether nothing was actually changed
    pub dry_run: bool,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyReport {
    pub fn get(&self, spec: &str) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.spec == spec)
    }

    pub fn has_changes(&self) -> bool {
        self.outcomes.iter().any(|o| o.action.is_change())
    }

    pub fn summary(&self) -> ActionSummary {
        let mut summary = ActionSummary::default();
        for outcome in &self.outcomes {
            summary.add(outcome.action);
        }
        summary
    }
}

/// A spec whose deletion failed
#[derive(Debug)]
pub struct TeardownFailure {
    pub spec: String,
    pub error: ReconcileError,
}

/// Result of one `destroy` run
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Deleted (or already absent) resources, dependents first
    pub deleted: Vec<Outcome>,

    /// Specs whose deletion failed
    pub failed: Vec<TeardownFailure>,

    /// Specs left in place because something still depending on them failed to delete
    pub blocked: Vec<String>,

    /// External specs, never deleted
    pub skipped: Vec<String>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl TeardownReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }

    /// Position of a spec in the deletion sequence
    pub fn deletion_index(&self, spec: &str) -> Option<usize> {
        self.deleted.iter().position(|o| o.spec == spec)
    }
}

/// Count of outcomes per action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionSummary {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub unchanged: usize,
    pub deleted: usize,
}

impl ActionSummary {
    pub fn add(&mut self, action: Action) {
        match action {
            Action::Created => self.created += 1,
            Action::Updated => self.updated += 1,
            Action::Replaced => self.replaced += 1,
            Action::Unchanged => self.unchanged += 1,
            Action::Deleted => self.deleted += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.replaced + self.unchanged + self.deleted
    }
}

impl fmt::Display for ActionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} replaced, {} unchanged",
            self.created, self.updated, self.replaced, self.unchanged
        )?;
        if self.deleted > 0 {
            write!(f, ", {} deleted", self.deleted)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{ResourceKind, ResourceStatus};

    fn outcome(spec: &str, action: Action) -> Outcome {
        let handle = ResourceHandle::new(ResourceKind::Stack, spec, format!("id-{}", spec), ResourceStatus::Ready);
        Outcome::new(spec, action, handle)
    }

    #[test]
    fn test_summary() {
        let report = ApplyReport {
            outcomes: vec![
                outcome("storage", Action::Unchanged),
                outcome("network", Action::Created),
                outcome("deployment", Action::Updated),
                outcome("attachment", Action::Created),
            ],
            dry_run: false,
            duration_ms: 12,
        };

        let summary = report.summary();
        assert_eq!(summary.created, 2);
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.to_string(), "2 created, 1 updated, 0 replaced, 1 unchanged");
        assert!(report.has_changes());
        assert_eq!(report.get("network").map(|o| o.action), Some(Action::Created));
    }

    #[test]
    fn test_outcome_json_omits_empty_diff() {
        let json = serde_json::to_value(outcome("storage", Action::Unchanged)).unwrap();
        assert_eq!(json["action"], "unchanged");
        assert_eq!(json["handle"]["provider_id"], "id-storage");
        assert!(json.get("diff").is_none());
    }
}
