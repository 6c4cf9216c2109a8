//! Dependency-ordered reconciliation and teardown

use crate::ensure::EnsureOptions;
use crate::error::{GatewayError, ReconcileError, Result, Step};
use crate::gateway::ProviderGateway;
use crate::graph::SpecGraph;
use crate::handle::{ResourceHandle, ResourceStatus};
use crate::outcome::{Action, ApplyReport, Outcome, TeardownFailure, TeardownReport};
use crate::spec::ResourceSpec;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Outcomes reconciled so far in one run, keyed by spec name
///
/// Guarantees each spec is reconciled at most once per run, however many
/// dependents it has.
#[derive(Debug, Default)]
pub struct ReconciliationCache {
    outcomes: HashMap<String, Outcome>,
}

impl ReconciliationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, outcome: Outcome) {
        self.outcomes.insert(outcome.spec.clone(), outcome);
    }

    pub fn get(&self, name: &str) -> Option<&Outcome> {
        self.outcomes.get(name)
    }

    pub fn handle(&self, name: &str) -> Option<&ResourceHandle> {
        self.get(name).map(|o| &o.handle)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.outcomes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Drives a [`SpecGraph`] against one provider gateway
pub struct Reconciler {
    gateway: Arc<dyn ProviderGateway>,
    options: EnsureOptions,
    span: tracing::Span,
    cancel: CancellationToken,
}

impl Reconciler {
    pub fn new(gateway: Arc<dyn ProviderGateway>) -> Self {
        Self {
            gateway,
            options: EnsureOptions::default(),
            span: tracing::Span::none(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: EnsureOptions) -> Self {
        self.options = options;
        self
    }

    /// Span every run is instrumented with
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &EnsureOptions {
        &self.options
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Reconciles `roots` and everything they depend on
    ///
    /// An empty `roots` reconciles the whole graph. The first error aborts
    /// the run.
    pub async fn apply(&self, graph: &SpecGraph, roots: &[&str]) -> Result<ApplyReport> {
        self.run_apply(graph, roots).instrument(self.span.clone()).await
    }

    async fn run_apply(&self, graph: &SpecGraph, roots: &[&str]) -> Result<ApplyReport> {
        let start = Instant::now();
        let order = graph.plan(roots)?;
        let mut cache = ReconciliationCache::new();

        tracing::info!(
            provider = self.gateway.name(),
            resources = order.len(),
            dry_run = self.options.dry_run,
            "Reconciling"
        );

        for spec in &order {
            self.check_cancelled(spec)?;
            if cache.contains(spec.name()) {
                continue;
            }

            let parameters = spec.resolve_parameters(&cache, self.options.dry_run)?;
            let outcome = spec
                .reconcile(self.gateway.as_ref(), &parameters, &self.options)
                .await?;

            tracing::info!(
                spec = spec.name(),
                kind = %spec.kind(),
                action = %outcome.action,
                provider_id = outcome.handle.provider_id(),
                "Reconciled"
            );
            cache.insert(outcome);
        }

        // Report in reconciliation order
        let outcomes = order
            .into_iter()
            .filter_map(|spec| cache.outcomes.remove(spec.name()))
            .collect();

        Ok(ApplyReport {
            outcomes,
            dry_run: self.options.dry_run,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Deletes `roots` and everything they depend on, dependents first
    ///
    /// A failed deletion does not abort the run: the specs it depends on are
    /// left in place and reported as blocked, other resources are still
    /// deleted. Only planning and cancellation return `Err`.
    pub async fn destroy(&self, graph: &SpecGraph, roots: &[&str]) -> Result<TeardownReport> {
        self.run_destroy(graph, roots).instrument(self.span.clone()).await
    }

    async fn run_destroy(&self, graph: &SpecGraph, roots: &[&str]) -> Result<TeardownReport> {
        let start = Instant::now();
        let mut order = graph.plan(roots)?;
        order.reverse();

        let mut report = TeardownReport::default();
        let mut blocked: HashSet<String> = HashSet::new();

        tracing::info!(
            provider = self.gateway.name(),
            resources = order.len(),
            dry_run = self.options.dry_run,
            "Tearing down"
        );

        for spec in order {
            self.check_cancelled(spec)?;

            if blocked.contains(spec.name()) {
                tracing::warn!(
                    spec = spec.name(),
                    kind = %spec.kind(),
                    "Not deleting, a dependent resource is still present"
                );
                report.blocked.push(spec.name().to_string());
                block_dependencies(graph, spec, &mut blocked);
                continue;
            }

            if spec.is_external() {
                tracing::debug!(spec = spec.name(), kind = %spec.kind(), "Skipping external resource");
                report.skipped.push(spec.name().to_string());
                continue;
            }

            match self.teardown(spec).await {
                Ok(outcome) => report.deleted.push(outcome),
                Err(error) => {
                    tracing::error!(
                        spec = spec.name(),
                        kind = %spec.kind(),
                        action = "delete",
                        "Teardown failed: {}",
                        error
                    );
                    block_dependencies(graph, spec, &mut blocked);
                    report.failed.push(TeardownFailure {
                        spec: spec.name().to_string(),
                        error,
                    });
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }

    async fn teardown(&self, spec: &ResourceSpec) -> Result<Outcome> {
        let gateway = self.gateway.as_ref();
        let error = |step, e| ReconcileError::gateway(spec.name(), spec.kind(), step, e);

        tracing::debug!(spec = spec.name(), kind = %spec.kind(), "Looking up resource");
        let Some(existing) = gateway
            .find(spec.kind(), spec.name())
            .await
            .map_err(|e| error(Step::Find, e))?
        else {
            tracing::debug!(spec = spec.name(), kind = %spec.kind(), "Already absent");
            let gone = ResourceHandle::new(spec.kind(), spec.name(), "", ResourceStatus::Deleted);
            return Ok(Outcome::new(spec.name(), Action::Deleted, gone));
        };

        if self.options.dry_run {
            return Ok(Outcome::new(spec.name(), Action::Deleted, existing));
        }

        tracing::info!(
            spec = spec.name(),
            kind = %spec.kind(),
            action = "delete",
            provider_id = existing.provider_id(),
            "Deleting resource"
        );
        gateway
            .delete(spec.kind(), spec.name())
            .await
            .map_err(|e| error(Step::Delete, e))?;

        let wait = spec.wait().copied().unwrap_or(self.options.wait);
        let deleting = existing.superseded(ResourceStatus::Pending, "DELETE_IN_PROGRESS");
        let handle = match gateway.await_status(&deleting, ResourceStatus::Deleted, &wait).await {
            Ok(handle) => handle,
            Err(GatewayError::NotFound(_)) => existing.superseded(ResourceStatus::Deleted, "DELETED"),
            Err(e) => return Err(error(Step::Wait, e)),
        };

        tracing::info!(
            spec = spec.name(),
            kind = %spec.kind(),
            action = "delete",
            provider_id = handle.provider_id(),
            "Resource deleted"
        );
        Ok(Outcome::new(spec.name(), Action::Deleted, handle))
    }

    fn check_cancelled(&self, next: &ResourceSpec) -> Result<()> {
        if self.cancel.is_cancelled() {
            tracing::warn!(spec = next.name(), "Cancelled");
            return Err(ReconcileError::Cancelled(next.name().to_string()));
        }
        Ok(())
    }
}

/// Marks everything `spec` depends on, transitively, as blocked
fn block_dependencies(graph: &SpecGraph, spec: &ResourceSpec, blocked: &mut HashSet<String>) {
    let mut stack: Vec<&str> = spec.dependencies().iter().map(String::as_str).collect();
    while let Some(name) = stack.pop() {
        if blocked.insert(name.to_string()) {
            if let Some(dependency) = graph.get(name) {
                stack.extend(dependency.dependencies().iter().map(String::as_str));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ResourceKind;

    #[test]
    fn test_cache_keeps_last_outcome_per_spec() {
        let mut cache = ReconciliationCache::new();
        let handle = ResourceHandle::new(ResourceKind::Container, "git-backups", "c-1", ResourceStatus::Ready);
        cache.insert(Outcome::new("git-backups", Action::Created, handle.clone()));
        cache.insert(Outcome::new("git-backups", Action::Unchanged, handle));

        assert_eq!(cache.len(), 1);
        assert!(cache.contains("git-backups"));
        assert_eq!(cache.get("git-backups").map(|o| o.action), Some(Action::Unchanged));
        assert_eq!(cache.handle("git-backups").map(|h| h.provider_id()), Some("c-1"));
        assert!(cache.handle("network").is_none());
    }

    #[test]
    fn test_block_dependencies_is_transitive() {
        let graph = SpecGraph::new(vec![
            ResourceSpec::new(ResourceKind::Stack, "attachment").depends_on("deployment"),
            ResourceSpec::new(ResourceKind::Stack, "deployment").depends_on("network"),
            ResourceSpec::new(ResourceKind::Stack, "network").depends_on("ext-net"),
            ResourceSpec::new(ResourceKind::Network, "ext-net").external(),
            ResourceSpec::new(ResourceKind::Stack, "storage"),
        ])
        .unwrap();

        let mut blocked = HashSet::new();
        block_dependencies(&graph, graph.get("deployment").unwrap(), &mut blocked);

        assert!(blocked.contains("network"));
        assert!(blocked.contains("ext-net"));
        assert!(!blocked.contains("storage"));
        assert!(!blocked.contains("attachment"));
    }
}
