//! Stackflow core
//!
//! Declarative reconciliation of cloud resources. A blueprint declares
//! [`ResourceSpec`]s; the [`Reconciler`] walks them in dependency order and
//! brings each one to its desired state through a [`ProviderGateway`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 stackflow CLI                    │
//! │          (apply / plan / destroy)                │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                stackflow-core                    │
//! │  ┌──────────────┐  ┌──────────────────────────┐ │
//! │  │  SpecGraph   │  │  Reconciler / ensure     │ │
//! │  │  (petgraph)  │  │  drift detection         │ │
//! │  └──────────────┘  └──────────────────────────┘ │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait ProviderGateway { ... }            │   │
//! │  └──────────────────────────────────────────┘   │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │   openstack   │ │      aws      │
//! │ (Heat, Nova,  │ │ (CloudForm-   │
//! │ Swift, ...)   │ │   ation)      │
//! └───────────────┘ └───────────────┘
//! ```

pub mod drift;
pub mod ensure;
pub mod error;
pub mod gateway;
pub mod graph;
pub mod handle;
pub mod outcome;
pub mod reconciler;
pub mod spec;

// Re-exports
pub use drift::{Drift, DriftPolicy};
pub use ensure::{EnsureOptions, ensure};
pub use error::{GatewayError, GatewayResult, ReconcileError, Result, Step};
pub use gateway::{DeployedTemplate, ProviderGateway, ResourceRequest, WaitConfig, poll_status};
pub use graph::SpecGraph;
pub use handle::{ResourceHandle, ResourceKind, ResourceStatus};
pub use outcome::{Action, ActionSummary, ApplyReport, Outcome, TeardownFailure, TeardownReport};
pub use reconciler::{ReconciliationCache, Reconciler};
pub use spec::{
    ParameterValue, Parameters, ResourceSpec, StackOverrides, Template, UNKNOWN_UNTIL_APPLY,
    UpdateStrategy,
};
