//! # Prelude
//!
//! Re-exports commonly used types so they can be brought into scope with
//! `use replicator::prelude::*;`.

// CRD types
pub use crate::crd::*;

// Reconciler types
pub use crate::controller::reconciler::{
    reconcile, BackoffState, ClusterError, Collaborators, KubeCluster, ReconcileOutcome,
    Reconciler, ReplicationError, SyncReport, ValidationError,
};

// Collaborator traits
pub use crate::controller::reconciler::{
    EventPublisher, NamespaceLister, ResourceClient, StatusWriter, ValueSourceReader,
};

pub use crate::config::ControllerConfig;
