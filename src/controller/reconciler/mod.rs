//! # Reconciler
//!
//! Replication engine for `ReplicationConfig` resources.
//!
//! The reconciler:
//! - Resolves base values from inline values, Secrets and ConfigMaps
//! - Selects namespaces and extracts their allow-listed override values
//! - Renders every resource template per namespace
//! - Creates or updates the rendered objects when their content changed
//! - Records the synchronized spec fingerprint in status
//!
//! All cluster access goes through the traits in [`cluster`].

pub mod apply;
pub mod cluster;
pub mod content;
pub mod error;
pub mod fingerprint;
pub mod namespaces;
pub mod reconcile;
pub mod status;
pub mod template;
pub mod types;
pub mod validation;
pub mod values;

pub use apply::{apply_resource, ApplyOutcome};
pub use cluster::{
    EventPublisher, KubeCluster, NamespaceLister, ReplicationEvent, ResourceClient, StatusWriter,
    ValueSourceReader,
};
pub use content::{needs_update, ContentFingerprint, ContentShape};
pub use error::{ClusterError, ReplicationError, ValidationError};
pub use namespaces::parse_selector;
pub use reconcile::{reconcile, ReconcileOutcome, SyncReport};
pub use status::{sync_gate, synced_status, SyncGate, SyncReason};
pub use template::{parse_resource, RenderMode, RenderedResource, TemplateEngine, TemplateError};
pub use types::{BackoffState, Collaborators, Reconciler};
pub use validation::{effective_sync_interval, validate_replication_config, validate_templates};
pub use values::{resolve_values, Resolution};
