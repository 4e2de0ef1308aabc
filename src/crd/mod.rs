//! # Custom Resource Definitions
//!
//! CRD types for the replicator.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `ReplicationConfig` specification, selector, value sources and override policy
//! - `status.rs` - Status persisted after every successful synchronization

mod spec;
mod status;

pub use spec::{
    default_true, NamespaceOverridePolicy, ReplicationConfig, ReplicationConfigSpec, ValueSource,
    ValueSourceKind,
};
pub use status::ReplicationConfigStatus;
