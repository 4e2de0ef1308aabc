//! # ReplicationConfig Status
//!
//! Status persisted after every successful synchronization.

use serde::{Deserialize, Serialize};

/// Status of the ReplicationConfig resource
///
/// Written only when a pass completes; the skip gate compares against it on
/// the next reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationConfigStatus {
    /// SHA-256 fingerprint of the spec that was last synchronized
    #[serde(default)]
    pub last_sync_fingerprint: Option<String>,
    /// Time of the last completed synchronization (RFC3339)
    #[serde(default)]
    pub last_sync_timestamp: Option<String>,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
}
