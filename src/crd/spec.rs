//! # ReplicationConfig Spec
//!
//! Main CRD specification types and default values.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// ReplicationConfig Custom Resource Definition
///
/// Declares a set of resource templates that are rendered and kept in sync in
/// every namespace matching `namespaceSelector`.
///
/// # Example
///
/// ```yaml
/// apiVersion: nais.io/v1
/// kind: ReplicationConfig
/// metadata:
///   name: team-resources
/// spec:
///   namespaceSelector:
///     matchExpressions:
///       - key: team
///         operator: Exists
///   valueSources:
///     - kind: Secret
///       name: replicator-values
///       sourceNamespace: nais-system
///   namespaceOverridePolicy:
///     allowedAnnotationKeys:
///       - replicator.nais.io/bucket
///   resourceTemplates:
///     - |
///       apiVersion: v1
///       kind: ConfigMap
///       metadata:
///         name: team-settings
///       data:
///         bucket: "{{ .bucket }}"
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "ReplicationConfig",
    group = "nais.io",
    version = "v1",
    status = "crate::crd::ReplicationConfigStatus",
    shortname = "repconf",
    printcolumn = r#"{"name":"Last Sync", "type":"string", "jsonPath":".status.lastSyncTimestamp"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationConfigSpec {
    /// Namespaces to replicate into
    /// An empty selector matches every namespace
    #[serde(default)]
    pub namespace_selector: LabelSelector,
    /// Inline literal values
    /// Lowest precedence: value sources and namespace overrides win on collision
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    /// Secrets and ConfigMaps whose keys become template values
    /// Later sources overwrite earlier ones on collision
    #[serde(default)]
    pub value_sources: Vec<ValueSource>,
    /// Namespace labels and annotations that may override values per namespace
    #[serde(default)]
    pub namespace_override_policy: NamespaceOverridePolicy,
    /// Resource templates, each rendering to exactly one Kubernetes object
    #[serde(default)]
    pub resource_templates: Vec<String>,
}

/// Reference to a Secret or ConfigMap providing template values
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValueSource {
    #[serde(default)]
    pub kind: ValueSourceKind,
    pub name: String,
    /// Namespace of the source
    /// Defaults to the namespace the controller runs in
    #[serde(default)]
    pub source_namespace: Option<String>,
    /// When false, a missing source is skipped with a warning and retried next pass
    #[serde(default = "default_true")]
    pub required: bool,
}

impl ValueSource {
    /// Namespace the source is read from
    #[must_use]
    pub fn namespace_or<'a>(&'a self, default_namespace: &'a str) -> &'a str {
        self.source_namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(default_namespace)
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema,
)]
pub enum ValueSourceKind {
    #[default]
    Secret,
    ConfigMap,
}

impl fmt::Display for ValueSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSourceKind::Secret => f.write_str("Secret"),
            ValueSourceKind::ConfigMap => f.write_str("ConfigMap"),
        }
    }
}

/// Allow-list of namespace metadata keys that may override values
///
/// Keys are matched exactly; the extracted value is exposed under the key with
/// any `prefix/` segment stripped (`replicator.nais.io/foo` becomes `foo`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceOverridePolicy {
    #[serde(default)]
    pub allowed_label_keys: Vec<String>,
    #[serde(default)]
    pub allowed_annotation_keys: Vec<String>,
}

/// Default value for boolean fields that default to true
pub fn default_true() -> bool {
    true
}
