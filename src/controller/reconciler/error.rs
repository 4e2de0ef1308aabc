//! # Errors
//!
//! Error taxonomy for replication passes, cluster access and admission validation.

use crate::constants::NAMESPACE_TERMINATING_MESSAGE;
use crate::crd::ValueSourceKind;
use std::time::Duration;
use thiserror::Error;

/// Failure talking to the cluster
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("namespace {0} is being terminated")]
    NamespaceTerminating(String),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("{0}")]
    Other(String),
}

impl ClusterError {
    /// Classify an API error returned while writing into `namespace`
    #[must_use]
    pub fn from_write(error: kube::Error, namespace: &str) -> Self {
        if error.to_string().contains(NAMESPACE_TERMINATING_MESSAGE) {
            ClusterError::NamespaceTerminating(namespace.to_string())
        } else {
            ClusterError::Kube(error)
        }
    }

    #[must_use]
    pub fn is_namespace_terminating(&self) -> bool {
        matches!(self, ClusterError::NamespaceTerminating(_))
    }
}

/// Failure during a replication pass
///
/// Fatal variants abort the pass before any write and are retried by the caller
/// with backoff. The rest are scoped to one resource or one value source.
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("invalid namespace selector: {0}")]
    SelectorParse(String),

    #[error("required value source {kind} {namespace}/{name} not found")]
    RequiredValueSourceMissing {
        kind: ValueSourceKind,
        namespace: String,
        name: String,
    },

    #[error("optional value source {kind} {namespace}/{name} unavailable: {reason}")]
    OptionalValueSourceMissing {
        kind: ValueSourceKind,
        namespace: String,
        name: String,
        reason: String,
    },

    #[error("reading value source {kind} {namespace}/{name}: {source}")]
    ValueSource {
        kind: ValueSourceKind,
        namespace: String,
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error("listing namespaces: {0}")]
    NamespaceList(#[source] ClusterError),

    #[error("rendering resource template {index}: {message}")]
    TemplateRender { index: usize, message: String },

    #[error("parsing rendered resource template {index}: {message}")]
    StructuralParse { index: usize, message: String },

    #[error("resource template {index} rendered without {field}")]
    InvalidResource { index: usize, field: &'static str },

    #[error("{kind} {namespace}/{name} has none of spec, data or stringData")]
    UnknownContentShape {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("applying {kind} {namespace}/{name}: {source}")]
    Apply {
        kind: String,
        namespace: String,
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error("updating status: {0}")]
    StatusUpdate(#[source] ClusterError),

    #[error("ReplicationConfig has no {0}")]
    MissingOwnerIdentity(&'static str),

    #[error("serializing spec: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("reconciliation timed out after {0:?}")]
    Timeout(Duration),
}

impl ReplicationError {
    /// Whether the error aborts the whole pass
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ReplicationError::OptionalValueSourceMissing { .. }
                | ReplicationError::TemplateRender { .. }
                | ReplicationError::StructuralParse { .. }
                | ReplicationError::InvalidResource { .. }
                | ReplicationError::UnknownContentShape { .. }
                | ReplicationError::Apply { .. }
        )
    }

    /// Apply failed because the target namespace is being deleted
    #[must_use]
    pub fn is_namespace_terminating(&self) -> bool {
        matches!(self, ReplicationError::Apply { source, .. } if source.is_namespace_terminating())
    }

    /// Event reason and metric label
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ReplicationError::SelectorParse(_) => "SelectorParse",
            ReplicationError::RequiredValueSourceMissing { .. } => "RequiredValueSourceMissing",
            ReplicationError::OptionalValueSourceMissing { .. } => "OptionalValueSourceMissing",
            ReplicationError::ValueSource { .. } => "ValueSource",
            ReplicationError::NamespaceList(_) => "NamespaceList",
            ReplicationError::TemplateRender { .. } => "TemplateRender",
            ReplicationError::StructuralParse { .. } => "StructuralParse",
            ReplicationError::InvalidResource { .. } => "InvalidResource",
            ReplicationError::UnknownContentShape { .. } => "UnknownContentShape",
            ReplicationError::Apply { .. } => "Apply",
            ReplicationError::StatusUpdate(_) => "StatusUpdate",
            ReplicationError::MissingOwnerIdentity(_) => "MissingOwnerIdentity",
            ReplicationError::Serialization(_) => "Serialization",
            ReplicationError::Timeout(_) => "Timeout",
        }
    }
}

/// Admission rejection for a ReplicationConfig
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("no resource templates declared")]
    NoResourceTemplates,

    #[error("resource template {0} is empty")]
    EmptyTemplate(usize),

    #[error("resource template {index} does not render: {message}")]
    Render { index: usize, message: String },

    #[error("resource template {index} renders without {field}")]
    MissingField { index: usize, field: &'static str },

    #[error("no value sources declared")]
    NoValueSources,

    #[error("required value source {kind} {namespace}/{name} does not exist")]
    MissingValueSource {
        kind: ValueSourceKind,
        namespace: String,
        name: String,
    },

    #[error("invalid namespace selector: {0}")]
    Selector(String),

    #[error("looking up value source: {0}")]
    Lookup(#[source] ClusterError),
}
