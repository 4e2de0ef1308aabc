//! # Value Resolution
//!
//! Builds the base value map for one ReplicationConfig: inline `values` first,
//! then every value source in declaration order, later keys overwriting earlier
//! ones.
//!
//! A missing or unreadable required source aborts resolution. Optional sources
//! are skipped and reported back so the caller can warn about them; they are
//! read again on the next pass.

use super::cluster::ValueSourceReader;
use super::error::ReplicationError;
use crate::crd::ReplicationConfigSpec;
use std::collections::BTreeMap;

/// Result of resolving base values
#[derive(Debug, Default)]
pub struct Resolution {
    pub values: BTreeMap<String, String>,
    /// Optional sources that could not be read this pass
    pub skipped: Vec<ReplicationError>,
}

/// Resolve the base values of `spec`
///
/// Sources without a `sourceNamespace` are read from `default_namespace`.
pub async fn resolve_values(
    reader: &dyn ValueSourceReader,
    spec: &ReplicationConfigSpec,
    default_namespace: &str,
) -> Result<Resolution, ReplicationError> {
    let mut resolution = Resolution {
        values: spec.values.clone(),
        skipped: Vec::new(),
    };

    for source in &spec.value_sources {
        let namespace = source.namespace_or(default_namespace);
        let outcome = reader.read(source, namespace).await;

        match (outcome, source.required) {
            (Ok(Some(data)), _) => resolution.values.extend(data),
            (Ok(None), true) => {
                return Err(ReplicationError::RequiredValueSourceMissing {
                    kind: source.kind,
                    namespace: namespace.to_string(),
                    name: source.name.clone(),
                });
            }
            (Err(e), true) => {
                return Err(ReplicationError::ValueSource {
                    kind: source.kind,
                    namespace: namespace.to_string(),
                    name: source.name.clone(),
                    source: e,
                });
            }
            (Ok(None), false) => resolution.skipped.push(optional_missing(
                source.kind,
                namespace,
                &source.name,
                "not found".to_string(),
            )),
            (Err(e), false) => resolution.skipped.push(optional_missing(
                source.kind,
                namespace,
                &source.name,
                e.to_string(),
            )),
        }
    }

    Ok(resolution)
}

fn optional_missing(
    kind: crate::crd::ValueSourceKind,
    namespace: &str,
    name: &str,
    reason: String,
) -> ReplicationError {
    ReplicationError::OptionalValueSourceMissing {
        kind,
        namespace: namespace.to_string(),
        name: name.to_string(),
        reason,
    }
}
