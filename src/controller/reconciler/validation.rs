//! # Validation
//!
//! Admission checks for ReplicationConfig resources and the per-object sync
//! interval override.
//!
//! Templates are rendered in lenient mode with no values, so undefined
//! variables become `<no value>` and only structural problems are rejected.

use super::cluster::ValueSourceReader;
use super::error::ValidationError;
use super::namespaces::parse_selector;
use super::template::{RenderMode, TemplateEngine, TemplateError};
use crate::constants::{MAX_INTERVAL_MINUTES, SYNC_INTERVAL_ANNOTATION};
use crate::crd::ReplicationConfigSpec;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

/// Check that every template renders to an object with apiVersion, kind and name
pub fn validate_templates(templates: &[String]) -> Result<(), ValidationError> {
    if templates.is_empty() {
        return Err(ValidationError::NoResourceTemplates);
    }

    let engine = TemplateEngine::new(RenderMode::Lenient);
    let no_values = BTreeMap::new();
    for (index, template) in templates.iter().enumerate() {
        if template.trim().is_empty() {
            return Err(ValidationError::EmptyTemplate(index));
        }
        match engine.render_resource(template, &no_values) {
            Ok(_) => {}
            Err(TemplateError::MissingField(field)) => {
                return Err(ValidationError::MissingField { index, field });
            }
            Err(e) => {
                return Err(ValidationError::Render {
                    index,
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Full admission check of a ReplicationConfig spec
///
/// Required value sources must exist at admission time; optional ones are not
/// looked up.
pub async fn validate_replication_config(
    spec: &ReplicationConfigSpec,
    reader: &dyn ValueSourceReader,
    default_namespace: &str,
) -> Result<(), ValidationError> {
    validate_templates(&spec.resource_templates)?;

    if spec.value_sources.is_empty() {
        return Err(ValidationError::NoValueSources);
    }

    parse_selector(&spec.namespace_selector)
        .map_err(|e| ValidationError::Selector(e.to_string()))?;

    for source in spec.value_sources.iter().filter(|s| s.required) {
        let namespace = source.namespace_or(default_namespace);
        if reader
            .read(source, namespace)
            .await
            .map_err(ValidationError::Lookup)?
            .is_none()
        {
            return Err(ValidationError::MissingValueSource {
                kind: source.kind,
                namespace: namespace.to_string(),
                name: source.name.clone(),
            });
        }
    }
    Ok(())
}

/// Sync interval for one ReplicationConfig
///
/// The `replicator.nais.io/syncInterval` annotation (whole minutes) may only
/// lengthen the configured interval, and never beyond one week.
#[must_use]
pub fn effective_sync_interval(
    annotations: Option<&BTreeMap<String, String>>,
    default_interval: Duration,
) -> Duration {
    let Some(raw) = annotations.and_then(|a| a.get(SYNC_INTERVAL_ANNOTATION)) else {
        return default_interval;
    };

    match raw.trim().parse::<u64>() {
        Ok(minutes) if minutes > MAX_INTERVAL_MINUTES => {
            warn!(
                annotation = SYNC_INTERVAL_ANNOTATION,
                minutes,
                max_minutes = MAX_INTERVAL_MINUTES,
                "sync interval longer than the maximum, using the maximum"
            );
            Duration::from_secs(MAX_INTERVAL_MINUTES * 60).max(default_interval)
        }
        Ok(minutes) if Duration::from_secs(minutes * 60) >= default_interval => {
            Duration::from_secs(minutes * 60)
        }
        Ok(minutes) => {
            warn!(
                annotation = SYNC_INTERVAL_ANNOTATION,
                minutes,
                default_secs = default_interval.as_secs(),
                "sync interval shorter than the configured interval, using the configured interval"
            );
            default_interval
        }
        Err(_) => {
            warn!(
                annotation = SYNC_INTERVAL_ANNOTATION,
                value = %raw,
                "sync interval is not a whole number of minutes, using the configured interval"
            );
            default_interval
        }
    }
}
