//! # Apply
//!
//! Creates, updates or leaves alone one rendered resource.

use super::cluster::ResourceClient;
use super::content::{needs_update, unknown_shape, ContentShape};
use super::error::{ClusterError, ReplicationError};
use super::template::RenderedResource;
use tracing::debug;

/// What happened to one rendered resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
}

impl ApplyOutcome {
    /// Metric label
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyOutcome::Created => "created",
            ApplyOutcome::Updated => "updated",
            ApplyOutcome::Unchanged => "unchanged",
        }
    }
}

/// Bring the live object in line with `resource`
///
/// A resource without a recognized content shape fails before any call is made.
/// Updates carry the resource version of the object they replace.
pub async fn apply_resource(
    client: &dyn ResourceClient,
    resource: &RenderedResource,
) -> Result<ApplyOutcome, ReplicationError> {
    if ContentShape::classify(&resource.object.data).is_unknown() {
        return Err(unknown_shape(&resource.object));
    }

    let namespace = resource.namespace();
    let name = resource.name();
    let apply_error = |source: ClusterError| ReplicationError::Apply {
        kind: resource.gvk.kind.clone(),
        namespace: namespace.to_string(),
        name: name.to_string(),
        source,
    };

    let existing = client
        .get(&resource.gvk, namespace, name)
        .await
        .map_err(apply_error)?;

    let Some(existing) = existing else {
        client
            .create(&resource.gvk, &resource.object)
            .await
            .map_err(apply_error)?;
        debug!(kind = %resource.gvk.kind, namespace, name, "created resource");
        return Ok(ApplyOutcome::Created);
    };

    if !needs_update(&resource.object, &existing)? {
        debug!(kind = %resource.gvk.kind, namespace, name, "resource unchanged");
        return Ok(ApplyOutcome::Unchanged);
    }

    let mut desired = resource.object.clone();
    desired.metadata.resource_version = existing.metadata.resource_version.clone();
    client
        .update(&resource.gvk, &desired)
        .await
        .map_err(apply_error)?;
    debug!(kind = %resource.gvk.kind, namespace, name, "updated resource");
    Ok(ApplyOutcome::Updated)
}
