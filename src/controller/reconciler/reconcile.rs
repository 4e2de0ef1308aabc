//! # Reconciliation
//!
//! One pass over one ReplicationConfig:
//!
//! 1. Fingerprint the spec and consult the skip gate.
//! 2. Parse the namespace selector and resolve base values. Failures here abort
//!    the pass before anything is written.
//! 3. For every matching namespace, merge its override values over the base
//!    values, render every template and apply the result.
//! 4. Persist the fingerprint and timestamp in status.
//!
//! Failures scoped to one resource are logged, counted and published as
//! warning events; the pass carries on with the next resource. Writes rejected
//! because the namespace is being deleted end that namespace silently.

use super::apply::{apply_resource, ApplyOutcome};
use super::cluster::ReplicationEvent;
use super::error::ReplicationError;
use super::fingerprint::fingerprint;
use super::namespaces::{is_terminating, merge_values, override_values, parse_selector};
use super::status::{sync_gate, synced_status, SyncGate};
use super::template::{RenderedResource, TemplateError};
use super::types::Reconciler;
use super::validation::effective_sync_interval;
use super::values::resolve_values;
use crate::crd::ReplicationConfig;
use crate::observability;
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use kube_runtime::controller::Action;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};

/// Counts for one completed pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub namespaces: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl SyncReport {
    fn record(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Created => self.created += 1,
            ApplyOutcome::Updated => self.updated += 1,
            ApplyOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Stopped at the skip gate, nothing was read or written
    Skipped { remaining: Duration },
    /// Full pass completed and status persisted
    Synced { report: SyncReport, interval: Duration },
}

/// Controller entry point
///
/// Runs one pass under the configured timeout and schedules the next one.
/// Errors are handed to the error policy, which owns retry backoff.
pub async fn reconcile(
    config: Arc<ReplicationConfig>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReplicationError> {
    let start = Instant::now();
    let name = config.metadata.name.clone().unwrap_or_default();
    let span = tracing::info_span!("reconcile", replication_config = %name);

    observability::metrics::increment_reconciliations();
    let result = tokio::time::timeout(ctx.reconcile_timeout, ctx.reconcile_at(&config, Utc::now()))
        .instrument(span)
        .await
        .unwrap_or(Err(ReplicationError::Timeout(ctx.reconcile_timeout)));
    observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    let outcome = result?;

    if let Ok(mut states) = ctx.backoff_states.lock() {
        if let Some(state) = states.get_mut(&name) {
            if state.error_count > 0 {
                info!(
                    replication_config = %name,
                    errors = state.error_count,
                    "backoff reset after successful pass"
                );
            }
            state.reset();
        }
    }

    match outcome {
        ReconcileOutcome::Skipped { remaining } => {
            observability::metrics::increment_requeues_total("skip-gate");
            Ok(Action::requeue(remaining))
        }
        ReconcileOutcome::Synced { report, interval } => {
            info!(
                replication_config = %name,
                namespaces = report.namespaces,
                created = report.created,
                updated = report.updated,
                unchanged = report.unchanged,
                failed = report.failed,
                duration_secs = start.elapsed().as_secs_f64(),
                "replication complete"
            );
            observability::metrics::increment_requeues_total("sync-interval");
            Ok(Action::requeue(interval))
        }
    }
}

impl Reconciler {
    /// Run one pass as of `now`
    pub async fn reconcile_at(
        &self,
        config: &ReplicationConfig,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, ReplicationError> {
        let name = config
            .metadata
            .name
            .as_deref()
            .ok_or(ReplicationError::MissingOwnerIdentity("name"))?;
        let owner = owner_reference(config)?;

        let interval = effective_sync_interval(config.metadata.annotations.as_ref(), self.sync_interval);
        let spec_fingerprint = fingerprint(&config.spec)?;

        match sync_gate(config.status.as_ref(), &spec_fingerprint, now, interval) {
            SyncGate::Skip { remaining } => {
                debug!(remaining_secs = remaining.as_secs(), "recently synchronized, skipping");
                observability::metrics::increment_reconciliations_skipped();
                return Ok(ReconcileOutcome::Skipped { remaining });
            }
            SyncGate::Sync(reason) => {
                info!(reason = reason.as_str(), "synchronizing");
            }
        }

        let spec = &config.spec;
        let selector = parse_selector(&spec.namespace_selector)?;
        let resolution =
            resolve_values(self.cluster.values.as_ref(), spec, &self.controller_namespace).await?;
        for skipped in resolution.skipped {
            warn!(error = %skipped, "optional value source skipped");
            self.publish_warning(config, &skipped).await;
        }

        let namespaces = self
            .cluster
            .namespaces
            .list_namespaces(&selector)
            .await
            .map_err(ReplicationError::NamespaceList)?;

        let mut report = SyncReport::default();
        for namespace in &namespaces {
            let Some(namespace_name) = namespace.metadata.name.as_deref() else {
                continue;
            };
            if is_terminating(namespace) {
                debug!(namespace = namespace_name, "namespace is terminating, skipping");
                continue;
            }
            report.namespaces += 1;

            let overrides = override_values(namespace, &spec.namespace_override_policy);
            let values = merge_values(&resolution.values, &overrides);

            for (index, template) in spec.resource_templates.iter().enumerate() {
                let result = match self.render(index, template, &values, namespace_name, &owner) {
                    Ok(resource) => apply_resource(self.cluster.resources.as_ref(), &resource).await,
                    Err(e) => Err(e),
                };

                match result {
                    Ok(outcome) => {
                        observability::metrics::increment_resources_applied(outcome.as_str());
                        report.record(outcome);
                    }
                    Err(e) if e.is_namespace_terminating() => {
                        debug!(namespace = namespace_name, "namespace is terminating, skipping");
                        break;
                    }
                    Err(e) => {
                        report.failed += 1;
                        observability::metrics::increment_resource_errors(e.reason());
                        warn!(namespace = namespace_name, template = index, error = %e, "failed to replicate resource");
                        self.publish_warning(config, &e).await;
                    }
                }
            }
        }

        let status = synced_status(spec_fingerprint, now, config.metadata.generation);
        self.cluster
            .status
            .patch_status(name, &status)
            .await
            .map_err(ReplicationError::StatusUpdate)?;

        Ok(ReconcileOutcome::Synced { report, interval })
    }

    /// Render template `index` for `namespace`, owned by the ReplicationConfig
    fn render(
        &self,
        index: usize,
        template: &str,
        values: &BTreeMap<String, String>,
        namespace: &str,
        owner: &OwnerReference,
    ) -> Result<RenderedResource, ReplicationError> {
        let mut resource = self
            .engine
            .render_resource(template, values)
            .map_err(|e| match e {
                TemplateError::Render(e) => ReplicationError::TemplateRender {
                    index,
                    message: e.to_string(),
                },
                TemplateError::MissingField(field) => {
                    ReplicationError::InvalidResource { index, field }
                }
                other => ReplicationError::StructuralParse {
                    index,
                    message: other.to_string(),
                },
            })?;

        resource.object.metadata.namespace = Some(namespace.to_string());
        resource.object.metadata.owner_references = Some(vec![owner.clone()]);
        Ok(resource)
    }

    async fn publish_warning(&self, config: &ReplicationConfig, error: &ReplicationError) {
        let event = ReplicationEvent::warning(error.reason(), error.to_string());
        if let Err(e) = self.cluster.events.publish(config, event).await {
            warn!(error = %e, "failed to publish event");
        }
    }
}

/// Non-controller owner reference so replicas are garbage collected with the config
fn owner_reference(config: &ReplicationConfig) -> Result<OwnerReference, ReplicationError> {
    Ok(OwnerReference {
        api_version: ReplicationConfig::api_version(&()).to_string(),
        kind: ReplicationConfig::kind(&()).to_string(),
        name: config
            .metadata
            .name
            .clone()
            .ok_or(ReplicationError::MissingOwnerIdentity("name"))?,
        uid: config
            .metadata
            .uid
            .clone()
            .ok_or(ReplicationError::MissingOwnerIdentity("uid"))?,
        ..OwnerReference::default()
    })
}
