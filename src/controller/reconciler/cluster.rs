//! # Cluster Access
//!
//! The reconciler talks to the cluster only through the traits below, so the
//! replication engine can be driven against mocks or an in-memory fake.
//! [`KubeCluster`] implements all of them on top of a `kube::Client`.

use super::error::ClusterError;
use crate::constants::{EVENT_REPORTER, FIELD_MANAGER};
use crate::crd::{ReplicationConfig, ReplicationConfigStatus, ValueSource, ValueSourceKind};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::core::{GroupVersionKind, Selector};
use kube::discovery::{ApiCapabilities, ApiResource, Scope};
use kube::{Client, Resource};
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Lists namespaces matching a selector
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NamespaceLister: Send + Sync {
    async fn list_namespaces(&self, selector: &Selector) -> Result<Vec<Namespace>, ClusterError>;
}

/// Reads the key/value payload of a Secret or ConfigMap
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ValueSourceReader: Send + Sync {
    /// Read `source` from `namespace`
    ///
    /// Returns `Ok(None)` when the object does not exist.
    async fn read(
        &self,
        source: &ValueSource,
        namespace: &str,
    ) -> Result<Option<BTreeMap<String, String>>, ClusterError>;
}

/// Generic object access keyed by group-version-kind, namespace and name
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, ClusterError>;

    async fn create(&self, gvk: &GroupVersionKind, object: &DynamicObject)
        -> Result<(), ClusterError>;

    /// Replace an existing object; `object` carries the resource version it was read at
    async fn update(&self, gvk: &GroupVersionKind, object: &DynamicObject)
        -> Result<(), ClusterError>;
}

/// Persists ReplicationConfig status
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusWriter: Send + Sync {
    async fn patch_status(
        &self,
        name: &str,
        status: &ReplicationConfigStatus,
    ) -> Result<(), ClusterError>;
}

/// Records events on a ReplicationConfig
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        config: &ReplicationConfig,
        event: ReplicationEvent,
    ) -> Result<(), ClusterError>;
}

/// Event recorded on a ReplicationConfig
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationEvent {
    pub warning: bool,
    pub reason: String,
    pub note: String,
    pub action: String,
}

impl ReplicationEvent {
    pub fn warning(reason: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            warning: true,
            reason: reason.into(),
            note: note.into(),
            action: "Replicate".to_string(),
        }
    }
}

/// Kubernetes-backed implementation of every cluster trait
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    recorder: Recorder,
    discovery: Arc<Mutex<HashMap<String, (ApiResource, ApiCapabilities)>>>,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client) -> Self {
        let recorder = Recorder::new(client.clone(), Reporter::from(EVENT_REPORTER));
        Self {
            client,
            recorder,
            discovery: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Resolve an API resource for a kind, cached for the life of the process
    async fn resolve(
        &self,
        gvk: &GroupVersionKind,
    ) -> Result<(ApiResource, ApiCapabilities), ClusterError> {
        let key = format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind);
        if let Some(found) = self
            .discovery
            .lock()
            .map_err(|e| ClusterError::Other(format!("discovery cache poisoned: {e}")))?
            .get(&key)
        {
            return Ok(found.clone());
        }

        let resolved = kube::discovery::pinned_kind(&self.client, gvk).await?;
        debug!(kind = %gvk.kind, plural = %resolved.0.plural, "resolved API resource");
        self.discovery
            .lock()
            .map_err(|e| ClusterError::Other(format!("discovery cache poisoned: {e}")))?
            .insert(key, resolved.clone());
        Ok(resolved)
    }

    async fn api(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
    ) -> Result<Api<DynamicObject>, ClusterError> {
        let (resource, capabilities) = self.resolve(gvk).await?;
        Ok(match capabilities.scope {
            Scope::Namespaced => Api::namespaced_with(self.client.clone(), namespace, &resource),
            Scope::Cluster => Api::all_with(self.client.clone(), &resource),
        })
    }
}

#[async_trait]
impl NamespaceLister for KubeCluster {
    async fn list_namespaces(&self, selector: &Selector) -> Result<Vec<Namespace>, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let params = if selector.selects_all() {
            ListParams::default()
        } else {
            ListParams::default().labels_from(selector)
        };
        Ok(api.list(&params).await?.items)
    }
}

#[async_trait]
impl ValueSourceReader for KubeCluster {
    async fn read(
        &self,
        source: &ValueSource,
        namespace: &str,
    ) -> Result<Option<BTreeMap<String, String>>, ClusterError> {
        match source.kind {
            ValueSourceKind::Secret => {
                let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
                Ok(api.get_opt(&source.name).await?.map(|secret| {
                    secret
                        .data
                        .unwrap_or_default()
                        .into_iter()
                        .map(|(k, v)| (k, String::from_utf8_lossy(&v.0).into_owned()))
                        .collect()
                }))
            }
            ValueSourceKind::ConfigMap => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
                Ok(api
                    .get_opt(&source.name)
                    .await?
                    .map(|config_map| config_map.data.unwrap_or_default()))
            }
        }
    }
}

#[async_trait]
impl ResourceClient for KubeCluster {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, ClusterError> {
        let api = self.api(gvk, namespace).await?;
        Ok(api.get_opt(name).await?)
    }

    async fn create(
        &self,
        gvk: &GroupVersionKind,
        object: &DynamicObject,
    ) -> Result<(), ClusterError> {
        let namespace = object.metadata.namespace.as_deref().unwrap_or_default();
        let api = self.api(gvk, namespace).await?;
        api.create(&PostParams::default(), object)
            .await
            .map_err(|e| ClusterError::from_write(e, namespace))?;
        Ok(())
    }

    async fn update(
        &self,
        gvk: &GroupVersionKind,
        object: &DynamicObject,
    ) -> Result<(), ClusterError> {
        let namespace = object.metadata.namespace.as_deref().unwrap_or_default();
        let name = object.metadata.name.as_deref().unwrap_or_default();
        let api = self.api(gvk, namespace).await?;
        api.replace(name, &PostParams::default(), object)
            .await
            .map_err(|e| ClusterError::from_write(e, namespace))?;
        Ok(())
    }
}

#[async_trait]
impl StatusWriter for KubeCluster {
    async fn patch_status(
        &self,
        name: &str,
        status: &ReplicationConfigStatus,
    ) -> Result<(), ClusterError> {
        let api: Api<ReplicationConfig> = Api::all(self.client.clone());
        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(serde_json::json!({ "status": status })),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for KubeCluster {
    async fn publish(
        &self,
        config: &ReplicationConfig,
        event: ReplicationEvent,
    ) -> Result<(), ClusterError> {
        let reference = config.object_ref(&());
        self.recorder
            .publish(
                &Event {
                    type_: if event.warning {
                        EventType::Warning
                    } else {
                        EventType::Normal
                    },
                    reason: event.reason,
                    note: Some(event.note),
                    action: event.action,
                    secondary: None,
                },
                &reference,
            )
            .await?;
        Ok(())
    }
}
