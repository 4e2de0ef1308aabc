//! Common test utilities for replication integration tests
//!
//! `FakeCluster` keeps namespaces, value sources and replicated objects in
//! memory and implements every collaborator trait, so the whole reconciler can
//! be driven without an API server.

#![allow(dead_code, reason = "Not every test binary uses every helper")]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::DynamicObject;
use kube::core::{GroupVersionKind, Selector, SelectorExt};
use replicator::config::ControllerConfig;
use replicator::controller::reconciler::{
    ClusterError, Collaborators, EventPublisher, NamespaceLister, Reconciler,
    ReplicationEvent, ResourceClient, StatusWriter, ValueSourceReader,
};
use replicator::crd::{ReplicationConfig, ReplicationConfigStatus, ValueSource, ValueSourceKind};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

type ObjectKey = (String, String, String);

/// Number of calls made against the fake, by operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub namespace_lists: usize,
    pub source_reads: usize,
    pub gets: usize,
    pub creates: usize,
    pub updates: usize,
    pub status_writes: usize,
    pub events: usize,
}

impl Calls {
    pub fn total(&self) -> usize {
        self.namespace_lists
            + self.source_reads
            + self.gets
            + self.creates
            + self.updates
            + self.status_writes
            + self.events
    }
}

#[derive(Debug, Default)]
struct State {
    namespaces: Vec<Namespace>,
    sources: BTreeMap<ObjectKey, BTreeMap<String, String>>,
    objects: BTreeMap<ObjectKey, DynamicObject>,
    rejecting_writes: BTreeSet<String>,
    status_writes: Vec<(String, ReplicationConfigStatus)>,
    events: Vec<ReplicationEvent>,
    calls: Calls,
    next_version: u64,
}

#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_namespace(&self, name: &str, labels: &[(&str, &str)], annotations: &[(&str, &str)]) {
        self.state().namespaces.push(namespace(
            json!({"name": name, "labels": pairs(labels), "annotations": pairs(annotations)}),
            None,
        ));
    }

    pub fn add_terminating_namespace(&self, name: &str, labels: &[(&str, &str)]) {
        self.state().namespaces.push(namespace(
            json!({"name": name, "labels": pairs(labels)}),
            Some("Terminating"),
        ));
    }

    /// Writes into `namespace` fail the way the API server rejects them during deletion
    pub fn reject_writes_in(&self, namespace: &str) {
        self.state().rejecting_writes.insert(namespace.to_string());
    }

    pub fn add_source(
        &self,
        kind: ValueSourceKind,
        namespace: &str,
        name: &str,
        data: &[(&str, &str)],
    ) {
        self.state().sources.insert(
            (kind.to_string(), namespace.to_string(), name.to_string()),
            data.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        );
    }

    pub fn object(&self, kind: &str, namespace: &str, name: &str) -> Option<DynamicObject> {
        self.state()
            .objects
            .get(&(kind.to_string(), namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }

    pub fn calls(&self) -> Calls {
        self.state().calls
    }

    pub fn events(&self) -> Vec<ReplicationEvent> {
        self.state().events.clone()
    }

    pub fn last_status(&self) -> Option<ReplicationConfigStatus> {
        self.state().status_writes.last().map(|(_, s)| s.clone())
    }
}

#[async_trait]
impl NamespaceLister for FakeCluster {
    async fn list_namespaces(&self, selector: &Selector) -> Result<Vec<Namespace>, ClusterError> {
        let mut state = self.state();
        state.calls.namespace_lists += 1;
        Ok(state
            .namespaces
            .iter()
            .filter(|ns| selector.matches(&ns.metadata.labels.clone().unwrap_or_default()))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ValueSourceReader for FakeCluster {
    async fn read(
        &self,
        source: &ValueSource,
        namespace: &str,
    ) -> Result<Option<BTreeMap<String, String>>, ClusterError> {
        let mut state = self.state();
        state.calls.source_reads += 1;
        Ok(state
            .sources
            .get(&(
                source.kind.to_string(),
                namespace.to_string(),
                source.name.clone(),
            ))
            .cloned())
    }
}

#[async_trait]
impl ResourceClient for FakeCluster {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, ClusterError> {
        let mut state = self.state();
        state.calls.gets += 1;
        Ok(state
            .objects
            .get(&(gvk.kind.clone(), namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create(&self, gvk: &GroupVersionKind, object: &DynamicObject) -> Result<(), ClusterError> {
        let mut state = self.state();
        state.calls.creates += 1;
        let key = object_key(gvk, object);
        if state.rejecting_writes.contains(&key.1) {
            return Err(ClusterError::NamespaceTerminating(key.1));
        }
        if state.objects.contains_key(&key) {
            return Err(ClusterError::Other(format!("{} {} already exists", key.0, key.2)));
        }
        let stored = persist(&mut state, object);
        state.objects.insert(key, stored);
        Ok(())
    }

    async fn update(&self, gvk: &GroupVersionKind, object: &DynamicObject) -> Result<(), ClusterError> {
        let mut state = self.state();
        state.calls.updates += 1;
        let key = object_key(gvk, object);
        if state.rejecting_writes.contains(&key.1) {
            return Err(ClusterError::NamespaceTerminating(key.1));
        }
        let Some(current) = state.objects.get(&key) else {
            return Err(ClusterError::NotFound {
                kind: key.0,
                namespace: key.1,
                name: key.2,
            });
        };
        if current.metadata.resource_version != object.metadata.resource_version {
            return Err(ClusterError::Other("conflict: resource version mismatch".into()));
        }
        let stored = persist(&mut state, object);
        state.objects.insert(key, stored);
        Ok(())
    }
}

#[async_trait]
impl StatusWriter for FakeCluster {
    async fn patch_status(
        &self,
        name: &str,
        status: &ReplicationConfigStatus,
    ) -> Result<(), ClusterError> {
        let mut state = self.state();
        state.calls.status_writes += 1;
        state.status_writes.push((name.to_string(), status.clone()));
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for FakeCluster {
    async fn publish(
        &self,
        _config: &ReplicationConfig,
        event: ReplicationEvent,
    ) -> Result<(), ClusterError> {
        let mut state = self.state();
        state.calls.events += 1;
        state.events.push(event);
        Ok(())
    }
}

fn object_key(gvk: &GroupVersionKind, object: &DynamicObject) -> ObjectKey {
    (
        gvk.kind.clone(),
        object.metadata.namespace.clone().unwrap_or_default(),
        object.metadata.name.clone().unwrap_or_default(),
    )
}

/// Store an object the way the API server would: `stringData` folded into `data`, new resource version
fn persist(state: &mut State, object: &DynamicObject) -> DynamicObject {
    state.next_version += 1;
    let mut stored = object.clone();
    stored.metadata.resource_version = Some(state.next_version.to_string());

    if let Some(Value::Object(string_data)) = stored.data.as_object_mut().and_then(|o| o.remove("stringData")) {
        let data = stored
            .data
            .as_object_mut()
            .map(|o| o.entry("data").or_insert_with(|| json!({})));
        if let Some(Value::Object(data)) = data {
            for (key, value) in string_data {
                let text = value.as_str().map_or_else(|| value.to_string(), str::to_string);
                data.insert(key, Value::String(STANDARD.encode(text)));
            }
        }
    }
    stored
}

fn pairs(entries: &[(&str, &str)]) -> Value {
    Value::Object(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect(),
    )
}

fn namespace(metadata: Value, phase: Option<&str>) -> Namespace {
    let mut value = json!({"metadata": metadata});
    if let Some(phase) = phase {
        value["status"] = json!({"phase": phase});
    }
    serde_json::from_value(value).unwrap()
}

/// A ReplicationConfig named `team-resources` with the given spec
pub fn replication_config(spec: Value) -> ReplicationConfig {
    serde_json::from_value(json!({
        "apiVersion": "nais.io/v1",
        "kind": "ReplicationConfig",
        "metadata": {"name": "team-resources", "uid": "0b4c7e1a", "generation": 1},
        "spec": spec,
    }))
    .unwrap()
}

/// Reconciler with default configuration over `cluster`
pub fn reconciler(cluster: &Arc<FakeCluster>) -> Reconciler {
    Reconciler::new(
        Collaborators::from_cluster(Arc::clone(cluster)),
        &ControllerConfig::default(),
    )
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn minutes_later(minutes: i64) -> DateTime<Utc> {
    base_time() + chrono::Duration::minutes(minutes)
}
