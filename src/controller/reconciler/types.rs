//! # Types
//!
//! Reconciler context shared by every reconciliation.

use super::cluster::{
    EventPublisher, NamespaceLister, ResourceClient, StatusWriter, ValueSourceReader,
};
use super::template::{RenderMode, TemplateEngine};
use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Backoff state for one ReplicationConfig
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_minutes, max_minutes),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Cluster collaborators used by the reconciler
#[derive(Clone)]
pub struct Collaborators {
    pub namespaces: Arc<dyn NamespaceLister>,
    pub values: Arc<dyn ValueSourceReader>,
    pub resources: Arc<dyn ResourceClient>,
    pub status: Arc<dyn StatusWriter>,
    pub events: Arc<dyn EventPublisher>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

impl Collaborators {
    /// Use one implementation for every collaborator
    pub fn from_cluster<C>(cluster: Arc<C>) -> Self
    where
        C: NamespaceLister
            + ValueSourceReader
            + ResourceClient
            + StatusWriter
            + EventPublisher
            + 'static,
    {
        Self {
            namespaces: Arc::clone(&cluster) as Arc<dyn NamespaceLister>,
            values: Arc::clone(&cluster) as Arc<dyn ValueSourceReader>,
            resources: Arc::clone(&cluster) as Arc<dyn ResourceClient>,
            status: Arc::clone(&cluster) as Arc<dyn StatusWriter>,
            events: cluster,
        }
    }
}

pub struct Reconciler {
    pub(crate) cluster: Collaborators,
    pub(crate) engine: TemplateEngine,
    pub sync_interval: Duration,
    pub controller_namespace: String,
    pub reconcile_timeout: Duration,
    pub backoff_min_minutes: u64,
    pub backoff_max_minutes: u64,
    // Backoff state per ReplicationConfig name, driven by the error policy
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("sync_interval", &self.sync_interval)
            .field("controller_namespace", &self.controller_namespace)
            .field("reconcile_timeout", &self.reconcile_timeout)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(cluster: Collaborators, config: &ControllerConfig) -> Self {
        Self {
            cluster,
            engine: TemplateEngine::new(RenderMode::Strict),
            sync_interval: config.sync_interval(),
            controller_namespace: config.controller_namespace.clone(),
            reconcile_timeout: config.reconcile_timeout(),
            backoff_min_minutes: config.backoff_min_minutes,
            backoff_max_minutes: config.backoff_max_minutes,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn new_backoff_state(&self) -> BackoffState {
        BackoffState::new(self.backoff_min_minutes, self.backoff_max_minutes)
    }
}
