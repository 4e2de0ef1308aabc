//! # Reconciliation Integration Tests
//!
//! Drives full replication passes against an in-memory cluster.
//!
//! These tests verify:
//! - Base values and per-namespace overrides reach the rendered resources
//! - Repeated passes converge without further writes
//! - The skip gate and the sync interval
//! - Resource-scoped failures never abort the pass
//! - Fatal failures abort before anything is written

mod common;

use base64::{engine::general_purpose::STANDARD, Engine};
use common::{base_time, minutes_later, reconciler, replication_config, FakeCluster};
use replicator::controller::reconciler::{ReconcileOutcome, ReplicationError, SyncReport};
use replicator::crd::{ReplicationConfig, ValueSourceKind};
use serde_json::json;
use std::time::Duration;

const SETTINGS_TEMPLATE: &str = r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
  labels:
    app.kubernetes.io/managed-by: replicator
data:
  foo: "{{ .foo }}"
"#;

const SECRET_TEMPLATE: &str = r#"apiVersion: v1
kind: Secret
metadata:
  name: credentials
type: Opaque
stringData:
  password: "{{ .password }}"
"#;

const ROLE_TEMPLATE: &str = r#"apiVersion: rbac.authorization.k8s.io/v1
kind: Role
metadata:
  name: reader
rules:
  - apiGroups: [""]
    resources: ["pods"]
    verbs: ["get"]
"#;

/// Two teams, the second overriding `foo` through an allow-listed annotation
fn two_team_cluster() -> std::sync::Arc<FakeCluster> {
    let cluster = FakeCluster::new();
    cluster.add_namespace("team-a", &[("team", "a")], &[]);
    cluster.add_namespace(
        "team-b",
        &[("team", "b")],
        &[("replicator.nais.io/foo", "baz")],
    );
    cluster.add_namespace("kube-system", &[], &[]);
    cluster.add_source(
        ValueSourceKind::Secret,
        "nais-system",
        "replicator-values",
        &[("foo", "bar"), ("password", "hunter2")],
    );
    cluster
}

fn team_config(templates: &[&str]) -> ReplicationConfig {
    replication_config(json!({
        "namespaceSelector": {
            "matchExpressions": [{"key": "team", "operator": "Exists"}]
        },
        "valueSources": [{"kind": "Secret", "name": "replicator-values"}],
        "namespaceOverridePolicy": {
            "allowedAnnotationKeys": ["replicator.nais.io/foo"]
        },
        "resourceTemplates": templates,
    }))
}

fn synced_report(outcome: ReconcileOutcome) -> SyncReport {
    match outcome {
        ReconcileOutcome::Synced { report, .. } => report,
        ReconcileOutcome::Skipped { .. } => panic!("expected a full pass, got {outcome:?}"),
    }
}

fn config_value(cluster: &FakeCluster, namespace: &str, key: &str) -> Option<String> {
    cluster
        .object("ConfigMap", namespace, "settings")
        .and_then(|o| o.data["data"][key].as_str().map(str::to_string))
}

#[tokio::test]
async fn test_overrides_are_applied_per_namespace() {
    let cluster = two_team_cluster();
    let config = team_config(&[SETTINGS_TEMPLATE]);

    let report = synced_report(
        reconciler(&cluster)
            .reconcile_at(&config, base_time())
            .await
            .unwrap(),
    );

    assert_eq!(report.namespaces, 2);
    assert_eq!(report.created, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(config_value(&cluster, "team-a", "foo").as_deref(), Some("bar"));
    assert_eq!(config_value(&cluster, "team-b", "foo").as_deref(), Some("baz"));
    assert!(cluster.object("ConfigMap", "kube-system", "settings").is_none());
}

#[tokio::test]
async fn test_replicas_are_owned_by_the_config() {
    let cluster = two_team_cluster();
    let config = team_config(&[SETTINGS_TEMPLATE]);

    reconciler(&cluster)
        .reconcile_at(&config, base_time())
        .await
        .unwrap();

    let replica = cluster.object("ConfigMap", "team-a", "settings").unwrap();
    let owners = replica.metadata.owner_references.unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].kind, "ReplicationConfig");
    assert_eq!(owners[0].api_version, "nais.io/v1");
    assert_eq!(owners[0].name, "team-resources");
    assert_eq!(owners[0].uid, "0b4c7e1a");
    assert_eq!(
        replica
            .metadata
            .labels
            .unwrap()
            .get("app.kubernetes.io/managed-by")
            .map(String::as_str),
        Some("replicator")
    );
}

#[tokio::test]
async fn test_status_records_fingerprint_and_timestamp() {
    let cluster = two_team_cluster();
    let config = team_config(&[SETTINGS_TEMPLATE]);

    reconciler(&cluster)
        .reconcile_at(&config, base_time())
        .await
        .unwrap();

    let status = cluster.last_status().unwrap();
    assert_eq!(
        status.last_sync_timestamp.as_deref(),
        Some("2024-05-01T12:00:00Z")
    );
    assert_eq!(status.observed_generation, Some(1));
    let fingerprint = status.last_sync_fingerprint.unwrap();
    assert!(!fingerprint.is_empty());
    assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn test_second_pass_converges_without_writes() {
    let cluster = two_team_cluster();
    let reconciler = reconciler(&cluster);
    let mut config = team_config(&[SETTINGS_TEMPLATE, SECRET_TEMPLATE]);

    let first = synced_report(reconciler.reconcile_at(&config, base_time()).await.unwrap());
    assert_eq!(first.created, 4);

    let stored = cluster.object("Secret", "team-a", "credentials").unwrap();
    assert_eq!(
        stored.data["data"]["password"].as_str(),
        Some(STANDARD.encode("hunter2").as_str())
    );

    // Interval elapsed: a full pass runs but finds nothing to change
    config.status = cluster.last_status();
    let before = cluster.calls();
    let second = synced_report(reconciler.reconcile_at(&config, minutes_later(16)).await.unwrap());

    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.unchanged, 4);
    let after = cluster.calls();
    assert_eq!(after.creates, before.creates);
    assert_eq!(after.updates, before.updates);
    assert_eq!(after.status_writes, before.status_writes + 1);
}

#[tokio::test]
async fn test_changed_values_update_replicas() {
    let cluster = two_team_cluster();
    let reconciler = reconciler(&cluster);
    let mut config = team_config(&[SETTINGS_TEMPLATE]);

    reconciler.reconcile_at(&config, base_time()).await.unwrap();

    cluster.add_source(
        ValueSourceKind::Secret,
        "nais-system",
        "replicator-values",
        &[("foo", "qux")],
    );
    config.status = None;
    let report = synced_report(reconciler.reconcile_at(&config, minutes_later(1)).await.unwrap());

    // team-b keeps its override, only team-a changes
    assert_eq!(report.updated, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(config_value(&cluster, "team-a", "foo").as_deref(), Some("qux"));
    assert_eq!(config_value(&cluster, "team-b", "foo").as_deref(), Some("baz"));
}

#[tokio::test]
async fn test_recent_sync_is_skipped_without_calls() {
    let cluster = two_team_cluster();
    let reconciler = reconciler(&cluster);
    let mut config = team_config(&[SETTINGS_TEMPLATE]);

    reconciler.reconcile_at(&config, base_time()).await.unwrap();
    config.status = cluster.last_status();

    let before = cluster.calls();
    let outcome = reconciler.reconcile_at(&config, minutes_later(5)).await.unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::Skipped {
            remaining: Duration::from_secs(10 * 60)
        }
    );
    assert_eq!(cluster.calls(), before);
}

#[tokio::test]
async fn test_spec_change_bypasses_skip_gate() {
    let cluster = two_team_cluster();
    let reconciler = reconciler(&cluster);
    let mut config = team_config(&[SETTINGS_TEMPLATE]);

    reconciler.reconcile_at(&config, base_time()).await.unwrap();
    config.status = cluster.last_status();
    config.spec.values.insert("extra".to_string(), "1".to_string());

    let outcome = reconciler.reconcile_at(&config, minutes_later(1)).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Synced { .. }));
}

#[tokio::test]
async fn test_sync_interval_annotation() {
    let cluster = two_team_cluster();
    let reconciler = reconciler(&cluster);
    let mut config = team_config(&[SETTINGS_TEMPLATE]);
    config.metadata.annotations = Some(
        [(
            "replicator.nais.io/syncInterval".to_string(),
            "30".to_string(),
        )]
        .into(),
    );

    let outcome = reconciler.reconcile_at(&config, base_time()).await.unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Synced { interval, .. } if interval == Duration::from_secs(30 * 60)
    ));

    config.status = cluster.last_status();
    let outcome = reconciler.reconcile_at(&config, minutes_later(20)).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Skipped { .. }));
}

#[tokio::test]
async fn test_unknown_shape_does_not_abort_pass() {
    let cluster = two_team_cluster();
    let config = team_config(&[ROLE_TEMPLATE, SETTINGS_TEMPLATE]);

    let report = synced_report(
        reconciler(&cluster)
            .reconcile_at(&config, base_time())
            .await
            .unwrap(),
    );

    assert_eq!(report.failed, 2);
    assert_eq!(report.created, 2);
    assert!(cluster.object("Role", "team-a", "reader").is_none());
    assert!(cluster.last_status().is_some());

    let events = cluster.events();
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|e| e.warning && e.reason == "UnknownContentShape"));
}

#[tokio::test]
async fn test_undefined_variable_fails_only_that_resource() {
    let cluster = two_team_cluster();
    let broken = SETTINGS_TEMPLATE.replace("{{ .foo }}", "{{ .nope }}");
    let config = team_config(&[&broken, SECRET_TEMPLATE]);

    let report = synced_report(
        reconciler(&cluster)
            .reconcile_at(&config, base_time())
            .await
            .unwrap(),
    );

    assert_eq!(report.failed, 2);
    assert_eq!(report.created, 2);
    assert!(cluster
        .events()
        .iter()
        .all(|e| e.reason == "TemplateRender"));
}

#[tokio::test]
async fn test_missing_required_source_aborts_before_writes() {
    let cluster = FakeCluster::new();
    cluster.add_namespace("team-a", &[("team", "a")], &[]);
    let config = team_config(&[SETTINGS_TEMPLATE]);

    let err = reconciler(&cluster)
        .reconcile_at(&config, base_time())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReplicationError::RequiredValueSourceMissing { ref name, .. } if name == "replicator-values"
    ));
    assert!(err.is_fatal());
    let calls = cluster.calls();
    assert_eq!(calls.namespace_lists, 0);
    assert_eq!(calls.creates, 0);
    assert_eq!(calls.status_writes, 0);
    assert_eq!(cluster.object_count(), 0);
}

#[tokio::test]
async fn test_missing_optional_source_is_reported_and_skipped() {
    let cluster = FakeCluster::new();
    cluster.add_namespace("team-a", &[], &[]);
    let config = replication_config(json!({
        "values": {"foo": "inline"},
        "valueSources": [{"kind": "ConfigMap", "name": "extra-values", "required": false}],
        "resourceTemplates": [SETTINGS_TEMPLATE],
    }));

    let report = synced_report(
        reconciler(&cluster)
            .reconcile_at(&config, base_time())
            .await
            .unwrap(),
    );

    assert_eq!(report.created, 1);
    assert_eq!(config_value(&cluster, "team-a", "foo").as_deref(), Some("inline"));
    let events = cluster.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, "OptionalValueSourceMissing");
    assert!(events[0].note.contains("extra-values"));
}

#[tokio::test]
async fn test_value_sources_overwrite_in_order() {
    let cluster = FakeCluster::new();
    cluster.add_namespace("team-a", &[], &[]);
    cluster.add_source(ValueSourceKind::Secret, "nais-system", "first", &[("foo", "one")]);
    cluster.add_source(ValueSourceKind::ConfigMap, "shared", "second", &[("foo", "two")]);
    let config = replication_config(json!({
        "values": {"foo": "inline"},
        "valueSources": [
            {"kind": "Secret", "name": "first"},
            {"kind": "ConfigMap", "name": "second", "sourceNamespace": "shared"}
        ],
        "resourceTemplates": [SETTINGS_TEMPLATE],
    }));

    reconciler(&cluster)
        .reconcile_at(&config, base_time())
        .await
        .unwrap();

    assert_eq!(config_value(&cluster, "team-a", "foo").as_deref(), Some("two"));
}

#[tokio::test]
async fn test_terminating_namespaces_are_left_alone() {
    let cluster = two_team_cluster();
    cluster.add_terminating_namespace("team-c", &[("team", "c")]);
    cluster.reject_writes_in("team-b");
    let config = team_config(&[SETTINGS_TEMPLATE, SECRET_TEMPLATE]);

    let report = synced_report(
        reconciler(&cluster)
            .reconcile_at(&config, base_time())
            .await
            .unwrap(),
    );

    // team-c is filtered out, team-b rejects its first write and is abandoned
    assert_eq!(report.namespaces, 2);
    assert_eq!(report.created, 2);
    assert_eq!(report.failed, 0);
    assert!(cluster.events().is_empty());
    assert!(cluster.object("ConfigMap", "team-c", "settings").is_none());
    assert!(cluster.object("Secret", "team-b", "credentials").is_none());
    assert_eq!(cluster.calls().creates, 3);
    assert!(cluster.last_status().is_some());
}

#[tokio::test]
async fn test_empty_selector_matches_every_namespace() {
    let cluster = two_team_cluster();
    let config = replication_config(json!({
        "values": {"foo": "everywhere"},
        "resourceTemplates": [SETTINGS_TEMPLATE],
    }));

    let report = synced_report(
        reconciler(&cluster)
            .reconcile_at(&config, base_time())
            .await
            .unwrap(),
    );

    assert_eq!(report.namespaces, 3);
    assert_eq!(
        config_value(&cluster, "kube-system", "foo").as_deref(),
        Some("everywhere")
    );
}

#[tokio::test]
async fn test_invalid_selector_is_fatal() {
    let cluster = two_team_cluster();
    let config = replication_config(json!({
        "namespaceSelector": {
            "matchExpressions": [{"key": "team", "operator": "Near"}]
        },
        "values": {"foo": "bar"},
        "resourceTemplates": [SETTINGS_TEMPLATE],
    }));

    let err = reconciler(&cluster)
        .reconcile_at(&config, base_time())
        .await
        .unwrap_err();

    assert!(matches!(err, ReplicationError::SelectorParse(_)));
    assert_eq!(cluster.calls().total(), 0);
}
