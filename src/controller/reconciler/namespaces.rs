//! # Namespace Selection
//!
//! Converts the namespace selector into a kube [`Selector`] and extracts the
//! per-namespace override values allowed by the override policy.
//!
//! `Selector::try_from` rejects unknown operators and `In`/`NotIn` without a
//! values list. Label syntax, empty value lists and values given to
//! `Exists`/`DoesNotExist` are checked here first, so a bad selector fails the
//! pass instead of reaching the API server.

use super::error::ReplicationError;
use crate::constants::NAMESPACE_PHASE_TERMINATING;
use crate::crd::NamespaceOverridePolicy;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::core::Selector;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static QUALIFIED_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*/)?[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$",
    )
    .expect("label key pattern is hardcoded and valid")
});

static LABEL_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?)?$")
        .expect("label value pattern is hardcoded and valid")
});

/// Validate a namespace selector and convert it to a kube [`Selector`]
///
/// An empty selector selects every namespace.
///
/// # Errors
///
/// Returns `ReplicationError::SelectorParse` for unknown operators, invalid
/// keys or values, and operators given the wrong number of values.
pub fn parse_selector(selector: &LabelSelector) -> Result<Selector, ReplicationError> {
    for (key, value) in selector.match_labels.iter().flatten() {
        validate_key(key)?;
        validate_value(key, value)?;
    }
    for requirement in selector.match_expressions.iter().flatten() {
        validate_requirement(requirement)?;
    }

    Selector::try_from(selector.clone())
        .map_err(|e| ReplicationError::SelectorParse(e.to_string()))
}

fn validate_requirement(requirement: &LabelSelectorRequirement) -> Result<(), ReplicationError> {
    validate_key(&requirement.key)?;
    let values = requirement.values.as_deref().unwrap_or_default();

    match requirement.operator.as_str() {
        "In" | "NotIn" if values.is_empty() => {
            return Err(ReplicationError::SelectorParse(format!(
                "values for key {:?} must be non-empty for operator {}",
                requirement.key, requirement.operator
            )));
        }
        "Exists" | "DoesNotExist" if !values.is_empty() => {
            return Err(ReplicationError::SelectorParse(format!(
                "values for key {:?} must be empty for operator {}",
                requirement.key, requirement.operator
            )));
        }
        _ => {}
    }

    values
        .iter()
        .try_for_each(|value| validate_value(&requirement.key, value))
}

fn validate_key(key: &str) -> Result<(), ReplicationError> {
    if key.len() > 316 || normalize_key(key).len() > 63 || !QUALIFIED_KEY.is_match(key) {
        return Err(ReplicationError::SelectorParse(format!(
            "{key:?} is not a valid label key"
        )));
    }
    Ok(())
}

fn validate_value(key: &str, value: &str) -> Result<(), ReplicationError> {
    if value.len() > 63 || !LABEL_VALUE.is_match(value) {
        return Err(ReplicationError::SelectorParse(format!(
            "{value:?} is not a valid label value for key {key:?}"
        )));
    }
    Ok(())
}

/// Whether a namespace is being deleted
#[must_use]
pub fn is_terminating(namespace: &Namespace) -> bool {
    namespace.metadata.deletion_timestamp.is_some()
        || namespace
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .is_some_and(|phase| phase == NAMESPACE_PHASE_TERMINATING)
}

/// Extract the allow-listed labels and annotations of a namespace
///
/// Keys are normalized by dropping any `prefix/` segment. Annotations win over
/// labels when both normalize to the same key.
#[must_use]
pub fn override_values(
    namespace: &Namespace,
    policy: &NamespaceOverridePolicy,
) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    extract_allowed(
        namespace.metadata.labels.as_ref(),
        &policy.allowed_label_keys,
        &mut values,
    );
    extract_allowed(
        namespace.metadata.annotations.as_ref(),
        &policy.allowed_annotation_keys,
        &mut values,
    );
    values
}

fn extract_allowed(
    source: Option<&BTreeMap<String, String>>,
    allowed: &[String],
    into: &mut BTreeMap<String, String>,
) {
    let Some(source) = source else {
        return;
    };
    for key in allowed {
        if let Some(value) = source.get(key) {
            into.insert(normalize_key(key).to_string(), value.clone());
        }
    }
}

/// Strip the domain prefix of a label or annotation key
#[must_use]
pub fn normalize_key(key: &str) -> &str {
    key.rsplit_once('/').map_or(key, |(_, name)| name)
}

/// Merge namespace overrides over base values
#[must_use]
pub fn merge_values(
    base: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}
