//! # Status and Skip Gate
//!
//! A ReplicationConfig is skipped when its spec fingerprint matches the last
//! synchronized one and the sync interval has not elapsed since then. Our own
//! status write triggers a new reconciliation, so without this gate every pass
//! would immediately schedule another.

use crate::crd::ReplicationConfigStatus;
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

/// Why a full pass runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReason {
    NeverSynced,
    SpecChanged,
    IntervalElapsed,
}

impl SyncReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncReason::NeverSynced => "never-synced",
            SyncReason::SpecChanged => "spec-changed",
            SyncReason::IntervalElapsed => "interval-elapsed",
        }
    }
}

/// Decision taken before touching any namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncGate {
    /// Recently synchronized with the same spec; check again after `remaining`
    Skip { remaining: Duration },
    Sync(SyncReason),
}

/// Decide whether a full pass is needed
///
/// A timestamp that does not parse counts as never synchronized. A timestamp in
/// the future counts as just synchronized.
#[must_use]
pub fn sync_gate(
    status: Option<&ReplicationConfigStatus>,
    fingerprint: &str,
    now: DateTime<Utc>,
    interval: Duration,
) -> SyncGate {
    let Some(status) = status else {
        return SyncGate::Sync(SyncReason::NeverSynced);
    };
    let Some(last_sync) = status
        .last_sync_timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
    else {
        return SyncGate::Sync(SyncReason::NeverSynced);
    };

    if status.last_sync_fingerprint.as_deref() != Some(fingerprint) {
        return SyncGate::Sync(SyncReason::SpecChanged);
    }

    let elapsed = (now - last_sync.with_timezone(&Utc))
        .to_std()
        .unwrap_or(Duration::ZERO);
    if elapsed < interval {
        SyncGate::Skip {
            remaining: interval - elapsed,
        }
    } else {
        SyncGate::Sync(SyncReason::IntervalElapsed)
    }
}

/// Status written after a completed pass
#[must_use]
pub fn synced_status(
    fingerprint: String,
    now: DateTime<Utc>,
    observed_generation: Option<i64>,
) -> ReplicationConfigStatus {
    ReplicationConfigStatus {
        last_sync_fingerprint: Some(fingerprint),
        last_sync_timestamp: Some(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
        observed_generation,
    }
}
