//! # Error Policy
//!
//! Requeue policy for failed reconciliations.
//!
//! Each ReplicationConfig keeps its own Fibonacci backoff, so one config stuck
//! on a missing value source does not slow down retries for the others. The
//! state is reset by a successful pass.

use crate::controller::reconciler::{ReplicationError, Reconciler};
use crate::crd::ReplicationConfig;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Delay used when the backoff table cannot be locked
const FALLBACK_BACKOFF: Duration = Duration::from_secs(60);

/// Schedule the next attempt after a failed pass
pub fn handle_reconciliation_error(
    obj: Arc<ReplicationConfig>,
    error: &ReplicationError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconciliation_error",
        replication_config = name,
        reason = error.reason(),
    );
    let _error_guard = error_span.enter();

    error!(error = %error, "reconciliation failed");
    observability::metrics::increment_reconciliation_errors();

    let (delay, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states
                .entry(name.to_string())
                .or_insert_with(|| ctx.new_backoff_state());
            state.increment_error();
            (state.backoff.next_backoff(), state.error_count)
        }
        Err(e) => {
            warn!(error = %e, "backoff state unavailable, using fallback delay");
            (FALLBACK_BACKOFF, 0)
        }
    };

    let next_attempt = chrono::Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::seconds(60));
    info!(
        delay_secs = delay.as_secs(),
        error_count,
        next_attempt = %next_attempt.to_rfc3339(),
        "retrying with backoff"
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}
