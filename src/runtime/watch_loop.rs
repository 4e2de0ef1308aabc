//! # Watch Loop
//!
//! Runs the kube `Controller` over every ReplicationConfig. The controller
//! serializes reconciliations per object, so two passes over the same config
//! never overlap.

use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::ReplicationConfig;
use crate::runtime::error_policy::handle_reconciliation_error;
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::{watcher, Controller};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

/// Run the controller until a shutdown signal arrives
pub async fn run_watch_loop(
    configs: Api<ReplicationConfig>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let shutdown_state = server_state.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("received shutdown signal, marking server as not ready");
        shutdown_state.is_ready.store(false, Ordering::Relaxed);
    });

    info!("starting controller watch loop");

    Controller::new(configs, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => {
                    debug!(replication_config = %object.name, ?action, "reconciled");
                }
                Err(e) => {
                    warn!(error = %e, "controller stream error");
                }
            }
        })
        .instrument(tracing::info_span!("controller.watch", operation = "watch_loop"))
        .await;

    info!("controller stopped gracefully");
    Ok(())
}
