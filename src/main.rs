//! # Replicator
//!
//! Kubernetes controller that renders `ReplicationConfig` resource templates
//! into every namespace matching a label selector and keeps the rendered
//! objects in sync.
//!
//! ## Overview
//!
//! 1. **Value resolution** - inline values, then Secrets and ConfigMaps in declaration order
//! 2. **Namespace overrides** - allow-listed namespace labels and annotations win over base values
//! 3. **Rendering** - minijinja templates parsed into Kubernetes objects
//! 4. **Change detection** - objects are only written when content, labels or annotations differ
//! 5. **Skip gate** - unchanged configs are re-synced once per sync interval

use anyhow::Result;
use replicator::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init.configs, init.reconciler, init.server_state).await
}
