//! # Controller
//!
//! - `backoff`: Fibonacci requeue backoff for failed reconciliations
//! - `reconciler`: Replication engine
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod reconciler;
pub mod server;
