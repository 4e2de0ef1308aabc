//! # Runtime
//!
//! Controller process wiring.
//!
//! - `initialization`: rustls, tracing, metrics, HTTP server and client setup
//! - `watch_loop`: kube `Controller` over ReplicationConfigs
//! - `error_policy`: per-object backoff for failed reconciliations

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
