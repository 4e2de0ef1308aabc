//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable (see [`crate::config::ControllerConfig`]).

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default sync interval (minutes)
/// A ReplicationConfig whose spec is unchanged is not re-synced more often than this
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 15;

/// Longest sync interval or backoff delay accepted from configuration (one week, in minutes)
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Default namespace the controller runs in, used for value sources without `sourceNamespace`
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "nais-system";

/// Default Fibonacci backoff floor for failed reconciliations (minutes)
pub const DEFAULT_BACKOFF_MIN_MINUTES: u64 = 1;

/// Default Fibonacci backoff ceiling for failed reconciliations (minutes)
pub const DEFAULT_BACKOFF_MAX_MINUTES: u64 = 10;

/// Default upper bound for a single reconciliation pass (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 300;

/// Annotation on a ReplicationConfig that stretches its sync interval (whole minutes)
pub const SYNC_INTERVAL_ANNOTATION: &str = "replicator.nais.io/syncInterval";

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "replicator";

/// Controller name reported on published events
pub const EVENT_REPORTER: &str = "replicator";

/// Substituted for undefined template variables when rendering leniently
pub const NO_VALUE_SENTINEL: &str = "<no value>";

/// Fragment of the API server message returned when writing into a namespace being deleted
pub const NAMESPACE_TERMINATING_MESSAGE: &str = "because it is being terminated";

/// Namespace phase reported while a namespace is being deleted
pub const NAMESPACE_PHASE_TERMINATING: &str = "Terminating";
