//! Session telemetry for observability and user feedback.
//!
//! Lock-free atomic counters recorded by the discovery session, read through
//! point-in-time snapshots.
//!
//! # Architecture
//!
//! ```text
//! DiscoverySession ─────► SessionMetrics ─────► TelemetrySnapshot ─────► Views
//!                        (atomic counters)     (point-in-time copy)      (CLI, etc.)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use trove::telemetry::SessionMetrics;
//!
//! let metrics = SessionMetrics::new();
//! metrics.fix_accepted();
//! metrics.claim_attempted();
//! metrics.claim_succeeded();
//!
//! let snapshot = metrics.snapshot();
//! println!("Claims: {}/{}", snapshot.claims_succeeded, snapshot.claims_attempted);
//! ```

mod metrics;
mod snapshot;

pub use metrics::SessionMetrics;
pub use snapshot::TelemetrySnapshot;
