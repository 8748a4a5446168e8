//! Atomic session counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::snapshot::TelemetrySnapshot;

/// Counters for one discovery session.
///
/// All methods take `&self` and use relaxed atomics; the struct is shared
/// through `Arc` between the session task and readers.
#[derive(Debug)]
pub struct SessionMetrics {
    started_at: Instant,
    fixes_accepted: AtomicU64,
    fixes_rejected: AtomicU64,
    location_errors: AtomicU64,
    proximity_events: AtomicU64,
    lost_events: AtomicU64,
    claims_attempted: AtomicU64,
    claims_succeeded: AtomicU64,
    claims_failed: AtomicU64,
    reconciliations: AtomicU64,
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            fixes_accepted: AtomicU64::new(0),
            fixes_rejected: AtomicU64::new(0),
            location_errors: AtomicU64::new(0),
            proximity_events: AtomicU64::new(0),
            lost_events: AtomicU64::new(0),
            claims_attempted: AtomicU64::new(0),
            claims_succeeded: AtomicU64::new(0),
            claims_failed: AtomicU64::new(0),
            reconciliations: AtomicU64::new(0),
        }
    }

    pub fn fix_accepted(&self) {
        self.fixes_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// A fix was dropped as invalid.
    pub fn fix_rejected(&self) {
        self.fixes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Provider error or timeout.
    pub fn location_error(&self) {
        self.location_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn proximity_event(&self) {
        self.proximity_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lost_event(&self) {
        self.lost_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn claim_attempted(&self) {
        self.claims_attempted.fetch_add(1, Ordering::Relaxed);
    }

    /// Claim resolved as `Claimed` or `AlreadyClaimed`.
    pub fn claim_succeeded(&self) {
        self.claims_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn claim_failed(&self) {
        self.claims_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A feed change altered local state.
    pub fn reconciliation(&self) {
        self.reconciliations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            uptime: self.started_at.elapsed(),
            fixes_accepted: self.fixes_accepted.load(Ordering::Relaxed),
            fixes_rejected: self.fixes_rejected.load(Ordering::Relaxed),
            location_errors: self.location_errors.load(Ordering::Relaxed),
            proximity_events: self.proximity_events.load(Ordering::Relaxed),
            lost_events: self.lost_events.load(Ordering::Relaxed),
            claims_attempted: self.claims_attempted.load(Ordering::Relaxed),
            claims_succeeded: self.claims_succeeded.load(Ordering::Relaxed),
            claims_failed: self.claims_failed.load(Ordering::Relaxed),
            reconciliations: self.reconciliations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = SessionMetrics::new();
        metrics.fix_accepted();
        metrics.fix_accepted();
        metrics.fix_rejected();
        metrics.claim_attempted();
        metrics.claim_failed();
        metrics.claim_attempted();
        metrics.claim_succeeded();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.fixes_accepted, 2);
        assert_eq!(snapshot.fixes_rejected, 1);
        assert_eq!(snapshot.claims_attempted, 2);
        assert_eq!(snapshot.claims_succeeded, 1);
        assert_eq!(snapshot.claims_failed, 1);
        assert_eq!(snapshot.proximity_events, 0);
    }
}
