//! Point-in-time telemetry copy.

use std::fmt;
use std::time::Duration;

/// Snapshot of [`SessionMetrics`](super::SessionMetrics) counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub uptime: Duration,
    pub fixes_accepted: u64,
    pub fixes_rejected: u64,
    pub location_errors: u64,
    pub proximity_events: u64,
    pub lost_events: u64,
    pub claims_attempted: u64,
    pub claims_succeeded: u64,
    pub claims_failed: u64,
    pub reconciliations: u64,
}

impl TelemetrySnapshot {
    /// Fraction of resolved claims that succeeded, or `None` before any resolved.
    pub fn claim_success_rate(&self) -> Option<f64> {
        let resolved = self.claims_succeeded + self.claims_failed;
        (resolved > 0).then(|| self.claims_succeeded as f64 / resolved as f64)
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Uptime:            {:.1}s", self.uptime.as_secs_f64())?;
        writeln!(
            f,
            "Fixes:             {} accepted, {} rejected, {} errors",
            self.fixes_accepted, self.fixes_rejected, self.location_errors
        )?;
        writeln!(
            f,
            "Proximity events:  {} ({} lost)",
            self.proximity_events, self.lost_events
        )?;
        write!(
            f,
            "Claims:            {} attempted, {} succeeded, {} failed, {} reconciled",
            self.claims_attempted, self.claims_succeeded, self.claims_failed, self.reconciliations
        )
    }
}
