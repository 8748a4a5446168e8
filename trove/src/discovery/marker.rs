//! Visual marker corroboration.
//!
//! Marker treasures require two independent signals before a claim: GPS
//! placing the player inside the claim radius, and a camera-based marker
//! detection. The two must occur within a configurable window of each other.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Marker detection transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Found,
    Lost,
}

/// Detection event from a marker tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerEvent {
    pub marker_id: String,
    pub kind: MarkerKind,
    pub at: Instant,
}

impl MarkerEvent {
    /// Marker detected now.
    pub fn found(marker_id: impl Into<String>) -> Self {
        Self::new(marker_id, MarkerKind::Found, tokio::time::Instant::now().into_std())
    }

    /// Marker no longer tracked.
    pub fn lost(marker_id: impl Into<String>) -> Self {
        Self::new(marker_id, MarkerKind::Lost, tokio::time::Instant::now().into_std())
    }

    pub fn new(marker_id: impl Into<String>, kind: MarkerKind, at: Instant) -> Self {
        Self {
            marker_id: marker_id.into(),
            kind,
            at,
        }
    }
}

/// Tracks the most recent `Found` instant per marker.
#[derive(Debug, Default)]
pub struct MarkerCorrelator {
    found: HashMap<String, Instant>,
}

impl MarkerCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: &MarkerEvent) {
        match event.kind {
            MarkerKind::Found => {
                self.found.insert(event.marker_id.clone(), event.at);
            }
            MarkerKind::Lost => {
                self.found.remove(&event.marker_id);
            }
        }
    }

    pub fn last_found(&self, marker_id: &str) -> Option<Instant> {
        self.found.get(marker_id).copied()
    }

    /// Whether `marker_id` was found within `window` of `at`, in either direction.
    pub fn corroborates(&self, marker_id: &str, at: Instant, window: Duration) -> bool {
        self.last_found(marker_id)
            .map(|found| within(found, at, window))
            .unwrap_or(false)
    }

    pub fn clear(&mut self) {
        self.found.clear();
    }
}

/// Whether two instants are at most `window` apart.
pub(crate) fn within(a: Instant, b: Instant, window: Duration) -> bool {
    a.max(b).duration_since(a.min(b)) <= window
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corroboration_window() {
        let t0 = Instant::now();
        let mut correlator = MarkerCorrelator::new();
        correlator.record(&MarkerEvent::new("plaque", MarkerKind::Found, t0));

        let window = Duration::from_secs(5);
        assert!(correlator.corroborates("plaque", t0 + Duration::from_secs(5), window));
        assert!(!correlator.corroborates("plaque", t0 + Duration::from_secs(6), window));
        assert!(!correlator.corroborates("other", t0, window));
    }

    #[test]
    fn test_lost_clears_detection() {
        let t0 = Instant::now();
        let mut correlator = MarkerCorrelator::new();
        correlator.record(&MarkerEvent::new("plaque", MarkerKind::Found, t0));
        correlator.record(&MarkerEvent::new("plaque", MarkerKind::Lost, t0));
        assert!(correlator.last_found("plaque").is_none());
    }

    #[test]
    fn test_within_is_symmetric() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(3);
        assert!(within(t0, t1, Duration::from_secs(3)));
        assert!(within(t1, t0, Duration::from_secs(3)));
        assert!(!within(t1, t0, Duration::from_secs(2)));
    }
}
