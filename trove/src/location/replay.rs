//! Recorded track playback.
//!
//! A track is a JSON array of points:
//!
//! ```json
//! [
//!   { "latitude": -1.2950, "longitude": 36.8240 },
//!   { "latitude": -1.2921, "longitude": 36.8219, "accuracy_m": 8.0 }
//! ]
//! ```
//!
//! Each watch replays the whole track from the start, one point per
//! interval, stamping every fix with the wall-clock time it is emitted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::provider::{
    LocationError, LocationProvider, ProviderEvent, RawFix, WatchId, WatchOptions,
};

/// Default interval between replayed points.
pub const DEFAULT_REPLAY_INTERVAL: Duration = Duration::from_secs(1);

/// One recorded position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
}

impl TrackPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m: None,
        }
    }
}

/// Parse a JSON track.
pub fn parse_track(json: &str) -> Result<Vec<TrackPoint>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Provider that replays a recorded track.
#[derive(Debug)]
pub struct ReplayLocationProvider {
    track: Vec<TrackPoint>,
    interval: Duration,
    watches: Mutex<HashMap<WatchId, CancellationToken>>,
    next_id: AtomicU64,
    completed: CancellationToken,
}

impl ReplayLocationProvider {
    pub fn new(track: Vec<TrackPoint>, interval: Duration) -> Self {
        Self {
            track,
            interval,
            watches: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            completed: CancellationToken::new(),
        }
    }

    pub fn track_len(&self) -> usize {
        self.track.len()
    }

    /// Token cancelled once any watch has emitted the last point.
    pub fn completion(&self) -> CancellationToken {
        self.completed.clone()
    }
}

impl LocationProvider for ReplayLocationProvider {
    /// Spawns the playback task; must be called from within a Tokio runtime.
    fn watch(
        &self,
        _options: &WatchOptions,
        sink: mpsc::UnboundedSender<ProviderEvent>,
    ) -> Result<WatchId, LocationError> {
        if self.track.is_empty() {
            return Err(LocationError::Unavailable("track is empty".to_string()));
        }

        let id = WatchId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let token = CancellationToken::new();
        self.watches.lock().insert(id, token.clone());

        let track = self.track.clone();
        let interval = self.interval;
        let completed = self.completed.clone();

        tokio::spawn(async move {
            for (i, point) in track.iter().enumerate() {
                if i > 0 {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        _ = tokio::time::sleep(interval) => {}
                    }
                } else if token.is_cancelled() {
                    return;
                }

                let fix = RawFix {
                    latitude: Some(point.latitude),
                    longitude: Some(point.longitude),
                    accuracy_m: point.accuracy_m,
                    timestamp: Utc::now(),
                };
                if sink.send(ProviderEvent::Fix(fix)).is_err() {
                    return;
                }
            }

            debug!(watch = id.0, points = track.len(), "Track replay complete");
            completed.cancel();
            // Hold the sink open until cleared so the stream does not see a
            // closed provider mid-session.
            token.cancelled().await;
        });

        Ok(id)
    }

    fn clear(&self, id: WatchId) {
        if let Some(token) = self.watches.lock().remove(&id) {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_track() {
        let track = parse_track(
            r#"[{"latitude": 1.0, "longitude": 2.0}, {"latitude": 3.0, "longitude": 4.0, "accuracy_m": 5.0}]"#,
        )
        .unwrap();
        assert_eq!(track.len(), 2);
        assert_eq!(track[0], TrackPoint::new(1.0, 2.0));
        assert_eq!(track[1].accuracy_m, Some(5.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_emits_track_in_order() {
        let provider = ReplayLocationProvider::new(
            vec![TrackPoint::new(0.0, 0.0), TrackPoint::new(0.001, 0.0)],
            Duration::from_secs(1),
        );
        let completion = provider.completion();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = provider.watch(&WatchOptions::default(), tx).unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first, ProviderEvent::Fix(f) if f.latitude == Some(0.0)));
        assert!(matches!(second, ProviderEvent::Fix(f) if f.latitude == Some(0.001)));

        completion.cancelled().await;
        provider.clear(id);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_track_is_unavailable() {
        let provider = ReplayLocationProvider::new(Vec::new(), DEFAULT_REPLAY_INTERVAL);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            provider.watch(&WatchOptions::default(), tx),
            Err(LocationError::Unavailable(_))
        ));
    }
}
