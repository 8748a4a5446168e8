//! Filtered location stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::provider::{
    Fix, LocationError, LocationProvider, ProviderEvent, RawFix, WatchId, WatchOptions,
};
use crate::geo::{haversine, Coordinate};

/// Validation and rate limiting for raw fixes.
///
/// Keeps the last accepted coordinate so jitter below `min_movement_m` does
/// not reach the discovery loop.
#[derive(Debug, Clone)]
pub struct FixFilter {
    options: WatchOptions,
    last_accepted: Option<Coordinate>,
}

impl FixFilter {
    pub fn new(options: WatchOptions) -> Self {
        Self {
            options,
            last_accepted: None,
        }
    }

    /// Check a raw fix against `now`.
    ///
    /// Returns `Ok(Some(fix))` to deliver, `Ok(None)` to suppress silently, or
    /// [`LocationError::InvalidFix`] for a fix without a usable position.
    pub fn check(&mut self, raw: RawFix, now: DateTime<Utc>) -> Result<Option<Fix>, LocationError> {
        let (Some(latitude), Some(longitude)) = (raw.latitude, raw.longitude) else {
            return Err(LocationError::InvalidFix(
                "missing latitude or longitude".to_string(),
            ));
        };
        let coordinate = Coordinate::new(latitude, longitude)
            .map_err(|e| LocationError::InvalidFix(e.to_string()))?;

        // Future timestamps (clock skew) count as fresh.
        let age = (now - raw.timestamp).to_std().unwrap_or_default();
        if age > self.options.max_age {
            debug!(age_ms = age.as_millis() as u64, "Suppressing stale fix");
            return Ok(None);
        }

        if let (Some(limit), Some(accuracy)) = (self.options.max_accuracy_m, raw.accuracy_m) {
            if accuracy > limit {
                debug!(accuracy_m = accuracy, limit_m = limit, "Suppressing inaccurate fix");
                return Ok(None);
            }
        }

        if let Some(last) = self.last_accepted {
            let moved = haversine(&last, &coordinate);
            if moved < self.options.min_movement_m {
                debug!(moved_m = moved, "Suppressing fix below minimum movement");
                return Ok(None);
            }
        }

        self.last_accepted = Some(coordinate);
        Ok(Some(Fix {
            coordinate,
            accuracy_m: raw.accuracy_m,
            timestamp: raw.timestamp,
        }))
    }

    pub fn last_accepted(&self) -> Option<Coordinate> {
        self.last_accepted
    }
}

/// Entry point for filtered location updates.
pub struct LocationStream;

impl LocationStream {
    /// Start watching `provider` and deliver filtered fixes to `on_fix`.
    ///
    /// Provider errors, invalid fixes and timeouts go to `on_error`. The
    /// callbacks run on a spawned pump task, so this must be called from
    /// within a Tokio runtime.
    pub fn start<F, E>(
        provider: Arc<dyn LocationProvider>,
        options: WatchOptions,
        mut on_fix: F,
        mut on_error: E,
    ) -> Result<LocationSubscription, LocationError>
    where
        F: FnMut(Fix) + Send + 'static,
        E: FnMut(LocationError) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watch_id = provider.watch(&options, tx)?;
        let token = CancellationToken::new();
        let pump_token = token.clone();

        info!(watch = watch_id.0, "Location stream started");

        let task = tokio::spawn(async move {
            let mut filter = FixFilter::new(options.clone());

            loop {
                tokio::select! {
                    biased;

                    _ = pump_token.cancelled() => break,

                    event = tokio::time::timeout(options.timeout, rx.recv()) => match event {
                        Ok(Some(ProviderEvent::Fix(raw))) => match filter.check(raw, Utc::now()) {
                            Ok(Some(fix)) => on_fix(fix),
                            Ok(None) => {}
                            Err(e) => {
                                warn!(error = %e, "Dropping invalid fix");
                                on_error(e);
                            }
                        },
                        Ok(Some(ProviderEvent::Error(e))) => {
                            warn!(error = %e, "Location provider error");
                            on_error(e);
                        }
                        Ok(None) => {
                            debug!("Location provider closed the watch");
                            break;
                        }
                        Err(_) => {
                            warn!(
                                timeout_ms = options.timeout.as_millis() as u64,
                                "No location fix received"
                            );
                            on_error(LocationError::Timeout(options.timeout));
                        }
                    },
                }
            }

            debug!("Location pump stopped");
        });

        Ok(LocationSubscription {
            provider,
            watch_id,
            token,
            stopped: AtomicBool::new(false),
            task,
        })
    }
}

/// Handle for an active location watch.
///
/// Stopping is idempotent; dropping the handle stops the watch.
pub struct LocationSubscription {
    provider: Arc<dyn LocationProvider>,
    watch_id: WatchId,
    token: CancellationToken,
    stopped: AtomicBool,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for LocationSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationSubscription")
            .field("watch_id", &self.watch_id)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl LocationSubscription {
    pub fn watch_id(&self) -> WatchId {
        self.watch_id
    }

    /// Clear the provider watch and end the pump task.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.provider.clear(self.watch_id);
        self.token.cancel();
        info!(watch = self.watch_id.0, "Location stream stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Whether the pump task has exited (stopped, or the provider closed the watch).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for LocationSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}
