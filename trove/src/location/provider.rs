//! Location provider abstraction and fix types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::geo::Coordinate;

/// Default minimum distance between delivered fixes (meters).
pub const DEFAULT_MIN_MOVEMENT_M: f64 = 1.0;

/// Default maximum age of a fix before it is considered stale.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30);

/// Default silence after which a timeout is reported.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Location failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location unavailable: {0}")]
    Unavailable(String),

    #[error("No location fix within {0:?}")]
    Timeout(Duration),

    #[error("Invalid fix: {0}")]
    InvalidFix(String),
}

/// A fix as delivered by a platform provider, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Reported accuracy radius in meters, if known.
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl RawFix {
    /// A fix at the given position, stamped now.
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            accuracy_m: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A validated fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub coordinate: Coordinate,
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Event pushed by a provider into the watch sink.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Fix(RawFix),
    Error(LocationError),
}

/// Identifier of an active provider watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Options for a location watch.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchOptions {
    /// Fixes closer than this to the last delivered fix are suppressed.
    pub min_movement_m: f64,
    /// Fixes older than this are suppressed.
    pub max_age: Duration,
    /// Silence after which [`LocationError::Timeout`] is reported.
    pub timeout: Duration,
    /// Fixes reporting a worse accuracy radius are suppressed.
    pub max_accuracy_m: Option<f64>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            min_movement_m: DEFAULT_MIN_MOVEMENT_M,
            max_age: DEFAULT_MAX_AGE,
            timeout: DEFAULT_TIMEOUT,
            max_accuracy_m: None,
        }
    }
}

/// Platform location source.
///
/// Implementations push [`ProviderEvent`]s into `sink` until the watch is
/// cleared. Dropping the sink ends the watch from the provider side.
pub trait LocationProvider: Send + Sync {
    fn watch(
        &self,
        options: &WatchOptions,
        sink: mpsc::UnboundedSender<ProviderEvent>,
    ) -> Result<WatchId, LocationError>;

    /// Stop pushing events for `id`. Unknown ids are ignored.
    fn clear(&self, id: WatchId);
}
