//! Location stream
//!
//! Turns a platform location source into a stream of validated, rate-limited
//! fixes for the discovery loop.
//!
//! ```text
//! LocationProvider ──ProviderEvent──► pump task ──► FixFilter ──► on_fix(Fix)
//!   (watch/clear)       (mpsc)            │              │
//!                                         │              └── invalid ──► on_error
//!                                         └── silence > timeout ──────► on_error(Timeout)
//! ```
//!
//! Fixes are suppressed when they are stale (`max_age`), less accurate than
//! `max_accuracy_m`, or closer than `min_movement_m` to the last delivered fix.
//!
//! # Providers
//!
//! - [`ReplayLocationProvider`] replays a recorded JSON track
//! - [`ManualLocationProvider`] forwards positions pushed by the caller

mod manual;
mod provider;
mod replay;
mod stream;

pub use manual::ManualLocationProvider;
pub use provider::{
    Fix, LocationError, LocationProvider, ProviderEvent, RawFix, WatchId, WatchOptions,
    DEFAULT_MAX_AGE, DEFAULT_MIN_MOVEMENT_M, DEFAULT_TIMEOUT,
};
pub use replay::{parse_track, ReplayLocationProvider, TrackPoint, DEFAULT_REPLAY_INTERVAL};
pub use stream::{FixFilter, LocationStream, LocationSubscription};
