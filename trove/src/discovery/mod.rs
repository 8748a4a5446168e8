//! Discovery engine
//!
//! Connects location, the treasure index and the claim store into a per-player
//! discovery loop.
//!
//! - [`DiscoveryCoordinator`] is the synchronous per-treasure state machine
//! - [`DiscoverySession`] owns the event loop that feeds it
//! - [`EventBus`] publishes [`DiscoveryEvent`]s to the presentation layer
//! - [`MarkerCorrelator`] pairs GPS proximity with visual marker detections

mod coordinator;
mod events;
mod marker;
mod session;
mod state;

pub use coordinator::{
    ClaimRequest, DiscoveryConfig, DiscoveryCoordinator, DEFAULT_MARKER_WINDOW,
    DEFAULT_MAX_QUERY_RADIUS_M, DEFAULT_NOTIFY_COOLDOWN,
};
pub use events::{ClaimResult, DiscoveryEvent, EventBus, ProximityEvent, DEFAULT_EVENT_CAPACITY};
pub use marker::{MarkerCorrelator, MarkerEvent, MarkerKind};
pub use session::{DiscoverySession, SessionConfig, SessionError};
pub use state::{Phase, TreasureState};
