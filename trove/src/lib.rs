//! Trove - Proximity discovery and claim engine
//!
//! This library detects when a player approaches geolocated treasures,
//! notifies them as they get close, and records each discovery exactly once
//! against a remote store that may be slow, offline, or updated by other
//! devices.
//!
//! # Architecture
//!
//! ```text
//! LocationProvider ──► LocationStream ──► DiscoverySession ──► EventBus ──► UI
//!                                         │        │
//!                               TreasureIndex   ClaimStore ◄──► RemoteStore
//!                               (geo, proximity)
//! ```
//!
//! - [`geo`]: great-circle distance, bearing and bounding boxes
//! - [`proximity`]: distance → tier classification
//! - [`index`]: catalog registry and radius queries
//! - [`location`]: validated, rate-limited location fixes
//! - [`discovery`]: per-treasure state machine and the session event loop
//! - [`claim`]: idempotent, optimistic claim recording and reconciliation

pub mod claim;
pub mod config;
pub mod discovery;
pub mod geo;
pub mod index;
pub mod location;
pub mod logging;
pub mod proximity;
pub mod telemetry;
pub mod treasure;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
