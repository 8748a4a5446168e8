//! Treasure index
//!
//! In-memory registry of the treasure catalog and the current player's
//! claimed set. The index answers one question for the discovery coordinator:
//! which unclaimed treasures are within a radius of the player?
//!
//! # Query Strategy
//!
//! ```text
//! position + radius ──► GeoBounds::around ──► cheap box test ──► haversine ──► sorted hits
//!                       (cos(lat) corrected)   (all entries)     (box hits only)
//! ```
//!
//! The bounding box rejects most of a large catalog with four comparisons
//! per entry before any trigonometry runs.
//!
//! # Claimed State
//!
//! Claimed treasures are excluded from queries. A claim can only be undone by
//! [`TreasureIndex::reset_claim`], which the coordinator calls when a
//! reconciliation reports that a claim did not persist. Treasures whose claim
//! was rejected are marked ineligible and are likewise excluded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::claim::{RemoteError, RemoteStore};
use crate::geo::{haversine, Coordinate, GeoBounds, GeoError};
use crate::treasure::{RadiusDefaults, Treasure, TreasureEntry};

/// A treasure returned by a proximity query together with its distance.
#[derive(Debug, Clone)]
pub struct NearbyTreasure {
    pub treasure: Arc<Treasure>,
    pub distance_m: f64,
}

/// Outcome of loading a batch of catalog entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Entries added or replaced.
    pub loaded: usize,
    /// Entries skipped because they failed validation.
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct IndexInner {
    treasures: HashMap<String, Arc<Treasure>>,
    markers: HashMap<String, String>,
    claimed: HashSet<String>,
    ineligible: HashSet<String>,
}

/// Thread-safe treasure registry with per-player claimed state.
///
/// Shared through `Arc` between the discovery session (writer) and the
/// presentation layer (reader of [`TreasureIndex::claimed_ids`]).
#[derive(Debug, Default)]
pub struct TreasureIndex {
    inner: RwLock<IndexInner>,
}

impl TreasureIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index from already-validated treasures.
    pub fn with_treasures(treasures: impl IntoIterator<Item = Treasure>) -> Self {
        let index = Self::new();
        for treasure in treasures {
            index.insert(treasure);
        }
        index
    }

    /// Add or replace a treasure.
    pub fn insert(&self, treasure: Treasure) {
        let mut inner = self.inner.write();
        if let Some(marker_id) = treasure.marker_id() {
            inner
                .markers
                .insert(marker_id.to_string(), treasure.id().to_string());
        }
        inner
            .treasures
            .insert(treasure.id().to_string(), Arc::new(treasure));
    }

    /// Load catalog entries, skipping invalid ones with a warning.
    pub fn load(
        &self,
        entries: impl IntoIterator<Item = TreasureEntry>,
        defaults: &RadiusDefaults,
    ) -> LoadReport {
        let mut report = LoadReport::default();

        for entry in entries {
            match entry.into_treasure(defaults) {
                Ok(treasure) => {
                    self.insert(treasure);
                    report.loaded += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Skipping invalid catalog entry");
                    report.skipped += 1;
                }
            }
        }

        info!(
            loaded = report.loaded,
            skipped = report.skipped,
            total = self.len(),
            "Treasure catalog loaded"
        );
        report
    }

    /// Fetch the treasures around `center` from the remote store and add them.
    pub async fn refresh_from_remote(
        &self,
        remote: &dyn RemoteStore,
        center: Coordinate,
        radius_m: f64,
    ) -> Result<usize, RemoteError> {
        let bounds = GeoBounds::around(center, radius_m)
            .map_err(|e| RemoteError::Rejected(e.to_string()))?;
        let treasures = remote.query_nearby(bounds).await?;
        let count = treasures.len();

        for treasure in treasures {
            self.insert(treasure);
        }

        debug!(count, radius_m, "Refreshed treasures from remote store");
        Ok(count)
    }

    /// Unclaimed, eligible treasures within `max_radius_m` of `position`,
    /// nearest first.
    pub fn nearby_unclaimed(
        &self,
        position: &Coordinate,
        max_radius_m: f64,
    ) -> Result<Vec<NearbyTreasure>, GeoError> {
        let bounds = GeoBounds::around(*position, max_radius_m)?;
        let inner = self.inner.read();

        let mut hits: Vec<NearbyTreasure> = inner
            .treasures
            .values()
            .filter(|t| !inner.claimed.contains(t.id()) && !inner.ineligible.contains(t.id()))
            .filter(|t| bounds.contains(&t.coordinate()))
            .filter_map(|t| {
                let distance_m = haversine(position, &t.coordinate());
                (distance_m <= max_radius_m).then(|| NearbyTreasure {
                    treasure: Arc::clone(t),
                    distance_m,
                })
            })
            .collect();

        hits.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        Ok(hits)
    }

    /// Mark a treasure claimed. Returns true if it was not claimed before.
    pub fn mark_claimed(&self, treasure_id: &str) -> bool {
        self.inner.write().claimed.insert(treasure_id.to_string())
    }

    /// Undo a claim after reconciliation reports it did not persist.
    /// Returns true if the treasure was claimed.
    pub fn reset_claim(&self, treasure_id: &str) -> bool {
        self.inner.write().claimed.remove(treasure_id)
    }

    /// Exclude a treasure whose claim was rejected.
    pub fn mark_ineligible(&self, treasure_id: &str) {
        self.inner
            .write()
            .ineligible
            .insert(treasure_id.to_string());
    }

    pub fn is_claimed(&self, treasure_id: &str) -> bool {
        self.inner.read().claimed.contains(treasure_id)
    }

    pub fn is_ineligible(&self, treasure_id: &str) -> bool {
        self.inner.read().ineligible.contains(treasure_id)
    }

    /// Snapshot of the claimed set.
    pub fn claimed_ids(&self) -> HashSet<String> {
        self.inner.read().claimed.clone()
    }

    pub fn get(&self, treasure_id: &str) -> Option<Arc<Treasure>> {
        self.inner.read().treasures.get(treasure_id).cloned()
    }

    /// Look up the treasure bound to a visual marker.
    pub fn find_by_marker(&self, marker_id: &str) -> Option<Arc<Treasure>> {
        let inner = self.inner.read();
        inner
            .markers
            .get(marker_id)
            .and_then(|id| inner.treasures.get(id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().treasures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().treasures.is_empty()
    }
}
