//! Treasure catalog records.
//!
//! A [`Treasure`] is created at content-load time and never mutated afterwards.
//! Whether the current player has claimed it is tracked by
//! [`crate::index::TreasureIndex`], not by the record itself.
//!
//! Catalogs are loaded from JSON as a list of [`TreasureEntry`] values. Entries
//! may omit their radii, in which case [`RadiusDefaults`] fill them in.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::{Coordinate, GeoError};
use crate::proximity::{ThresholdError, Thresholds};

/// Default claim radius in meters.
pub const DEFAULT_CLAIM_RADIUS_M: f64 = 50.0;

/// Default notify radius in meters.
pub const DEFAULT_NOTIFY_RADIUS_M: f64 = 100.0;

/// Errors for individual catalog entries.
#[derive(Debug, Error)]
pub enum TreasureError {
    #[error("Treasure '{id}' has an invalid coordinate: {source}")]
    Coordinate {
        id: String,
        #[source]
        source: GeoError,
    },

    #[error("Treasure '{id}' has invalid radii: {source}")]
    Radius {
        id: String,
        #[source]
        source: ThresholdError,
    },

    #[error("Treasure id must not be empty")]
    EmptyId,

    #[error("Catalog JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rarity tier shown by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    #[default]
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
        };
        f.write_str(s)
    }
}

/// Opaque reward payload handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reward {
    /// Points credited on claim.
    #[serde(default)]
    pub points: u32,
    /// Free-form label (e.g. "Golden Compass").
    #[serde(default)]
    pub label: String,
}

/// How a treasure may be discovered.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscoveryMode {
    /// GPS proximity alone is sufficient.
    #[default]
    Gps,
    /// GPS proximity must be corroborated by a visual marker scan.
    Marker { marker_id: String },
}

/// A point of interest that can be discovered and claimed.
#[derive(Debug, Clone, PartialEq)]
pub struct Treasure {
    id: String,
    coordinate: Coordinate,
    claim_radius_m: f64,
    notify_radius_m: f64,
    rarity: Rarity,
    reward: Reward,
    discovery: DiscoveryMode,
}

impl Treasure {
    /// Create a GPS treasure with the given radii.
    pub fn new(
        id: impl Into<String>,
        coordinate: Coordinate,
        claim_radius_m: f64,
        notify_radius_m: f64,
    ) -> Result<Self, TreasureError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TreasureError::EmptyId);
        }
        coordinate
            .validate()
            .map_err(|source| TreasureError::Coordinate {
                id: id.clone(),
                source,
            })?;
        Thresholds::new(notify_radius_m, claim_radius_m).map_err(|source| {
            TreasureError::Radius {
                id: id.clone(),
                source,
            }
        })?;

        Ok(Self {
            id,
            coordinate,
            claim_radius_m,
            notify_radius_m,
            rarity: Rarity::default(),
            reward: Reward::default(),
            discovery: DiscoveryMode::Gps,
        })
    }

    /// Set the rarity.
    pub fn with_rarity(mut self, rarity: Rarity) -> Self {
        self.rarity = rarity;
        self
    }

    /// Set the reward payload.
    pub fn with_reward(mut self, reward: Reward) -> Self {
        self.reward = reward;
        self
    }

    /// Require a marker scan to corroborate GPS proximity.
    pub fn with_marker(mut self, marker_id: impl Into<String>) -> Self {
        self.discovery = DiscoveryMode::Marker {
            marker_id: marker_id.into(),
        };
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    pub fn claim_radius_m(&self) -> f64 {
        self.claim_radius_m
    }

    pub fn notify_radius_m(&self) -> f64 {
        self.notify_radius_m
    }

    pub fn rarity(&self) -> Rarity {
        self.rarity
    }

    pub fn reward(&self) -> &Reward {
        &self.reward
    }

    pub fn discovery(&self) -> &DiscoveryMode {
        &self.discovery
    }

    /// Marker id if this treasure needs marker corroboration.
    pub fn marker_id(&self) -> Option<&str> {
        match &self.discovery {
            DiscoveryMode::Gps => None,
            DiscoveryMode::Marker { marker_id } => Some(marker_id),
        }
    }

    /// Classification thresholds: notify radius as `near`, claim radius as `very_near`.
    pub fn thresholds(&self) -> Thresholds {
        // Radii were validated in the constructor.
        Thresholds {
            near: self.notify_radius_m,
            very_near: self.claim_radius_m,
        }
    }
}

/// Radii applied to catalog entries that omit them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusDefaults {
    pub claim_radius_m: f64,
    pub notify_radius_m: f64,
}

impl Default for RadiusDefaults {
    fn default() -> Self {
        Self {
            claim_radius_m: DEFAULT_CLAIM_RADIUS_M,
            notify_radius_m: DEFAULT_NOTIFY_RADIUS_M,
        }
    }
}

/// Serialized form of a catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasureEntry {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_radius_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_radius_m: Option<f64>,
    #[serde(default)]
    pub rarity: Rarity,
    #[serde(default)]
    pub reward: Reward,
    #[serde(default)]
    pub discovery: DiscoveryMode,
}

impl TreasureEntry {
    /// Build a validated treasure, filling missing radii from `defaults`.
    ///
    /// If only the claim radius is given and it exceeds the default notify
    /// radius, the notify radius is raised to match it.
    pub fn into_treasure(self, defaults: &RadiusDefaults) -> Result<Treasure, TreasureError> {
        let claim = self.claim_radius_m.unwrap_or(defaults.claim_radius_m);
        let notify = self
            .notify_radius_m
            .unwrap_or_else(|| defaults.notify_radius_m.max(claim));
        let coordinate = Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        };

        let mut treasure = Treasure::new(self.id, coordinate, claim, notify)?
            .with_rarity(self.rarity)
            .with_reward(self.reward);
        treasure.discovery = self.discovery;
        Ok(treasure)
    }
}

impl From<&Treasure> for TreasureEntry {
    fn from(t: &Treasure) -> Self {
        Self {
            id: t.id.clone(),
            latitude: t.coordinate.latitude,
            longitude: t.coordinate.longitude,
            claim_radius_m: Some(t.claim_radius_m),
            notify_radius_m: Some(t.notify_radius_m),
            rarity: t.rarity,
            reward: t.reward.clone(),
            discovery: t.discovery.clone(),
        }
    }
}

/// Parse a JSON catalog into entries.
///
/// Entries are returned unvalidated so the index can skip bad ones
/// individually instead of rejecting the whole catalog.
pub fn parse_catalog(json: &str) -> Result<Vec<TreasureEntry>, TreasureError> {
    Ok(serde_json::from_str(json)?)
}

/// The player whose session drives discovery.
///
/// A snapshot: the authoritative claimed set lives in the index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Player {
    pub id: String,
    pub last_known_position: Option<Coordinate>,
    pub claimed_treasure_ids: HashSet<String>,
}

impl Player {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}
