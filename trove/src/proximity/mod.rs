//! Proximity classification.
//!
//! Maps a distance to a discrete [`Tier`] using per-treasure thresholds:
//!
//! ```text
//!   0 ────────── very_near ────────── near ──────────────► distance
//!   │  VeryNear  │        Near         │        Far
//! ```
//!
//! Both boundaries are inclusive on the closer tier.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discrete proximity tier, ordered from furthest to closest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Outside the notify radius.
    Far,
    /// Inside the notify radius but outside the claim radius.
    Near,
    /// Inside the claim radius.
    VeryNear,
}

impl Tier {
    /// Whether the tier is inside the notify radius.
    pub fn is_in_range(&self) -> bool {
        !matches!(self, Tier::Far)
    }

    /// Short description for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Far => "far",
            Tier::Near => "near",
            Tier::VeryNear => "very near",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid threshold configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("Very-near threshold must be a positive finite distance, got {0}")]
    InvalidVeryNear(f64),

    #[error("Near threshold {near} must be finite and at least the very-near threshold {very_near}")]
    NearBelowVeryNear { near: f64, very_near: f64 },
}

/// Distance thresholds in meters for one treasure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Notify radius: at or below this distance the tier is at least `Near`.
    pub near: f64,
    /// Claim radius: at or below this distance the tier is `VeryNear`.
    pub very_near: f64,
}

impl Thresholds {
    /// Create validated thresholds.
    pub fn new(near: f64, very_near: f64) -> Result<Self, ThresholdError> {
        if !very_near.is_finite() || very_near <= 0.0 {
            return Err(ThresholdError::InvalidVeryNear(very_near));
        }
        if !near.is_finite() || near < very_near {
            return Err(ThresholdError::NearBelowVeryNear { near, very_near });
        }
        Ok(Self { near, very_near })
    }
}

/// Classify a distance in meters.
///
/// Negative or NaN distances never come out of [`crate::geo::distance_meters`];
/// NaN falls through every comparison and classifies as `Far`.
#[inline]
pub fn classify(distance: f64, thresholds: Thresholds) -> Tier {
    if distance <= thresholds.very_near {
        Tier::VeryNear
    } else if distance <= thresholds.near {
        Tier::Near
    } else {
        Tier::Far
    }
}
