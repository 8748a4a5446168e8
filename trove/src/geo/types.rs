//! Coordinate and bounding box types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum valid latitude in degrees.
pub const MIN_LAT: f64 = -90.0;
/// Maximum valid latitude in degrees.
pub const MAX_LAT: f64 = 90.0;
/// Minimum valid longitude in degrees.
pub const MIN_LON: f64 = -180.0;
/// Maximum valid longitude in degrees.
pub const MAX_LON: f64 = 180.0;

/// Errors produced by coordinate validation and geometry calculations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeoError {
    /// Latitude or longitude is NaN, infinite, or out of range.
    #[error("Invalid coordinate: lat={latitude}, lon={longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    /// Radius is NaN, infinite, or negative.
    #[error("Invalid radius: {0} m")]
    InvalidRadius(f64),
}

/// A WGS84 position in degrees.
///
/// Values are validated on construction through [`Coordinate::new`]. Deserialized
/// coordinates should be checked with [`Coordinate::validate`] before use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees (-90 to 90).
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180).
    pub longitude: f64,
}

impl Coordinate {
    /// Create a validated coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        let coord = Self {
            latitude,
            longitude,
        };
        coord.validate()?;
        Ok(coord)
    }

    /// Check that both components are finite and within range.
    pub fn validate(&self) -> Result<(), GeoError> {
        if is_valid_lat_lon(self.latitude, self.longitude) {
            Ok(())
        } else {
            Err(GeoError::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }

    /// Whether the coordinate is usable for distance calculations.
    pub fn is_valid(&self) -> bool {
        is_valid_lat_lon(self.latitude, self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Check raw latitude/longitude values.
///
/// NaN fails both range checks, so it is rejected here as well.
#[inline]
pub fn is_valid_lat_lon(latitude: f64, longitude: f64) -> bool {
    (MIN_LAT..=MAX_LAT).contains(&latitude) && (MIN_LON..=MAX_LON).contains(&longitude)
}

/// Axis-aligned geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    /// Minimum (southernmost) latitude
    pub min_lat: f64,
    /// Maximum (northernmost) latitude
    pub max_lat: f64,
    /// Minimum (westernmost) longitude
    pub min_lon: f64,
    /// Maximum (easternmost) longitude
    pub max_lon: f64,
}

impl GeoBounds {
    /// Create a new bounding box.
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Build the box enclosing a circle of `radius_m` around `center`.
    ///
    /// The longitude half-span is the latitude half-span divided by
    /// `cos(latitude)`. Near the poles, or when the box would cross the
    /// antimeridian, the longitude range widens to the full globe so the box
    /// stays a superset of the circle.
    pub fn around(center: Coordinate, radius_m: f64) -> Result<Self, GeoError> {
        center.validate()?;
        if !radius_m.is_finite() || radius_m < 0.0 {
            return Err(GeoError::InvalidRadius(radius_m));
        }

        let lat_delta = radius_m / super::METERS_PER_DEGREE;
        let min_lat = (center.latitude - lat_delta).max(MIN_LAT);
        let max_lat = (center.latitude + lat_delta).min(MAX_LAT);

        // Use the latitude edge furthest from the equator, where meridians converge most.
        let widest_lat = min_lat.abs().max(max_lat.abs());
        let cos_lat = widest_lat.to_radians().cos();

        if cos_lat <= f64::EPSILON || max_lat >= MAX_LAT || min_lat <= MIN_LAT {
            return Ok(Self::new(min_lat, max_lat, MIN_LON, MAX_LON));
        }

        let lon_delta = lat_delta / cos_lat;
        let min_lon = center.longitude - lon_delta;
        let max_lon = center.longitude + lon_delta;

        if min_lon < MIN_LON || max_lon > MAX_LON {
            return Ok(Self::new(min_lat, max_lat, MIN_LON, MAX_LON));
        }

        Ok(Self::new(min_lat, max_lat, min_lon, max_lon))
    }

    /// Check whether a coordinate lies inside the box (edges inclusive).
    pub fn contains(&self, coord: &Coordinate) -> bool {
        coord.latitude >= self.min_lat
            && coord.latitude <= self.max_lat
            && coord.longitude >= self.min_lon
            && coord.longitude <= self.max_lon
    }

    /// Get the width of the bounds in degrees.
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Get the height of the bounds in degrees.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }
}
