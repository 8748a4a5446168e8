//! Geodesic math
//!
//! Great-circle distance and bearing between WGS84 coordinates, plus the
//! bounding-box helpers used to pre-filter spatial queries.
//!
//! All distances use the haversine formula on a sphere of radius
//! [`EARTH_RADIUS_METERS`].

mod types;

pub use types::{
    is_valid_lat_lon, Coordinate, GeoBounds, GeoError, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON,
};

use std::fmt;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Length of one degree of latitude (and of longitude at the equator) in meters.
pub const METERS_PER_DEGREE: f64 = EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0;

/// Great-circle distance between two coordinates in meters.
///
/// # Errors
///
/// Returns [`GeoError::InvalidCoordinate`] if either input is NaN or out of range.
#[inline]
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> Result<f64, GeoError> {
    a.validate()?;
    b.validate()?;
    Ok(haversine(a, b))
}

/// Haversine distance for coordinates already known to be valid.
#[inline]
pub(crate) fn haversine(a: &Coordinate, b: &Coordinate) -> f64 {
    if a == b {
        return 0.0;
    }

    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h marginally outside [0, 1] for antipodal points.
    let c = 2.0 * h.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_METERS * c
}

/// Initial great-circle bearing from `a` to `b`.
///
/// Returns degrees in `[0, 360)`, where 0 = North and 90 = East. Identical
/// points yield 0.
pub fn bearing_degrees(a: &Coordinate, b: &Coordinate) -> Result<f64, GeoError> {
    a.validate()?;
    b.validate()?;

    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    Ok(normalize_bearing(y.atan2(x).to_degrees()))
}

/// Normalize an angle in degrees to `[0, 360)`.
fn normalize_bearing(degrees: f64) -> f64 {
    let normalized = degrees.rem_euclid(360.0);
    // rem_euclid can return exactly 360.0 for tiny negative inputs.
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}

/// Eight-way compass direction for hint display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardinalDirection {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl CardinalDirection {
    const ALL: [CardinalDirection; 8] = [
        CardinalDirection::North,
        CardinalDirection::NorthEast,
        CardinalDirection::East,
        CardinalDirection::SouthEast,
        CardinalDirection::South,
        CardinalDirection::SouthWest,
        CardinalDirection::West,
        CardinalDirection::NorthWest,
    ];

    /// Map a bearing in degrees to the nearest of the eight directions.
    ///
    /// Each direction covers a 45° sector centered on its heading, so
    /// 22.5° is the first bearing classified as north-east.
    pub fn from_bearing(bearing: f64) -> Self {
        let sector = ((normalize_bearing(bearing) + 22.5) / 45.0).floor() as usize % 8;
        Self::ALL[sector]
    }

    /// Short compass abbreviation (e.g. "NE").
    pub fn abbreviation(&self) -> &'static str {
        match self {
            CardinalDirection::North => "N",
            CardinalDirection::NorthEast => "NE",
            CardinalDirection::East => "E",
            CardinalDirection::SouthEast => "SE",
            CardinalDirection::South => "S",
            CardinalDirection::SouthWest => "SW",
            CardinalDirection::West => "W",
            CardinalDirection::NorthWest => "NW",
        }
    }
}

impl fmt::Display for CardinalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}
