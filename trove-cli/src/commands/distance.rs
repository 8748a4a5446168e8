//! `trove distance`: great-circle distance between two points.

use trove::config::ConfigFile;
use trove::geo::{bearing_degrees, distance_meters, CardinalDirection, Coordinate};
use trove::proximity::{classify, Thresholds};

use crate::error::CliError;

/// Print distance, bearing and the tier a default treasure at `to` would report.
pub fn run(from: Coordinate, to: Coordinate) -> Result<(), CliError> {
    let distance = distance_meters(&from, &to)?;
    let bearing = bearing_degrees(&from, &to)?;
    let direction = CardinalDirection::from_bearing(bearing);

    let radii = ConfigFile::load().unwrap_or_default().radius_defaults();
    let thresholds = Thresholds::new(radii.notify_radius_m, radii.claim_radius_m)
        .map_err(|e| CliError::Config(e.to_string()))?;
    let tier = classify(distance, thresholds);

    println!("From:     {}", from);
    println!("To:       {}", to);
    println!("Distance: {}", format_distance(distance));
    println!("Bearing:  {:.1}° ({})", bearing, direction);
    println!(
        "Tier:     {} (claim {} m, notify {} m)",
        tier, radii.claim_radius_m, radii.notify_radius_m
    );

    Ok(())
}

/// Meters below 1 km, kilometers above.
pub fn format_distance(meters: f64) -> String {
    if meters < 1_000.0 {
        format!("{:.1} m", meters)
    } else {
        format!("{:.2} km", meters / 1_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(0.0), "0.0 m");
        assert_eq!(format_distance(397.94), "397.9 m");
        assert_eq!(format_distance(343_500.0), "343.50 km");
    }
}
