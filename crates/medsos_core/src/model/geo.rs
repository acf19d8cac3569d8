//! Geographic primitives and great-circle distance.
//!
//! # Responsibility
//! - Define the validated `Coordinate` shared by responders and requests.
//! - Compute haversine distance in kilometres.
//!
//! # Invariants
//! - `latitude` is within `[-90, 90]` and `longitude` within `[-180, 180]`.
//! - `distance_km` is pure, symmetric and zero for identical inputs.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Validation error for out-of-range (or non-finite) coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinateError {
    LatitudeOutOfRange(f64),
    LongitudeOutOfRange(f64),
}

impl Display for CoordinateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LatitudeOutOfRange(value) => {
                write!(f, "latitude {value} is outside [-90, 90]")
            }
            Self::LongitudeOutOfRange(value) => {
                write!(f, "longitude {value} is outside [-180, 180]")
            }
        }
    }
}

impl Error for CoordinateError {}

impl Coordinate {
    /// Builds a coordinate, rejecting out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        let coordinate = Self {
            latitude,
            longitude,
        };
        coordinate.validate()?;
        Ok(coordinate)
    }

    /// Checks range constraints. NaN fails both range checks.
    pub fn validate(&self) -> Result<(), CoordinateError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(CoordinateError::LatitudeOutOfRange(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(CoordinateError::LongitudeOutOfRange(self.longitude));
        }
        Ok(())
    }
}

/// Great-circle distance between two coordinates in kilometres.
///
/// # Errors
/// - Returns `CoordinateError` when either input is out of range.
pub fn distance_km(a: Coordinate, b: Coordinate) -> Result<f64, CoordinateError> {
    a.validate()?;
    b.validate()?;

    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let half_lat = (d_lat / 2.0).sin();
    let half_lon = (d_lon / 2.0).sin();

    let h = half_lat * half_lat
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * half_lon * half_lon;
    // Rounding can push antipodal inputs a hair above 1.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    Ok(EARTH_RADIUS_KM * c)
}

#[cfg(test)]
mod tests {
    use super::{distance_km, Coordinate, CoordinateError};

    fn coord(latitude: f64, longitude: f64) -> Coordinate {
        Coordinate::new(latitude, longitude).expect("valid coordinate")
    }

    #[test]
    fn nearby_points_in_new_delhi_are_about_seventy_metres_apart() {
        let responder = coord(28.6145, 77.2090);
        let origin = coord(28.6139, 77.2090);
        let distance = distance_km(origin, responder).unwrap();
        assert!((distance - 0.0667).abs() < 0.005, "got {distance}");
    }

    #[test]
    fn quarter_meridian_matches_earth_radius() {
        let equator = coord(0.0, 0.0);
        let pole = coord(90.0, 0.0);
        let expected = std::f64::consts::FRAC_PI_2 * super::EARTH_RADIUS_KM;
        assert!((distance_km(equator, pole).unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn antipodal_points_do_not_produce_nan() {
        let distance = distance_km(coord(0.0, 0.0), coord(0.0, 180.0)).unwrap();
        assert!(distance.is_finite());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert_eq!(
            Coordinate::new(90.5, 0.0),
            Err(CoordinateError::LatitudeOutOfRange(90.5))
        );
        assert_eq!(
            Coordinate::new(0.0, -180.5),
            Err(CoordinateError::LongitudeOutOfRange(-180.5))
        );
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn distance_validates_unchecked_inputs() {
        let bogus = Coordinate {
            latitude: 120.0,
            longitude: 0.0,
        };
        assert!(distance_km(bogus, coord(0.0, 0.0)).is_err());
    }
}
