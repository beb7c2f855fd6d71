//! # cellsim-common
//!
//! Shared types for the cellsim mobile-device emulation core.
//!
//! This crate provides the geographic primitives used across the workspace:
//! - Position representation ([`Location`])
//! - Great-circle distance (haversine)
//! - The GPGGA sentence codec ([`nmea`])

pub mod nmea;

use serde::{Deserialize, Serialize};

// ============================================================================
// Geographic Types
// ============================================================================

/// A geographic position as reported to (and by) an emulated GPS receiver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in signed decimal degrees (negative = south).
    pub lat: f64,
    /// Longitude in signed decimal degrees (negative = west).
    pub long: f64,
    /// Horizontal accuracy in meters.
    pub accuracy: f64,
}

impl Location {
    /// Create a location with the given accuracy.
    pub fn new(lat: f64, long: f64, accuracy: f64) -> Self {
        Location {
            lat,
            long,
            accuracy,
        }
    }

    /// The (0, 0) origin used as an "unset" destination marker.
    pub fn origin() -> Self {
        Location::new(0.0, 0.0, 1.0)
    }

    /// Great-circle distance to another location in meters.
    /// Uses the haversine formula on a spherical Earth.
    pub fn distance_to(&self, other: &Location) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;

        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlong = (other.long - self.long).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlong / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }

    /// True when the two positions are within one meter of each other.
    pub fn close_enough(&self, other: &Location) -> bool {
        self.distance_to(other) < 1.0
    }
}

impl Default for Location {
    fn default() -> Self {
        Location::origin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_one_meter_scale() {
        let a = Location::new(37.0, -122.0, 1.0);
        let b = Location::new(37.00001, -122.0, 1.0);
        let d = a.distance_to(&b);
        // 1e-5 degrees of latitude is about 1.11 m
        assert!((d - 1.11).abs() / 1.11 < 0.01, "got {}", d);
    }

    #[test]
    fn test_distance_city_block_scale() {
        let a = Location::new(37.0, -122.0, 1.0);
        let b = Location::new(37.001, -122.001, 1.0);
        let d = a.distance_to(&b);
        assert!((d - 142.3).abs() / 142.3 < 0.01, "got {}", d);
    }

    #[test]
    fn test_close_enough() {
        let a = Location::new(37.0, -122.0, 1.0);
        let b = Location::new(37.000001, -122.0, 1.0);
        let c = Location::new(37.01, -122.0, 1.0);
        assert!(a.close_enough(&b));
        assert!(!a.close_enough(&c));
    }

    #[test]
    fn test_distance_symmetric() {
        let a = Location::new(35.68, 139.69, 1.0);
        let b = Location::new(37.77, -122.42, 1.0);
        let d1 = a.distance_to(&b);
        let d2 = b.distance_to(&a);
        assert!((d1 - d2).abs() < 1e-6);
    }
}
