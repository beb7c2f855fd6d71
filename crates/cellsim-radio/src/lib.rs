//! # cellsim-radio
//!
//! Radio-propagation model for the emulated Wi-Fi plane.
//!
//! Access points live at geographic positions with a configured transmitter
//! power. What an emulated device "sees" is decided here: free-space path
//! loss over the great-circle distance between device and transmitter, a
//! -70 dBm visibility floor, and a universal-AP escape hatch for networks
//! that should exist everywhere. The wander helpers supply the kinematics
//! for devices that move on their own.

use cellsim_common::Location;
use rand::Rng;
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Signal floor below which a located AP is not reported.
pub const VISIBILITY_FLOOR_DBM: f64 = -70.0;

/// Fixed level reported for universal (zero-power) access points.
pub const UNIVERSAL_LEVEL_DBM: i32 = -44;

/// Nominal Wi-Fi carrier frequency in MHz for the path-loss model.
pub const WIFI_FREQ_MHZ: f64 = 2400.0;

/// FSPL constant for distance in meters and frequency in MHz.
const FSPL_CONST: f64 = 27.55;

/// Wander speed of a walking device, in degrees per tick.
pub const WALKING_SPEED: f64 = 0.000007;

/// Wander speed of a driving device, in degrees per tick.
pub const DRIVING_SPEED: f64 = 0.0001;

/// Half-width of the square around the origin that wander destinations are
/// drawn from, in degrees.
pub const WANDER_RADIUS_DEG: f64 = 0.01;

// ============================================================================
// Access Points
// ============================================================================

/// A Wi-Fi access point and the backing network it maps to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPoint {
    /// Network name; unique key in the AP registry.
    pub ssid: String,
    /// Backing VLAN a connected device should be attached to.
    pub vlan: u32,
    /// Bridge carrying that VLAN.
    pub bridge: String,
    /// Transmitter position; `None` makes the AP universal.
    pub loc: Option<Location>,
    /// Transmitter power in dBm, derived from the configured EIRP.
    pub power_dbm: i32,
    /// Configured EIRP in milliwatts, kept for display.
    pub milliwatts: f64,
}

impl AccessPoint {
    /// An AP visible everywhere, regardless of device location.
    pub fn universal(ssid: impl Into<String>, vlan: u32, bridge: impl Into<String>) -> Self {
        AccessPoint {
            ssid: ssid.into(),
            vlan,
            bridge: bridge.into(),
            loc: None,
            power_dbm: 0,
            milliwatts: 0.0,
        }
    }

    /// An AP at a fixed position with the given EIRP in milliwatts.
    pub fn located(
        ssid: impl Into<String>,
        vlan: u32,
        bridge: impl Into<String>,
        loc: Location,
        milliwatts: f64,
    ) -> Self {
        AccessPoint {
            ssid: ssid.into(),
            vlan,
            bridge: bridge.into(),
            loc: Some(loc),
            power_dbm: if milliwatts > 0.0 {
                dbm_from_milliwatts(milliwatts)
            } else {
                0
            },
            milliwatts,
        }
    }

    /// Zero-power APs are visible everywhere at a fixed level.
    pub fn is_universal(&self) -> bool {
        self.milliwatts == 0.0 || self.loc.is_none()
    }

    /// Signal strength in dBm as seen from `at`, or `None` for an AP with
    /// no position.
    pub fn signal_strength(&self, at: &Location) -> Option<f64> {
        let loc = self.loc.as_ref()?;
        let d = loc.distance_to(at).max(0.01);
        let fspl = 20.0 * d.log10() + 20.0 * WIFI_FREQ_MHZ.log10() - FSPL_CONST;
        Some(self.power_dbm as f64 - fspl)
    }
}

/// Convert a configured EIRP in milliwatts to rounded dBm.
pub fn dbm_from_milliwatts(mw: f64) -> i32 {
    (0.5 + 10.0 * mw.log10()) as i32
}

/// An access point a device can currently see, at its reported level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleAp {
    /// Network name.
    pub ssid: String,
    /// Reported signal level in dBm.
    pub level_dbm: i32,
}

/// Compute which access points a device at `at` can see.
///
/// A located AP is included at its computed signal when that clears the
/// -70 dBm floor; universal APs are always included at -44 dBm; everything
/// else is omitted.
pub fn visible_access_points<'a>(
    aps: impl IntoIterator<Item = &'a AccessPoint>,
    at: &Location,
) -> Vec<VisibleAp> {
    let mut visible = Vec::new();
    for ap in aps {
        if !ap.is_universal() {
            if let Some(signal) = ap.signal_strength(at) {
                if signal > VISIBILITY_FLOOR_DBM {
                    visible.push(VisibleAp {
                        ssid: ap.ssid.clone(),
                        level_dbm: signal.round() as i32,
                    });
                }
                continue;
            }
        }
        visible.push(VisibleAp {
            ssid: ap.ssid.clone(),
            level_dbm: UNIVERSAL_LEVEL_DBM,
        });
    }
    visible
}

// ============================================================================
// Wander Kinematics
// ============================================================================

/// True when a wandering device should pick a new destination: it reached
/// the current one, or no destination has ever been set.
pub fn needs_destination(current: &Location, destination: &Location) -> bool {
    (destination.lat == 0.0 && destination.long == 0.0) || destination.close_enough(current)
}

/// Draw a new destination uniformly from the square around `origin`.
pub fn pick_destination<R: Rng + ?Sized>(origin: &Location, rng: &mut R) -> Location {
    let mut dlat = rng.gen::<f64>() * WANDER_RADIUS_DEG;
    let mut dlong = rng.gen::<f64>() * WANDER_RADIUS_DEG;
    if rng.gen::<f64>() < 0.5 {
        dlat = -dlat;
    }
    if rng.gen::<f64>() < 0.5 {
        dlong = -dlong;
    }
    Location::new(origin.lat + dlat, origin.long + dlong, origin.accuracy)
}

/// Move `current` toward `destination` by at most `speed` degrees per axis,
/// clamped so neither axis overshoots.
pub fn step_toward(current: &Location, destination: &Location, speed: f64) -> Location {
    let axis = |cur: f64, dest: f64| {
        let diff = dest - cur;
        if diff.abs() < speed {
            dest
        } else if diff < 0.0 {
            cur - speed
        } else {
            cur + speed
        }
    };
    Location::new(
        axis(current.lat, destination.lat),
        axis(current.long, destination.long),
        current.accuracy,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dbm_conversion() {
        assert_eq!(dbm_from_milliwatts(200.0), 23);
        assert_eq!(dbm_from_milliwatts(100.0), 20);
        assert_eq!(dbm_from_milliwatts(1.0), 0);
    }

    #[test]
    fn test_visibility_boundary() {
        let ap = AccessPoint::located(
            "corner",
            100,
            "br0",
            Location::new(37.0, -122.0, 1.0),
            200.0,
        );

        // About 10 m north of the transmitter.
        let near = Location::new(37.00009, -122.0, 1.0);
        let visible = visible_access_points([&ap], &near);
        assert_eq!(visible.len(), 1);
        assert!(visible[0].level_dbm > -70, "level {}", visible[0].level_dbm);

        // About 10 km north: below the floor, not reported.
        let far = Location::new(37.09, -122.0, 1.0);
        assert!(visible_access_points([&ap], &far).is_empty());
    }

    #[test]
    fn test_universal_ap_everywhere() {
        let ap = AccessPoint::universal("anywhere", 200, "br0");
        for loc in [
            Location::new(0.0, 0.0, 1.0),
            Location::new(37.0, -122.0, 1.0),
            Location::new(-45.0, 170.0, 1.0),
        ] {
            let visible = visible_access_points([&ap], &loc);
            assert_eq!(
                visible,
                vec![VisibleAp {
                    ssid: "anywhere".to_string(),
                    level_dbm: UNIVERSAL_LEVEL_DBM,
                }]
            );
        }
    }

    #[test]
    fn test_signal_falls_with_distance() {
        let ap = AccessPoint::located(
            "tower",
            1,
            "br0",
            Location::new(37.0, -122.0, 1.0),
            200.0,
        );
        let d10 = ap
            .signal_strength(&Location::new(37.00009, -122.0, 1.0))
            .unwrap();
        let d100 = ap
            .signal_strength(&Location::new(37.0009, -122.0, 1.0))
            .unwrap();
        assert!(d10 > d100);
        // One decade of distance costs 20 dB.
        assert!((d10 - d100 - 20.0).abs() < 0.5, "{} vs {}", d10, d100);
    }

    #[test]
    fn test_step_toward_clamps() {
        let cur = Location::new(37.0, -122.0, 1.0);
        let dest = Location::new(37.001, -122.001, 1.0);

        let stepped = step_toward(&cur, &dest, 0.0001);
        assert!((stepped.lat - 37.0001).abs() < 1e-9);
        assert!((stepped.long - -122.0001).abs() < 1e-9);

        // A big step lands exactly on the destination, no overshoot.
        let jumped = step_toward(&cur, &dest, 1.0);
        assert_eq!(jumped.lat, dest.lat);
        assert_eq!(jumped.long, dest.long);
    }

    #[test]
    fn test_pick_destination_in_radius() {
        let origin = Location::new(37.0, -122.0, 1.0);
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let dest = pick_destination(&origin, &mut rng);
            assert!((dest.lat - origin.lat).abs() <= WANDER_RADIUS_DEG);
            assert!((dest.long - origin.long).abs() <= WANDER_RADIUS_DEG);
        }
    }

    #[test]
    fn test_needs_destination() {
        let cur = Location::new(37.0, -122.0, 1.0);
        assert!(needs_destination(&cur, &Location::origin()));
        assert!(needs_destination(&cur, &Location::new(37.0, -122.0, 1.0)));
        assert!(!needs_destination(&cur, &Location::new(37.01, -122.0, 1.0)));
    }
}
