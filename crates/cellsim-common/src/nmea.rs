//! GPGGA sentence codec.
//!
//! The emulated GPS receiver feeds the guest NMEA 0183 `$GPGGA` fix
//! sentences. Only GPGGA is understood by the guest location stack, so only
//! GPGGA is emitted and parsed here.

use crate::Location;
use chrono::Utc;
use thiserror::Error;

/// Errors produced by the GPGGA codec.
#[derive(Debug, Error)]
pub enum NmeaError {
    /// The sentence has fewer comma-separated fields than a GPGGA fix needs.
    #[error("sentence too short: {0} fields, need at least 6")]
    TooShort(usize),

    /// A coordinate field did not parse as a number.
    #[error("bad coordinate field {field:?}: {value:?}")]
    BadField {
        /// Which field failed.
        field: &'static str,
        /// The offending text.
        value: String,
    },
}

/// Convert decimal degrees to the NMEA ddmm.mmmm encoding.
fn to_coord(deg: f64) -> f64 {
    (deg.trunc() * 100.0) + (60.0 * deg.fract())
}

/// Convert the NMEA ddmm.mmmm encoding back to decimal degrees.
fn from_coord(coord: f64) -> f64 {
    let whole = (coord / 100.0).trunc();
    whole + (coord - whole * 100.0) / 60.0
}

/// XOR checksum over all bytes strictly between `$` and `*`.
fn checksum(body: &str) -> u8 {
    body.bytes().fold(0, |acc, b| acc ^ b)
}

/// Render a location as a `$GPGGA` sentence with the current UTC fix time.
///
/// The sentence reports fix quality 1 (GPS fix) from 05 satellites, with the
/// location's accuracy in the horizontal-dilution field, and ends with the
/// two-hex-digit XOR checksum of everything between `$` and `*`.
pub fn to_sentence(loc: &Location) -> String {
    let mut lat = to_coord(loc.lat);
    let lat_card = if lat < 0.0 {
        lat = -lat;
        "S"
    } else {
        "N"
    };

    let mut long = to_coord(loc.long);
    let long_card = if long < 0.0 {
        long = -long;
        "W"
    } else {
        "E"
    };

    let body = format!(
        "GPGGA,{},{:09.4},{},{:010.4},{},1,05,{:.2},0.0,M,0.0,M,,,",
        Utc::now().format("%H%M%S"),
        lat,
        lat_card,
        long,
        long_card,
        loc.accuracy,
    );

    format!("${}*{:02x}", body, checksum(&body))
}

/// Parse a `$GPGGA` sentence back into a [`Location`].
///
/// Only the latitude and longitude fields are consumed; accuracy is fixed at
/// 1.0 and the trailing checksum is not verified.
pub fn parse(sentence: &str) -> Result<Location, NmeaError> {
    let parts: Vec<&str> = sentence.split(',').collect();
    if parts.len() < 6 {
        return Err(NmeaError::TooShort(parts.len()));
    }

    let lat: f64 = parts[2].parse().map_err(|_| NmeaError::BadField {
        field: "latitude",
        value: parts[2].to_string(),
    })?;
    let long: f64 = parts[4].parse().map_err(|_| NmeaError::BadField {
        field: "longitude",
        value: parts[4].to_string(),
    })?;

    let mut lat = from_coord(lat);
    if parts[3] == "S" {
        lat = -lat;
    }
    let mut long = from_coord(long);
    if parts[5] == "W" {
        long = -long;
    }

    Ok(Location::new(lat, long, 1.0))
}
