//! Geographic coordinates and the regional masking transform.
//!
//! Stored coordinates are always WGS-84. When regional masking is enabled,
//! coordinates read back for presentation are shifted into the GCJ-02 frame
//! mandated for maps served inside mainland China. The shift is one-way and
//! deterministic; nothing ever converts back.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Semi-major axis of the Krasovsky 1940 ellipsoid.
const KRASOVSKY_A: f64 = 6_378_245.0;
/// Eccentricity squared of the Krasovsky 1940 ellipsoid.
const KRASOVSKY_EE: f64 = 0.006_693_421_622_965_943;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Storage key used for scanned locations (`"lat,lon"`).
    #[must_use]
    pub fn key(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// Error returned when a `"lat,lon"` string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid coordinate {0:?}: expected \"lat,lon\"")]
pub struct InvalidCoordinate(String);

impl FromStr for Coordinate {
    type Err = InvalidCoordinate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidCoordinate(s.to_string());
        let (lat, lon) = s.split_once(',').ok_or_else(invalid)?;
        let latitude: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let longitude: f64 = lon.trim().parse().map_err(|_| invalid())?;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(invalid());
        }
        Ok(Self::new(latitude, longitude))
    }
}

/// Axis-aligned latitude/longitude rectangle for range queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Southern edge (minimum latitude).
    pub south: f64,
    /// Western edge (minimum longitude).
    pub west: f64,
    /// Northern edge (maximum latitude).
    pub north: f64,
    /// Eastern edge (maximum longitude).
    pub east: f64,
}

impl BoundingBox {
    /// Square box of `half_side` degrees around `center`.
    #[must_use]
    pub fn around(center: Coordinate, half_side: f64) -> Self {
        Self {
            south: center.latitude - half_side,
            west: center.longitude - half_side,
            north: center.latitude + half_side,
            east: center.longitude + half_side,
        }
    }
}

/// Read-time coordinate presentation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinateMask {
    /// Coordinates are returned exactly as stored.
    #[default]
    None,
    /// Coordinates are shifted into the GCJ-02 frame.
    China,
}

impl CoordinateMask {
    /// Builds the mask from the operator's regional masking flag.
    #[must_use]
    pub const fn from_flag(enabled: bool) -> Self {
        if enabled { Self::China } else { Self::None }
    }

    /// Applies the mask to a stored coordinate.
    #[must_use]
    pub fn apply(self, coordinate: Coordinate) -> Coordinate {
        match self {
            Self::None => coordinate,
            Self::China => wgs84_to_gcj02(coordinate),
        }
    }
}

/// Converts a WGS-84 coordinate into the GCJ-02 frame.
///
/// Coordinates outside mainland China's bounding box are returned unchanged.
#[must_use]
pub fn wgs84_to_gcj02(coordinate: Coordinate) -> Coordinate {
    let Coordinate {
        latitude,
        longitude,
    } = coordinate;
    if outside_china(latitude, longitude) {
        return coordinate;
    }

    let x = longitude - 105.0;
    let y = latitude - 35.0;
    let rad_lat = latitude / 180.0 * PI;
    let magic = 1.0 - KRASOVSKY_EE * rad_lat.sin() * rad_lat.sin();
    let sqrt_magic = magic.sqrt();

    let d_lat = (shift_latitude(x, y) * 180.0)
        / ((KRASOVSKY_A * (1.0 - KRASOVSKY_EE)) / (magic * sqrt_magic) * PI);
    let d_lon = (shift_longitude(x, y) * 180.0) / (KRASOVSKY_A / sqrt_magic * rad_lat.cos() * PI);

    Coordinate::new(latitude + d_lat, longitude + d_lon)
}

fn outside_china(latitude: f64, longitude: f64) -> bool {
    !(72.004..=137.8347).contains(&longitude) || !(0.8293..=55.8271).contains(&latitude)
}

fn shift_latitude(x: f64, y: f64) -> f64 {
    let mut ret = -100.0 + 2.0 * x + 3.0 * y + 0.2 * y * y + 0.1 * x * y + 0.2 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (y * PI).sin() + 40.0 * (y / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (160.0 * (y / 12.0 * PI).sin() + 320.0 * (y * PI / 30.0).sin()) * 2.0 / 3.0;
    ret
}

fn shift_longitude(x: f64, y: f64) -> f64 {
    let mut ret = 300.0 + x + 2.0 * y + 0.1 * x * x + 0.1 * x * y + 0.1 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (x * PI).sin() + 40.0 * (x / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (150.0 * (x / 12.0 * PI).sin() + 300.0 * (x / 30.0 * PI).sin()) * 2.0 / 3.0;
    ret
}
