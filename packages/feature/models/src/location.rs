//! Fixed-point coordinates and bounding boxes.
//!
//! Coordinates are stored as degrees × 10^7 (`dm7`) integers so that two
//! features referencing the same OSM node compare equal exactly, and so
//! that computed intersection points can be matched against vertices
//! without floating-point tolerance games.

use serde::{Deserialize, Serialize};

/// Number of `dm7` units per degree.
pub const DM7_PER_DEGREE: f64 = 10_000_000.0;

/// Mean Earth radius in meters (IUGG).
const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// A geographic coordinate in `dm7` fixed point.
///
/// Ordering is latitude-major, which gives deterministic iteration order
/// for the point sets attached to flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Latitude in degrees × 10^7.
    pub lat_dm7: i64,
    /// Longitude in degrees × 10^7.
    pub lon_dm7: i64,
}

impl Location {
    /// Creates a location from raw `dm7` values.
    #[must_use]
    pub const fn new(lat_dm7: i64, lon_dm7: i64) -> Self {
        Self { lat_dm7, lon_dm7 }
    }

    /// Creates a location from decimal degrees, rounding to the nearest
    /// `dm7` unit.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_degrees(latitude: f64, longitude: f64) -> Self {
        Self {
            lat_dm7: (latitude * DM7_PER_DEGREE).round() as i64,
            lon_dm7: (longitude * DM7_PER_DEGREE).round() as i64,
        }
    }

    /// Latitude in decimal degrees.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn latitude(self) -> f64 {
        self.lat_dm7 as f64 / DM7_PER_DEGREE
    }

    /// Longitude in decimal degrees.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn longitude(self) -> f64 {
        self.lon_dm7 as f64 / DM7_PER_DEGREE
    }

    /// Great-circle distance to `other` in meters (haversine).
    #[must_use]
    pub fn distance_meters(self, other: Self) -> f64 {
        let lat1 = self.latitude().to_radians();
        let lat2 = other.latitude().to_radians();
        let d_lat = lat2 - lat1;
        let d_lon = (other.longitude() - self.longitude()).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.7},{:.7}", self.latitude(), self.longitude())
    }
}

/// An axis-aligned bounding box in `dm7` coordinates (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    /// South-west corner.
    pub lower: Location,
    /// North-east corner.
    pub upper: Location,
}

impl BoundingBox {
    /// Returns the smallest box enclosing every location, or `None` for an
    /// empty iterator.
    pub fn from_locations<'a>(locations: impl IntoIterator<Item = &'a Location>) -> Option<Self> {
        let mut iter = locations.into_iter();
        let first = *iter.next()?;
        let mut bounds = Self {
            lower: first,
            upper: first,
        };
        for location in iter {
            bounds.expand_to(*location);
        }
        Some(bounds)
    }

    /// Grows the box so that it contains `location`.
    pub fn expand_to(&mut self, location: Location) {
        self.lower.lat_dm7 = self.lower.lat_dm7.min(location.lat_dm7);
        self.lower.lon_dm7 = self.lower.lon_dm7.min(location.lon_dm7);
        self.upper.lat_dm7 = self.upper.lat_dm7.max(location.lat_dm7);
        self.upper.lon_dm7 = self.upper.lon_dm7.max(location.lon_dm7);
    }

    /// Whether the two boxes share at least one point.
    #[must_use]
    pub const fn intersects(&self, other: &Self) -> bool {
        self.lower.lat_dm7 <= other.upper.lat_dm7
            && other.lower.lat_dm7 <= self.upper.lat_dm7
            && self.lower.lon_dm7 <= other.upper.lon_dm7
            && other.lower.lon_dm7 <= self.upper.lon_dm7
    }

    /// Whether `location` lies inside the box (edges included).
    #[must_use]
    pub const fn contains(&self, location: Location) -> bool {
        self.lower.lat_dm7 <= location.lat_dm7
            && location.lat_dm7 <= self.upper.lat_dm7
            && self.lower.lon_dm7 <= location.lon_dm7
            && location.lon_dm7 <= self.upper.lon_dm7
    }
}
