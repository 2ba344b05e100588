//! Segment intersection over feature geometries.
//!
//! Coordinates are handed to `geo` in raw `dm7` units (x = longitude,
//! y = latitude) so that shared vertices survive the round trip exactly;
//! computed points are rounded back to the nearest `dm7` unit.

use std::collections::BTreeSet;

use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{Coord, Line};
use topocheck_feature_models::{Area, Feature, FeatureKey, FeatureKind, Location, PolyLine};

/// Minimum number of distinct vertices of an area ring.
const MIN_RING_VERTICES: usize = 3;

/// Geometry that cannot take part in intersection tests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    /// A polyline or ring with too few vertices.
    #[error("{key} has {count} distinct vertices, at least {minimum} required")]
    TooFewVertices {
        /// Offending feature.
        key: FeatureKey,
        /// Vertices found.
        count: usize,
        /// Vertices required.
        minimum: usize,
    },

    /// An area ring that crosses or overlaps itself.
    #[error("{key} has a self-intersecting ring")]
    SelfIntersectingRing {
        /// Offending feature.
        key: FeatureKey,
    },

    /// A node or point, which has no segments.
    #[error("{key} has no linear geometry")]
    NotLinear {
        /// Offending feature.
        key: FeatureKey,
    },
}

#[allow(clippy::cast_precision_loss)]
fn to_coord(location: Location) -> Coord<f64> {
    Coord {
        x: location.lon_dm7 as f64,
        y: location.lat_dm7 as f64,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_location(coord: Coord<f64>) -> Location {
    Location::new(coord.y.round() as i64, coord.x.round() as i64)
}

fn segment(start: Location, end: Location) -> Line<f64> {
    Line::new(to_coord(start), to_coord(end))
}

/// Checks that an area ring is usable: at least three distinct vertices and
/// no two non-adjacent ring segments touching.
///
/// # Errors
///
/// * [`GeometryError::TooFewVertices`] for degenerate rings
/// * [`GeometryError::SelfIntersectingRing`] for bow-ties and spikes
pub fn validate_area(area: &Area) -> Result<(), GeometryError> {
    let key = FeatureKey::new(FeatureKind::Area, area.id);
    let count = area.polygon.distinct_vertex_count();
    if count < MIN_RING_VERTICES {
        return Err(GeometryError::TooFewVertices {
            key,
            count,
            minimum: MIN_RING_VERTICES,
        });
    }

    let segments: Vec<Line<f64>> = area
        .polygon
        .boundary()
        .segments()
        .filter(|(start, end)| start != end)
        .map(|(start, end)| segment(start, end))
        .collect();
    let n = segments.len();

    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(segments[i], segments[j]) {
                None => {}
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(_) => return Err(GeometryError::SelfIntersectingRing { key }),
            }
        }
    }

    Ok(())
}

/// The segments that take part in intersection tests: the polyline of an
/// edge or line, the closed ring of an area.
///
/// # Errors
///
/// * [`GeometryError::NotLinear`] for nodes and points
/// * [`GeometryError::TooFewVertices`] for single-vertex polylines
/// * Any error from [`validate_area`]
pub fn linear_geometry(feature: &Feature) -> Result<PolyLine, GeometryError> {
    if let Feature::Area(area) = feature {
        validate_area(area)?;
    }
    outline(feature)
}

/// Like [`linear_geometry`], but trusts that areas were validated
/// beforehand.
///
/// # Errors
///
/// * [`GeometryError::NotLinear`] for nodes and points
/// * [`GeometryError::TooFewVertices`] for single-vertex polylines
pub fn outline(feature: &Feature) -> Result<PolyLine, GeometryError> {
    let key = feature.key();
    match feature {
        Feature::Edge(edge) => require_segments(key, &edge.polyline),
        Feature::Line(line) => require_segments(key, &line.polyline),
        Feature::Area(area) => Ok(area.polygon.boundary()),
        Feature::Node(_) | Feature::Point(_) => Err(GeometryError::NotLinear { key }),
    }
}

fn require_segments(key: FeatureKey, polyline: &PolyLine) -> Result<PolyLine, GeometryError> {
    if polyline.len() < 2 {
        return Err(GeometryError::TooFewVertices {
            key,
            count: polyline.len(),
            minimum: 2,
        });
    }
    Ok(polyline.clone())
}

/// All points where two polylines meet. Collinear overlaps contribute both
/// overlap endpoints.
#[must_use]
pub fn polyline_intersections(a: &PolyLine, b: &PolyLine) -> BTreeSet<Location> {
    let mut locations = BTreeSet::new();

    if let (Some(bounds_a), Some(bounds_b)) = (a.bounds(), b.bounds())
        && !bounds_a.intersects(&bounds_b)
    {
        return locations;
    }

    for (a_start, a_end) in a.segments() {
        for (b_start, b_end) in b.segments() {
            match line_intersection(segment(a_start, a_end), segment(b_start, b_end)) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    locations.insert(to_location(intersection));
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    locations.insert(to_location(intersection.start));
                    locations.insert(to_location(intersection.end));
                }
                None => {}
            }
        }
    }

    locations
}

/// Intersection locations between two features' linear geometries.
///
/// # Errors
///
/// * Any error from [`linear_geometry`] for either feature
pub fn intersection_locations(a: &Feature, b: &Feature) -> Result<BTreeSet<Location>, GeometryError> {
    let line_a = linear_geometry(a)?;
    let line_b = linear_geometry(b)?;
    Ok(polyline_intersections(&line_a, &line_b))
}
