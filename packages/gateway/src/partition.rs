//! `GeoJSON` partition loading.
//!
//! A partition file is a `FeatureCollection`. Each feature carries its
//! identity in `properties`:
//!
//! ```json
//! { "kind": "edge", "id": 12, "osm_id": 12000, "tags": { "highway": "primary" },
//!   "start_node": 1, "end_node": 2 }
//! ```
//!
//! `start_node` / `end_node` are optional; when either is missing the edge
//! nodes are inferred from node locations. Relations live in the foreign
//! member `relations` of the collection:
//!
//! ```json
//! { "id": 5, "osm_id": 5, "tags": { "type": "boundary" },
//!   "members": [ { "kind": "line", "id": 3, "role": "outer" } ] }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use geojson::GeoJson;
use serde::Deserialize;
use serde_json::Value;
use topocheck_feature_models::{
    Edge, Feature, FeatureKey, FeatureKind, Location, PolyLine, RelationMember, Tags,
};

use crate::TopologyGateway;
use crate::memory::{MemoryAtlas, MemoryAtlasBuilder};

/// Errors raised while reading a partition.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// I/O error (file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Properties or relations did not match the expected shape.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is not valid `GeoJSON`.
    #[error("GeoJSON parse error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The document is valid `GeoJSON` but not a `FeatureCollection`.
    #[error("Expected a GeoJSON FeatureCollection")]
    NotFeatureCollection,

    /// A feature lacks a required member.
    #[error("Feature {index} has no {what}")]
    Missing {
        /// Position of the feature in the collection.
        index: usize,
        /// Name of the missing member.
        what: &'static str,
    },

    /// The geometry type does not fit the feature kind.
    #[error("Feature {index} ({kind}) requires {expected} geometry")]
    UnsupportedGeometry {
        /// Position of the feature in the collection.
        index: usize,
        /// Declared feature kind.
        kind: FeatureKind,
        /// Geometry type the kind requires.
        expected: &'static str,
    },

    /// NaN or infinite coordinate.
    #[error("Feature {index} has a non-finite coordinate")]
    NonFiniteCoordinate {
        /// Position of the feature in the collection.
        index: usize,
    },

    /// Two features share a kind and identifier.
    #[error("Duplicate feature {0}")]
    DuplicateFeature(FeatureKey),

    /// Two relations share an identifier.
    #[error("Duplicate relation {0}")]
    DuplicateRelation(i64),
}

#[derive(Deserialize)]
struct FeatureProperties {
    kind: FeatureKind,
    id: i64,
    #[serde(default)]
    osm_id: Option<i64>,
    #[serde(default)]
    tags: BTreeMap<String, Value>,
    #[serde(default)]
    start_node: Option<i64>,
    #[serde(default)]
    end_node: Option<i64>,
}

#[derive(Deserialize)]
struct RelationRecord {
    id: i64,
    #[serde(default)]
    osm_id: Option<i64>,
    #[serde(default)]
    tags: BTreeMap<String, Value>,
    #[serde(default)]
    members: Vec<MemberRecord>,
}

#[derive(Deserialize)]
struct MemberRecord {
    kind: FeatureKind,
    id: i64,
    #[serde(default)]
    role: String,
}

/// Tag values are kept as strings; numbers and booleans are stringified.
fn to_tags(raw: BTreeMap<String, Value>) -> Tags {
    raw.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect()
}

fn to_locations<'a>(
    index: usize,
    coords: impl Iterator<Item = &'a geo::Coord<f64>>,
) -> Result<Vec<Location>, LoadError> {
    coords
        .map(|coord| {
            if coord.x.is_finite() && coord.y.is_finite() {
                Ok(Location::from_degrees(coord.y, coord.x))
            } else {
                Err(LoadError::NonFiniteCoordinate { index })
            }
        })
        .collect()
}

/// Parses a partition document into a [`MemoryAtlas`].
///
/// # Errors
///
/// * If the document is not a `GeoJSON` `FeatureCollection`
/// * If a feature has missing properties or a geometry that does not fit
///   its kind
/// * If identifiers are duplicated
pub fn load_partition(json: &str) -> Result<MemoryAtlas, LoadError> {
    let GeoJson::FeatureCollection(collection) = json.parse::<GeoJson>()? else {
        return Err(LoadError::NotFeatureCollection);
    };

    let mut builder = MemoryAtlasBuilder::new();

    for (index, feature) in collection.features.into_iter().enumerate() {
        let properties = feature
            .properties
            .ok_or(LoadError::Missing {
                index,
                what: "properties",
            })?;
        let properties: FeatureProperties =
            serde_json::from_value(Value::Object(properties))?;
        let geometry = feature.geometry.ok_or(LoadError::Missing {
            index,
            what: "geometry",
        })?;
        let geometry: geo::Geometry<f64> = geometry.try_into()?;

        let kind = properties.kind;
        let id = properties.id;
        let osm_id = properties.osm_id.unwrap_or_else(|| id.abs());
        let tags = to_tags(properties.tags);

        builder = match (kind, geometry) {
            (FeatureKind::Edge, geo::Geometry::LineString(line)) => {
                let polyline = PolyLine::new(to_locations(index, line.coords())?);
                match (properties.start_node, properties.end_node) {
                    (Some(start_node), Some(end_node)) => builder.feature(Feature::Edge(Edge {
                        id,
                        osm_id,
                        polyline,
                        tags,
                        relations: BTreeSet::new(),
                        start_node,
                        end_node,
                    })),
                    _ => builder.edge(id, osm_id, polyline, tags),
                }
            }
            (FeatureKind::Line, geo::Geometry::LineString(line)) => {
                builder.line(id, osm_id, to_locations(index, line.coords())?, tags)
            }
            (FeatureKind::Area, geo::Geometry::Polygon(polygon)) => builder.area(
                id,
                osm_id,
                to_locations(index, polygon.exterior().coords())?,
                tags,
            ),
            (FeatureKind::Node | FeatureKind::Point, geo::Geometry::Point(point)) => {
                let location = to_locations(index, std::iter::once(&point.0))?
                    .pop()
                    .ok_or(LoadError::NonFiniteCoordinate { index })?;
                if kind == FeatureKind::Node {
                    builder.node(id, osm_id, location, tags)
                } else {
                    builder.point(id, osm_id, location, tags)
                }
            }
            (kind, _) => {
                return Err(LoadError::UnsupportedGeometry {
                    index,
                    kind,
                    expected: match kind {
                        FeatureKind::Edge | FeatureKind::Line => "LineString",
                        FeatureKind::Area => "Polygon",
                        FeatureKind::Node | FeatureKind::Point => "Point",
                    },
                });
            }
        };
    }

    if let Some(raw) = collection
        .foreign_members
        .and_then(|mut members| members.remove("relations"))
    {
        let records: Vec<RelationRecord> = serde_json::from_value(raw)?;
        for record in records {
            let members = record
                .members
                .into_iter()
                .map(|member| RelationMember {
                    role: member.role,
                    member: FeatureKey::new(member.kind, member.id),
                })
                .collect();
            builder = builder.relation(
                record.id,
                record.osm_id.unwrap_or(record.id),
                to_tags(record.tags),
                members,
            );
        }
    }

    let atlas = builder.build()?;
    log::info!(
        "Loaded partition with {} features and {} relations",
        atlas.features().len(),
        atlas.relations().len()
    );
    Ok(atlas)
}

/// Reads and parses a partition file.
///
/// # Errors
///
/// * If the file cannot be read
/// * Any error from [`load_partition`]
pub fn load_partition_file(path: &Path) -> Result<MemoryAtlas, LoadError> {
    let json = std::fs::read_to_string(path)?;
    load_partition(&json)
}
