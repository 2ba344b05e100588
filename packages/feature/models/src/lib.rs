#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Map feature, relation, and geometry types.
//!
//! A partition of map data is a set of [`Feature`]s (edges, lines, areas,
//! nodes, points) plus the [`Relation`]s that group them. Every type here
//! is an immutable value: features are produced by a topology gateway and
//! only ever read by the checks.

pub mod geometry;
pub mod location;
pub mod tags;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use geometry::{PolyLine, Polygon};
pub use location::{BoundingBox, Location};
pub use tags::Tags;

/// The class of a feature.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeatureKind {
    /// A routable, directed, way-sectioned road segment.
    Edge,
    /// A non-routable linear feature (power line, boundary way, waterway).
    Line,
    /// A closed areal feature (building, lake).
    Area,
    /// A routing-graph vertex where edges meet.
    Node,
    /// A standalone tagged point.
    Point,
}

impl FeatureKind {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Edge, Self::Line, Self::Area, Self::Node, Self::Point]
    }
}

/// Unique handle of a feature within one partition. Identifiers are only
/// unique per kind, so the kind is part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureKey {
    pub kind: FeatureKind,
    pub id: i64,
}

impl FeatureKey {
    #[must_use]
    pub const fn new(kind: FeatureKind, id: i64) -> Self {
        Self { kind, id }
    }

    #[must_use]
    pub const fn edge(id: i64) -> Self {
        Self::new(FeatureKind::Edge, id)
    }

    #[must_use]
    pub const fn node(id: i64) -> Self {
        Self::new(FeatureKind::Node, id)
    }
}

impl std::fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind, self.id)
    }
}

/// Kind of anything that can be a flag member.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    Edge,
    Line,
    Area,
    Node,
    Point,
    Relation,
}

impl From<FeatureKind> for EntityKind {
    fn from(kind: FeatureKind) -> Self {
        match kind {
            FeatureKind::Edge => Self::Edge,
            FeatureKind::Line => Self::Line,
            FeatureKind::Area => Self::Area,
            FeatureKind::Node => Self::Node,
            FeatureKind::Point => Self::Point,
        }
    }
}

/// Identity of a feature or relation as reported in a flag: the partition
/// identifier plus the stable OSM identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: i64,
    pub osm_id: i64,
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind, self.id)
    }
}

/// A way-sectioned, directed road segment between two nodes.
///
/// Bidirectional ways are represented by two edges with opposite-signed
/// identifiers; the positive one is the main edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: i64,
    pub osm_id: i64,
    pub polyline: PolyLine,
    pub tags: Tags,
    #[serde(default)]
    pub relations: BTreeSet<i64>,
    pub start_node: i64,
    pub end_node: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub id: i64,
    pub osm_id: i64,
    pub polyline: PolyLine,
    pub tags: Tags,
    #[serde(default)]
    pub relations: BTreeSet<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    pub id: i64,
    pub osm_id: i64,
    pub polygon: Polygon,
    pub tags: Tags,
    #[serde(default)]
    pub relations: BTreeSet<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: i64,
    pub osm_id: i64,
    pub location: Location,
    pub tags: Tags,
    #[serde(default)]
    pub relations: BTreeSet<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    pub id: i64,
    pub osm_id: i64,
    pub location: Location,
    pub tags: Tags,
    #[serde(default)]
    pub relations: BTreeSet<i64>,
}

/// One geographic entity of a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Feature {
    Edge(Edge),
    Line(Line),
    Area(Area),
    Node(Node),
    Point(Point),
}

impl Feature {
    #[must_use]
    pub const fn kind(&self) -> FeatureKind {
        match self {
            Self::Edge(_) => FeatureKind::Edge,
            Self::Line(_) => FeatureKind::Line,
            Self::Area(_) => FeatureKind::Area,
            Self::Node(_) => FeatureKind::Node,
            Self::Point(_) => FeatureKind::Point,
        }
    }

    /// Partition identifier (sub-edge identifier for edges).
    #[must_use]
    pub const fn id(&self) -> i64 {
        match self {
            Self::Edge(f) => f.id,
            Self::Line(f) => f.id,
            Self::Area(f) => f.id,
            Self::Node(f) => f.id,
            Self::Point(f) => f.id,
        }
    }

    /// Stable OSM identifier, shared by all sub-edges of one way.
    #[must_use]
    pub const fn osm_id(&self) -> i64 {
        match self {
            Self::Edge(f) => f.osm_id,
            Self::Line(f) => f.osm_id,
            Self::Area(f) => f.osm_id,
            Self::Node(f) => f.osm_id,
            Self::Point(f) => f.osm_id,
        }
    }

    #[must_use]
    pub const fn key(&self) -> FeatureKey {
        FeatureKey::new(self.kind(), self.id())
    }

    #[must_use]
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            kind: self.kind().into(),
            id: self.id(),
            osm_id: self.osm_id(),
        }
    }

    #[must_use]
    pub const fn tags(&self) -> &Tags {
        match self {
            Self::Edge(f) => &f.tags,
            Self::Line(f) => &f.tags,
            Self::Area(f) => &f.tags,
            Self::Node(f) => &f.tags,
            Self::Point(f) => &f.tags,
        }
    }

    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags().get(key)
    }

    /// Identifiers of the relations this feature is a member of.
    #[must_use]
    pub const fn relations(&self) -> &BTreeSet<i64> {
        match self {
            Self::Edge(f) => &f.relations,
            Self::Line(f) => &f.relations,
            Self::Area(f) => &f.relations,
            Self::Node(f) => &f.relations,
            Self::Point(f) => &f.relations,
        }
    }

    /// Geometry vertices: the polyline for edges and lines, the ring for
    /// areas, a single location for nodes and points.
    #[must_use]
    pub fn locations(&self) -> &[Location] {
        match self {
            Self::Edge(f) => f.polyline.locations(),
            Self::Line(f) => f.polyline.locations(),
            Self::Area(f) => f.polygon.locations(),
            Self::Node(f) => std::slice::from_ref(&f.location),
            Self::Point(f) => std::slice::from_ref(&f.location),
        }
    }

    /// Whether `location` is an explicit vertex of this feature.
    #[must_use]
    pub fn has_vertex(&self, location: Location) -> bool {
        self.locations().contains(&location)
    }

    #[must_use]
    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_locations(self.locations())
    }

    #[must_use]
    pub const fn as_edge(&self) -> Option<&Edge> {
        match self {
            Self::Edge(edge) => Some(edge),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_area(&self) -> Option<&Area> {
        match self {
            Self::Area(area) => Some(area),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_node(&self) -> Option<&Node> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Edges and lines.
    #[must_use]
    pub const fn is_line_item(&self) -> bool {
        matches!(self, Self::Edge(_) | Self::Line(_))
    }

    /// The positive-identifier direction of an edge. Always `false` for
    /// non-edges.
    #[must_use]
    pub const fn is_main_edge(&self) -> bool {
        matches!(self, Self::Edge(edge) if edge.id > 0)
    }
}

/// A member reference inside a [`Relation`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationMember {
    /// Role string (e.g. `"outer"`, `"from"`, `"intersection"`).
    pub role: String,
    pub member: FeatureKey,
}

/// A typed aggregate of member features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub id: i64,
    pub osm_id: i64,
    pub tags: Tags,
    pub members: Vec<RelationMember>,
}

impl Relation {
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key)
    }

    /// Value of the `type` tag.
    #[must_use]
    pub fn relation_type(&self) -> Option<&str> {
        self.tag("type")
    }

    #[must_use]
    pub fn is_type(&self, relation_type: &str) -> bool {
        self.relation_type()
            .is_some_and(|t| t.eq_ignore_ascii_case(relation_type))
    }

    #[must_use]
    pub fn is_multipolygon(&self) -> bool {
        self.is_type("multipolygon")
    }

    #[must_use]
    pub fn has_member(&self, key: FeatureKey) -> bool {
        self.members.iter().any(|m| m.member == key)
    }

    /// Member keys of the given kinds, in member order.
    pub fn members_of_kind<'a>(
        &'a self,
        kinds: &'a [FeatureKind],
    ) -> impl Iterator<Item = FeatureKey> + 'a {
        self.members
            .iter()
            .map(|m| m.member)
            .filter(move |key| kinds.contains(&key.kind))
    }

    #[must_use]
    pub const fn entity_ref(&self) -> EntityRef {
        EntityRef {
            kind: EntityKind::Relation,
            id: self.id,
            osm_id: self.osm_id,
        }
    }
}
