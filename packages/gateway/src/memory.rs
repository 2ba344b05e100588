//! R-tree backed in-memory partition.

use std::collections::{BTreeMap, BTreeSet};

use rstar::{AABB, RTree, RTreeObject};
use topocheck_feature_models::{
    Area, BoundingBox, Edge, Feature, FeatureKey, FeatureKind, Line, Location, Node, Point,
    PolyLine, Polygon, Relation, RelationMember, Tags,
};

use crate::intersect::{self, GeometryError};
use crate::{LoadError, TopologyGateway};

/// A feature envelope stored in the R-tree.
struct IndexEntry {
    key: FeatureKey,
    envelope: AABB<[i64; 2]>,
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[i64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn to_envelope(bounds: &BoundingBox) -> AABB<[i64; 2]> {
    AABB::from_corners(
        [bounds.lower.lon_dm7, bounds.lower.lat_dm7],
        [bounds.upper.lon_dm7, bounds.upper.lat_dm7],
    )
}

/// An immutable partition held entirely in memory.
pub struct MemoryAtlas {
    features: Vec<Feature>,
    positions: BTreeMap<FeatureKey, usize>,
    relations: Vec<Relation>,
    relation_positions: BTreeMap<i64, usize>,
    index: RTree<IndexEntry>,
    /// node id -> edges ending there
    inbound: BTreeMap<i64, Vec<FeatureKey>>,
    /// node id -> edges starting there
    outbound: BTreeMap<i64, Vec<FeatureKey>>,
    /// Areas whose ring failed validation at build time.
    faulty_areas: BTreeMap<FeatureKey, GeometryError>,
}

impl MemoryAtlas {
    #[must_use]
    pub fn builder() -> MemoryAtlasBuilder {
        MemoryAtlasBuilder::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// The intersectable outline of a feature, using the area validation
    /// done at build time.
    fn outline(&self, feature: &Feature) -> Result<PolyLine, GeometryError> {
        if let Some(fault) = self.faulty_areas.get(&feature.key()) {
            return Err(fault.clone());
        }
        intersect::outline(feature)
    }

    fn resolve(&self, keys: Option<&Vec<FeatureKey>>) -> Vec<&Feature> {
        keys.map(|keys| keys.iter().filter_map(|&key| self.feature(key)).collect())
            .unwrap_or_default()
    }
}

impl TopologyGateway for MemoryAtlas {
    fn features(&self) -> &[Feature] {
        &self.features
    }

    fn relations(&self) -> &[Relation] {
        &self.relations
    }

    fn feature(&self, key: FeatureKey) -> Option<&Feature> {
        self.positions.get(&key).map(|&i| &self.features[i])
    }

    fn relation(&self, id: i64) -> Option<&Relation> {
        self.relation_positions.get(&id).map(|&i| &self.relations[i])
    }

    fn features_intersecting(
        &self,
        bounds: &BoundingBox,
        kinds: &[FeatureKind],
        predicate: &dyn Fn(&Feature) -> bool,
    ) -> Vec<&Feature> {
        let keys: BTreeSet<FeatureKey> = self
            .index
            .locate_in_envelope_intersecting(&to_envelope(bounds))
            .map(|entry| entry.key)
            .filter(|key| kinds.contains(&key.kind))
            .collect();

        keys.into_iter()
            .filter_map(|key| self.feature(key))
            .filter(|feature| predicate(feature))
            .collect()
    }

    fn edges_at(&self, node: i64) -> (Vec<&Feature>, Vec<&Feature>) {
        (
            self.resolve(self.inbound.get(&node)),
            self.resolve(self.outbound.get(&node)),
        )
    }

    fn nodes_of(&self, edge: &Feature) -> (Option<&Feature>, Option<&Feature>) {
        edge.as_edge().map_or((None, None), |edge| {
            (
                self.feature(FeatureKey::node(edge.start_node)),
                self.feature(FeatureKey::node(edge.end_node)),
            )
        })
    }

    fn intersection_locations(
        &self,
        a: &Feature,
        b: &Feature,
    ) -> Result<BTreeSet<Location>, GeometryError> {
        Ok(intersect::polyline_intersections(
            &self.outline(a)?,
            &self.outline(b)?,
        ))
    }
}

/// An edge whose end nodes may still need to be resolved from node
/// locations.
struct PendingEdge {
    edge: Edge,
    infer_nodes: bool,
}

/// Collects features and relations, then indexes them into a
/// [`MemoryAtlas`].
#[derive(Default)]
pub struct MemoryAtlasBuilder {
    edges: Vec<PendingEdge>,
    others: Vec<Feature>,
    relations: Vec<Relation>,
}

impl MemoryAtlasBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fully specified feature. Edge start and end nodes are taken
    /// as given.
    #[must_use]
    pub fn feature(mut self, feature: Feature) -> Self {
        match feature {
            Feature::Edge(edge) => self.edges.push(PendingEdge {
                edge,
                infer_nodes: false,
            }),
            other => self.others.push(other),
        }
        self
    }

    /// Adds an edge whose start and end nodes are resolved at build time
    /// from the nodes at its first and last vertex. Missing nodes are
    /// created.
    #[must_use]
    pub fn edge(mut self, id: i64, osm_id: i64, polyline: impl Into<PolyLine>, tags: Tags) -> Self {
        self.edges.push(PendingEdge {
            edge: Edge {
                id,
                osm_id,
                polyline: polyline.into(),
                tags,
                relations: BTreeSet::new(),
                start_node: 0,
                end_node: 0,
            },
            infer_nodes: true,
        });
        self
    }

    #[must_use]
    pub fn line(self, id: i64, osm_id: i64, polyline: impl Into<PolyLine>, tags: Tags) -> Self {
        self.feature(Feature::Line(Line {
            id,
            osm_id,
            polyline: polyline.into(),
            tags,
            relations: BTreeSet::new(),
        }))
    }

    #[must_use]
    pub fn area(self, id: i64, osm_id: i64, ring: Vec<Location>, tags: Tags) -> Self {
        self.feature(Feature::Area(Area {
            id,
            osm_id,
            polygon: Polygon::new(ring),
            tags,
            relations: BTreeSet::new(),
        }))
    }

    #[must_use]
    pub fn node(self, id: i64, osm_id: i64, location: Location, tags: Tags) -> Self {
        self.feature(Feature::Node(Node {
            id,
            osm_id,
            location,
            tags,
            relations: BTreeSet::new(),
        }))
    }

    #[must_use]
    pub fn point(self, id: i64, osm_id: i64, location: Location, tags: Tags) -> Self {
        self.feature(Feature::Point(Point {
            id,
            osm_id,
            location,
            tags,
            relations: BTreeSet::new(),
        }))
    }

    #[must_use]
    pub fn relation(
        mut self,
        id: i64,
        osm_id: i64,
        tags: Tags,
        members: Vec<RelationMember>,
    ) -> Self {
        self.relations.push(Relation {
            id,
            osm_id,
            tags,
            members,
        });
        self
    }

    /// Resolves edge nodes, materializes relation membership on features,
    /// and builds the spatial index.
    ///
    /// # Errors
    ///
    /// * [`LoadError::DuplicateFeature`] if two features share a key
    /// * [`LoadError::DuplicateRelation`] if two relations share an id
    pub fn build(self) -> Result<MemoryAtlas, LoadError> {
        let Self {
            edges,
            others,
            relations,
        } = self;

        let mut by_key: BTreeMap<FeatureKey, Feature> = BTreeMap::new();
        for feature in others {
            let key = feature.key();
            if by_key.insert(key, feature).is_some() {
                return Err(LoadError::DuplicateFeature(key));
            }
        }

        let mut nodes_by_location: BTreeMap<Location, i64> = by_key
            .values()
            .filter_map(Feature::as_node)
            .map(|node| (node.location, node.id))
            .collect();
        let mut next_node_id = by_key
            .keys()
            .filter(|key| key.kind == FeatureKind::Node)
            .map(|key| key.id)
            .max()
            .unwrap_or(0)
            .max(0)
            + 1;

        let mut edges = edges;
        edges.sort_by_key(|pending| pending.edge.id.unsigned_abs());
        for PendingEdge {
            mut edge,
            infer_nodes,
        } in edges
        {
            if infer_nodes {
                let endpoints = (edge.polyline.first(), edge.polyline.last());
                if let (Some(first), Some(last)) = endpoints {
                    for (location, slot) in [(first, &mut edge.start_node), (last, &mut edge.end_node)] {
                        *slot = *nodes_by_location.entry(location).or_insert_with(|| {
                            let id = next_node_id;
                            next_node_id += 1;
                            by_key.insert(
                                FeatureKey::node(id),
                                Feature::Node(Node {
                                    id,
                                    osm_id: id,
                                    location,
                                    tags: Tags::new(),
                                    relations: BTreeSet::new(),
                                }),
                            );
                            id
                        });
                    }
                }
            }

            let key = FeatureKey::edge(edge.id);
            if by_key.insert(key, Feature::Edge(edge)).is_some() {
                return Err(LoadError::DuplicateFeature(key));
            }
        }

        let mut relation_positions = BTreeMap::new();
        let mut relations = relations;
        relations.sort_by_key(|relation| relation.id);
        for (position, relation) in relations.iter().enumerate() {
            if relation_positions.insert(relation.id, position).is_some() {
                return Err(LoadError::DuplicateRelation(relation.id));
            }
            for member in &relation.members {
                match by_key.get_mut(&member.member) {
                    Some(feature) => {
                        relations_mut(feature).insert(relation.id);
                    }
                    None => log::warn!(
                        "Relation {} references {} which is not in the partition",
                        relation.id,
                        member.member
                    ),
                }
            }
        }

        let features: Vec<Feature> = by_key.into_values().collect();
        let positions = features
            .iter()
            .enumerate()
            .map(|(position, feature)| (feature.key(), position))
            .collect();

        let mut inbound: BTreeMap<i64, Vec<FeatureKey>> = BTreeMap::new();
        let mut outbound: BTreeMap<i64, Vec<FeatureKey>> = BTreeMap::new();
        for edge in features.iter().filter_map(Feature::as_edge) {
            let key = FeatureKey::edge(edge.id);
            inbound.entry(edge.end_node).or_default().push(key);
            outbound.entry(edge.start_node).or_default().push(key);
        }

        let faulty_areas: BTreeMap<FeatureKey, GeometryError> = features
            .iter()
            .filter_map(Feature::as_area)
            .filter_map(|area| {
                intersect::validate_area(area)
                    .err()
                    .map(|fault| (FeatureKey::new(FeatureKind::Area, area.id), fault))
            })
            .collect();
        if !faulty_areas.is_empty() {
            log::warn!(
                "{} area(s) have unusable rings and are excluded from intersection tests",
                faulty_areas.len()
            );
        }

        let entries = features
            .iter()
            .filter_map(|feature| {
                feature.bounds().map(|bounds| IndexEntry {
                    key: feature.key(),
                    envelope: to_envelope(&bounds),
                })
            })
            .collect();

        log::debug!(
            "Indexed {} features and {} relations",
            features.len(),
            relations.len()
        );

        Ok(MemoryAtlas {
            features,
            positions,
            relations,
            relation_positions,
            index: RTree::bulk_load(entries),
            inbound,
            outbound,
            faulty_areas,
        })
    }
}

fn relations_mut(feature: &mut Feature) -> &mut BTreeSet<i64> {
    match feature {
        Feature::Edge(f) => &mut f.relations,
        Feature::Line(f) => &mut f.relations,
        Feature::Area(f) => &mut f.relations,
        Feature::Node(f) => &mut f.relations,
        Feature::Point(f) => &mut f.relations,
    }
}
