#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Read-only access to one partition of map data.
//!
//! [`TopologyGateway`] is the only way checks see features: bounding-box
//! queries, intersection points, relation lookup, and routing-graph
//! adjacency. [`MemoryAtlas`] is the R-tree backed implementation, built
//! either programmatically through [`MemoryAtlasBuilder`] or from a
//! `GeoJSON` partition file via [`partition::load_partition`].

pub mod intersect;
pub mod memory;
pub mod partition;

use std::collections::BTreeSet;

use topocheck_feature_models::{
    BoundingBox, Feature, FeatureKey, FeatureKind, Location, Relation,
};

pub use intersect::GeometryError;
pub use memory::{MemoryAtlas, MemoryAtlasBuilder};
pub use partition::LoadError;

/// Topology queries over one partition. Shared read-only across worker
/// threads.
pub trait TopologyGateway: Send + Sync {
    /// Every feature, ordered by key.
    fn features(&self) -> &[Feature];

    /// Every relation, ordered by identifier.
    fn relations(&self) -> &[Relation];

    fn feature(&self, key: FeatureKey) -> Option<&Feature>;

    fn relation(&self, id: i64) -> Option<&Relation>;

    /// Features of the given kinds whose bounds intersect `bounds` and
    /// that satisfy `predicate`, ordered by key.
    fn features_intersecting(
        &self,
        bounds: &BoundingBox,
        kinds: &[FeatureKind],
        predicate: &dyn Fn(&Feature) -> bool,
    ) -> Vec<&Feature>;

    /// Edges ending at `node` (inbound) and starting at `node` (outbound),
    /// each ordered by key.
    fn edges_at(&self, node: i64) -> (Vec<&Feature>, Vec<&Feature>);

    /// Start and end nodes of an edge. `None` for non-edges or nodes
    /// missing from the partition.
    fn nodes_of(&self, edge: &Feature) -> (Option<&Feature>, Option<&Feature>);

    /// Locations where the linear geometries of `a` and `b` meet.
    ///
    /// # Errors
    ///
    /// * If either geometry is degenerate or not linear
    fn intersection_locations(
        &self,
        a: &Feature,
        b: &Feature,
    ) -> Result<BTreeSet<Location>, GeometryError> {
        intersect::intersection_locations(a, b)
    }

    /// Relations the feature is a member of that exist in this partition.
    fn relations_of(&self, feature: &Feature) -> Vec<&Relation> {
        feature
            .relations()
            .iter()
            .filter_map(|&id| self.relation(id))
            .collect()
    }

    /// Routing-graph neighbours: for an edge, every other edge sharing its
    /// start or end node; for a node, its incident edges; nothing otherwise.
    fn connected_features(&self, feature: &Feature) -> Vec<&Feature> {
        match feature {
            Feature::Edge(edge) => {
                let mut keys = BTreeSet::new();
                for node in [edge.start_node, edge.end_node] {
                    let (inbound, outbound) = self.edges_at(node);
                    keys.extend(
                        inbound
                            .into_iter()
                            .chain(outbound)
                            .map(Feature::key)
                            .filter(|key| *key != feature.key()),
                    );
                }
                keys.into_iter().filter_map(|key| self.feature(key)).collect()
            }
            Feature::Node(node) => {
                let (inbound, outbound) = self.edges_at(node.id);
                let keys: BTreeSet<FeatureKey> =
                    inbound.into_iter().chain(outbound).map(Feature::key).collect();
                keys.into_iter().filter_map(|key| self.feature(key)).collect()
            }
            Feature::Line(_) | Feature::Area(_) | Feature::Point(_) => Vec::new(),
        }
    }
}
