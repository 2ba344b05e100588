//! Roads that cross without a shared node or vertical separation.
//!
//! Invalid crossings chain edges into components: starting from one edge,
//! the walker follows every invalid crossing transitively. The
//! intersection points of a component are then clustered by distance and
//! each cluster becomes one flag, so a dense knot of bad crossings is
//! reported together while distant ones along the same roads are reported
//! separately. Every edge of a component computes the same component, so
//! the first one to claim it reports for all of them.

use std::collections::{BTreeMap, BTreeSet};

use topocheck_core::check::{Check, CheckContext, CheckError};
use topocheck_core::collector::collect_invalid_crossings;
use topocheck_core::ledger::{LedgerEntity, LedgerKey};
use topocheck_core::policy::{LayerRule, ValidityPolicy};
use topocheck_core::tags::{HighwayTag, LAYER, Navigability};
use topocheck_core::walker::{VisitedSet, walk};
use topocheck_core::{Instructions, TagFilter};
use topocheck_feature_models::{Feature, FeatureKey, FeatureKind, Location};
use topocheck_flag_models::Flag;

use crate::base::{CheckBase, join_osm_ids};
use crate::config::{CheckConfig, ConfigError, EdgeCrossingSettings};

pub const INSTRUCTIONS: &[&str] = &[concat!(
    "The roads with ids {0} invalidly cross each other. If two roads are crossing each other, ",
    "then they should have nodes at intersection locations unless they are explicitly marked ",
    "as crossing. Otherwise, crossing roads should have different layer tags."
)];

pub struct EdgeCrossingEdge {
    base: CheckBase,
    minimum: HighwayTag,
    maximum: HighwayTag,
    navigability: Navigability,
    crossing_navigability: Navigability,
    indoor: TagFilter,
    policy: ValidityPolicy,
    cluster_distance_meters: f64,
}

/// Two edges crossing invalidly, keyed with the smaller key first.
struct Crossing<'a> {
    edges: [&'a Feature; 2],
    locations: BTreeSet<Location>,
}

impl EdgeCrossingEdge {
    /// # Errors
    ///
    /// * If a highway class or filter is invalid
    /// * If `maximum_highway` is less important than `minimum_highway`
    /// * If the cluster distance is not a positive number
    pub fn new(config: &CheckConfig, settings: &EdgeCrossingSettings) -> Result<Self, ConfigError> {
        let minimum = config.highway(&settings.minimum_highway)?;
        let maximum = config.highway(&settings.maximum_highway)?;
        if !maximum.is_at_least(minimum) {
            return Err(config.invalid(format!(
                "maximum_highway {maximum} is less important than minimum_highway {minimum}"
            )));
        }
        if !settings.cluster_distance_meters.is_finite() || settings.cluster_distance_meters <= 0.0
        {
            return Err(config.invalid(format!(
                "cluster_distance_meters must be positive, got {}",
                settings.cluster_distance_meters
            )));
        }

        let policy = ValidityPolicy::new().with_layer_rule(LayerRule {
            key: LAYER.to_string(),
            default: (!settings.explicit_layers_only).then_some(settings.layer_default),
        });

        Ok(Self {
            base: CheckBase::new(config, INSTRUCTIONS)?,
            minimum,
            maximum,
            navigability: settings.navigability,
            crossing_navigability: settings.crossing_navigability,
            indoor: config.exclusion_filter(&settings.indoor_filter)?,
            policy,
            cluster_distance_meters: settings.cluster_distance_meters,
        })
    }

    fn qualifies(&self, feature: &Feature, navigability: Navigability) -> bool {
        feature.is_main_edge()
            && HighwayTag::of(feature).is_some_and(|highway| {
                highway != HighwayTag::Crossing
                    && highway.is_between(self.minimum, self.maximum)
                    && navigability.admits(highway)
            })
            && !feature.tags().contains_key("area")
            && !self.indoor.matches(feature.tags())
    }

    /// Whether a crossing between `a` and `b` is reportable. Symmetric, so
    /// every edge of a component discovers the same component.
    fn reportable_pair(&self, a: &Feature, b: &Feature) -> bool {
        a.osm_id() != b.osm_id()
            && ((self.qualifies(a, self.navigability) && self.qualifies(b, self.crossing_navigability))
                || (self.qualifies(b, self.navigability)
                    && self.qualifies(a, self.crossing_navigability)))
    }
}

impl Check for EdgeCrossingEdge {
    fn id(&self) -> &str {
        &self.base.id
    }

    fn instructions(&self) -> &Instructions {
        &self.base.instructions
    }

    fn tags_filter(&self) -> &TagFilter {
        &self.base.tags_filter
    }

    fn feature_kinds(&self) -> &[FeatureKind] {
        &[FeatureKind::Edge]
    }

    fn validate_feature(&self, feature: &Feature) -> bool {
        self.qualifies(feature, self.navigability)
    }

    fn check_feature<'a>(
        &self,
        context: &CheckContext<'a>,
        feature: &'a Feature,
    ) -> Result<Vec<Flag>, CheckError> {
        let gateway = context.gateway;
        let mut crossings: BTreeMap<(FeatureKey, FeatureKey), Crossing<'a>> = BTreeMap::new();
        let mut visited = VisitedSet::new();

        let component = walk(
            feature,
            |edge| {
                let found = collect_invalid_crossings(
                    gateway,
                    edge,
                    &[FeatureKind::Edge],
                    &|other| self.reportable_pair(edge, other),
                    &self.policy,
                );
                let next: Vec<&'a Feature> = found.iter().map(|crossing| crossing.feature).collect();
                for crossing in found {
                    let edges = if edge.key() < crossing.feature.key() {
                        [edge, crossing.feature]
                    } else {
                        [crossing.feature, edge]
                    };
                    crossings
                        .entry((edges[0].key(), edges[1].key()))
                        .or_insert_with(|| Crossing {
                            edges,
                            locations: BTreeSet::new(),
                        })
                        .locations
                        .extend(crossing.locations);
                }
                next
            },
            &mut visited,
        );

        if crossings.is_empty()
            || !context
                .ledger
                .try_claim(LedgerKey::component(component.values().copied()))
        {
            return Ok(Vec::new());
        }
        log::debug!(
            "{}: component of {} edges with {} invalid crossing(s) from {}",
            self.id(),
            component.len(),
            crossings.len(),
            feature.key()
        );

        let crossings: Vec<Crossing<'a>> = crossings.into_values().collect();
        let mut flags = Vec::new();
        for cluster in cluster_crossings(&crossings, self.cluster_distance_meters) {
            let mut members: BTreeMap<FeatureKey, &Feature> = BTreeMap::new();
            let mut points = BTreeSet::new();
            for (index, locations) in cluster {
                for edge in crossings[index].edges {
                    members.insert(edge.key(), edge);
                }
                points.extend(locations);
            }

            let key = cluster_key(members.values().copied(), &points);
            if !context.ledger.try_claim(key.clone()) {
                continue;
            }
            flags.push(
                self.flag()
                    .instruction(0, &[join_osm_ids(members.values().copied())])
                    .members(members.values().copied())
                    .points(points)
                    .build(&key)?,
            );
        }

        Ok(flags)
    }
}

/// Identity of a cluster: its member edges and its first point.
fn cluster_key<'f>(
    members: impl IntoIterator<Item = &'f Feature>,
    points: &BTreeSet<Location>,
) -> LedgerKey {
    let members: Vec<String> = members
        .into_iter()
        .map(|feature| LedgerEntity::from(feature).to_string())
        .collect();
    let anchor = points
        .first()
        .map_or_else(String::new, ToString::to_string);
    LedgerKey::Composite(format!("{}@{anchor}", members.join(",")))
}

/// Groups intersection points by single linkage: two points share a
/// cluster when a chain of points, each within `max_distance` meters of the
/// next, connects them.
///
/// Returns, per cluster, the crossings it touches with the locations of
/// that crossing inside the cluster. Clusters are ordered by their first
/// point.
fn cluster_crossings(
    crossings: &[Crossing<'_>],
    max_distance: f64,
) -> Vec<BTreeMap<usize, BTreeSet<Location>>> {
    let points: Vec<(Location, usize)> = crossings
        .iter()
        .enumerate()
        .flat_map(|(index, crossing)| crossing.locations.iter().map(move |&l| (l, index)))
        .collect();

    let mut assigned = vec![false; points.len()];
    let mut clusters = Vec::new();
    for start in 0..points.len() {
        if assigned[start] {
            continue;
        }
        assigned[start] = true;
        let mut stack = vec![start];
        let mut cluster: BTreeMap<usize, BTreeSet<Location>> = BTreeMap::new();
        while let Some(current) = stack.pop() {
            let (location, crossing) = points[current];
            cluster.entry(crossing).or_default().insert(location);
            for (other, &(candidate, _)) in points.iter().enumerate() {
                if !assigned[other] && location.distance_meters(candidate) <= max_distance {
                    assigned[other] = true;
                    stack.push(other);
                }
            }
        }
        clusters.push(cluster);
    }

    clusters.sort_by_key(|cluster| cluster.values().flatten().min().copied());
    clusters
}

#[cfg(test)]
mod tests {
    use topocheck_feature_models::Tags;
    use topocheck_gateway::{MemoryAtlas, TopologyGateway};

    use super::*;
    use crate::config::CheckSettings;
    use crate::testing::{config, loc, run, run_parallel, tags};

    fn check() -> EdgeCrossingEdge {
        let config = config("edge_crossing_edge", "");
        let CheckSettings::EdgeCrossingEdge(settings) = &config.check else {
            unreachable!()
        };
        EdgeCrossingEdge::new(&config, settings).unwrap()
    }

    fn motorway() -> Tags {
        tags(&[("highway", "motorway")])
    }

    #[test]
    fn motorways_crossing_without_node_are_flagged_once() {
        let atlas = MemoryAtlas::builder()
            .edge(1, 1, vec![loc(0, -1000), loc(0, 1000)], motorway())
            .edge(2, 2, vec![loc(-1000, 0), loc(1000, 0)], motorway())
            .build()
            .unwrap();

        let flags = run(&check(), &atlas);
        assert_eq!(flags.len(), 1, "the pair is reported once, not per edge");
        assert_eq!(flags[0].members.len(), 2);
        assert_eq!(flags[0].points.iter().copied().collect::<Vec<_>>(), vec![loc(0, 0)]);
        assert!(flags[0].instructions[0].starts_with("The roads with ids 1, 2 invalidly"));
    }

    #[test]
    fn empty_indoor_filter_excludes_nothing() {
        let atlas = MemoryAtlas::builder()
            .edge(1, 1, vec![loc(0, -1000), loc(0, 1000)], motorway())
            .edge(2, 2, vec![loc(-1000, 0), loc(1000, 0)], motorway())
            .build()
            .unwrap();

        let config = config("edge_crossing_edge", "indoor_filter = \"\"");
        let check = crate::build_check(&config).unwrap();
        assert_eq!(run(check.as_ref(), &atlas).len(), 1);
    }

    #[test]
    fn shared_vertex_is_not_flagged() {
        let atlas = MemoryAtlas::builder()
            .edge(1, 1, vec![loc(0, -1000), loc(0, 0), loc(0, 1000)], motorway())
            .edge(2, 2, vec![loc(-1000, 0), loc(0, 0), loc(1000, 0)], motorway())
            .build()
            .unwrap();

        assert!(run(&check(), &atlas).is_empty());
    }

    #[test]
    fn layer_difference_is_not_flagged() {
        let atlas = MemoryAtlas::builder()
            .edge(1, 1, vec![loc(0, -1000), loc(0, 1000)], motorway())
            .edge(
                2,
                2,
                vec![loc(-1000, 0), loc(1000, 0)],
                tags(&[("highway", "motorway"), ("layer", "1")]),
            )
            .build()
            .unwrap();

        assert!(run(&check(), &atlas).is_empty());
    }

    #[test]
    fn sub_edges_of_one_way_do_not_cross_each_other() {
        let atlas = MemoryAtlas::builder()
            .edge(1, 7, vec![loc(0, -1000), loc(0, 1000)], motorway())
            .edge(2, 7, vec![loc(-1000, 0), loc(1000, 0)], motorway())
            .build()
            .unwrap();

        assert!(run(&check(), &atlas).is_empty());
    }

    #[test]
    fn distant_crossings_form_separate_clusters() {
        // ~0.11 km apart at the first pair, ~11 km to the second
        let atlas = MemoryAtlas::builder()
            .edge(1, 1, vec![loc(0, -1000), loc(0, 1_000_000)], motorway())
            .edge(2, 2, vec![loc(-1000, 0), loc(1000, 0)], motorway())
            .edge(3, 3, vec![loc(-1000, 10_000), loc(1000, 10_000)], motorway())
            .edge(4, 4, vec![loc(-1000, 990_000), loc(1000, 990_000)], motorway())
            .build()
            .unwrap();

        let flags = run(&check(), &atlas);
        assert_eq!(flags.len(), 2, "{flags:?}");
        assert_eq!(flags[0].members.len(), 3, "edges 1, 2 and 3 cross within 500 m");
        assert_eq!(flags[1].members.len(), 2);
        assert!(flags[1].has_member_id(4));
    }

    #[test]
    fn chained_crossings_are_order_independent() {
        let mut builder = MemoryAtlas::builder();
        for i in 0..6_i64 {
            builder = builder
                .edge(i + 1, i + 1, vec![loc(i * 100, -1000), loc(i * 100, 1000)], motorway())
                .edge(i + 101, i + 101, vec![loc(-100, i * 50), loc(1000, i * 50)], motorway());
        }
        let atlas = builder.build().unwrap();

        let sequential = run(&check(), &atlas);
        let parallel = run_parallel(&check(), &atlas);
        assert_eq!(sequential, parallel);
        assert_eq!(sequential.len(), 1);
        assert_eq!(sequential[0].members.len(), 12);
        assert!(atlas.feature(FeatureKey::edge(101)).is_some());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let config = config(
            "edge_crossing_edge",
            "minimum_highway = \"motorway\"\nmaximum_highway = \"residential\"",
        );
        assert!(matches!(
            crate::build_check(&config),
            Err(ConfigError::InvalidThreshold { .. })
        ));
    }
}
