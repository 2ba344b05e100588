//! At-grade junctions of major roads that lack destination sign relations
//! or destination tags.

use std::collections::{BTreeMap, BTreeSet};

use topocheck_core::check::{Check, CheckContext, CheckError};
use topocheck_core::ledger::LedgerKey;
use topocheck_core::tags::{
    HighwayTag, is_explicitly_two_way, is_roundabout, layer_or_zero, level_or,
};
use topocheck_core::walker::{VisitedSet, walk};
use topocheck_core::{Instructions, TagFilter};
use topocheck_feature_models::{Feature, FeatureKey, FeatureKind, Relation};
use topocheck_flag_models::Flag;

use crate::base::{CheckBase, join_ids, join_osm_ids};
use crate::config::{CheckConfig, ConfigError, SignPostSettings};

pub const INSTRUCTIONS: &[&str] = &[
    concat!(
        "Node {0} forms an at-grade junction but is not part of a destination sign relation. ",
        "Verify and create a destination sign relation with the node as \"intersection\" member ",
        "and following connected edges {1}, as \"to\" and \"from\" members."
    ),
    concat!(
        "Node {0} form an at-grade junction. It is part of destination sign relation(s): {1} ",
        "but the relation(s) are missing \"destination\" tags."
    ),
    concat!(
        "Node {0} forms an at-grade junction and is part of destination sign relation(s). ",
        "But the following connected edges {1} could also form destination sign relations ",
        "with this node. Create new destination sign relation with these edges and the node."
    ),
    concat!(
        "Node {0} is part of a roundabout and forms an at-grade junction with connected edges. ",
        "Add destination sign relations with the node as \"intersection\" member and following ",
        "connected edges {1}, as \"to\" and \"from\" members and add destination sign tag to ",
        "the connected edges."
    ),
];

const MISSING_RELATION: usize = 0;
const MISSING_RELATION_TAG: usize = 1;
const MISSING_EDGES: usize = 2;
const ROUNDABOUT: usize = 3;

const DESTINATION: &str = "destination";
const DESTINATION_FORWARD: &str = "destination:forward";
const DEFAULT_LEVEL: &str = "0";

pub struct AtGradeSignPost {
    base: CheckBase,
    connected: BTreeMap<HighwayTag, BTreeSet<HighwayTag>>,
    relation_type: String,
    minimum_valence: usize,
}

/// An inbound edge with the outbound edges it may lead to.
struct Pair<'a> {
    inbound: &'a Feature,
    outbound: Vec<&'a Feature>,
}

impl AtGradeSignPost {
    /// # Errors
    ///
    /// * If a highway class in `connected_highway_types` is unknown
    /// * If the configured `tags_filter` is malformed
    pub fn new(config: &CheckConfig, settings: &SignPostSettings) -> Result<Self, ConfigError> {
        let connected = settings
            .connected_highway_types
            .iter()
            .map(|(from, to)| {
                let targets = to
                    .iter()
                    .map(|value| config.highway(value))
                    .collect::<Result<BTreeSet<_>, _>>()?;
                Ok((config.highway(from)?, targets))
            })
            .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

        Ok(Self {
            base: CheckBase::new(config, INSTRUCTIONS)?,
            connected,
            relation_type: settings.relation_type.clone(),
            minimum_valence: settings.minimum_valence,
        })
    }

    fn is_junction_edge(&self, feature: &Feature) -> bool {
        feature.is_main_edge()
            && HighwayTag::of(feature).is_some_and(|highway| self.connected.contains_key(&highway))
    }

    fn allows(&self, inbound: &Feature, outbound: &Feature) -> bool {
        match (HighwayTag::of(inbound), HighwayTag::of(outbound)) {
            (Some(from), Some(to)) => self
                .connected
                .get(&from)
                .is_some_and(|targets| targets.contains(&to)),
            _ => false,
        }
    }

    /// Splits the node's junctions into plain pairs and roundabout pairs. A
    /// pair is a roundabout pair when one of its outbound edges continues
    /// the ring.
    fn pairs<'a>(
        &self,
        inbound: &[&'a Feature],
        outbound: &[&'a Feature],
    ) -> (Vec<Pair<'a>>, Vec<Pair<'a>>) {
        let mut plain = Vec::new();
        let mut roundabouts = Vec::new();

        for &edge in inbound {
            let level = level_or(edge.tags(), DEFAULT_LEVEL);
            let layer = layer_or_zero(edge.tags());
            let same_grade: Vec<&Feature> = outbound
                .iter()
                .copied()
                .filter(|out| {
                    out.osm_id() != edge.osm_id()
                        && level_or(out.tags(), DEFAULT_LEVEL) == level
                        && layer_or_zero(out.tags()) == layer
                })
                .collect();
            if same_grade.len() < 2 {
                continue;
            }

            let allowed: Vec<&Feature> = same_grade
                .into_iter()
                .filter(|out| self.allows(edge, out))
                .collect();
            if allowed.is_empty() {
                continue;
            }

            let pair = Pair {
                inbound: edge,
                outbound: allowed,
            };
            if pair.outbound.iter().any(|out| is_roundabout(out.tags())) {
                roundabouts.push(pair);
            } else {
                plain.push(pair);
            }
        }

        (plain, roundabouts)
    }
}

/// Two-way roads need the forward variant of the tag.
fn lacks_destination(edge: &Feature) -> bool {
    let key = if is_explicitly_two_way(edge.tags()) {
        DESTINATION_FORWARD
    } else {
        DESTINATION
    };
    !edge.tags().contains_key(key)
}

fn is_member_of_any(relations: &[&Relation], key: FeatureKey) -> bool {
    relations.iter().any(|relation| relation.has_member(key))
}

fn is_ring_edge(feature: &Feature) -> bool {
    feature.is_main_edge()
        && is_roundabout(feature.tags())
        && HighwayTag::of(feature).is_some_and(HighwayTag::is_car_navigable)
}

impl Check for AtGradeSignPost {
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
        &[FeatureKind::Node]
    }

    fn validate_feature(&self, feature: &Feature) -> bool {
        matches!(feature, Feature::Node(_))
    }

    fn check_feature<'a>(
        &self,
        context: &CheckContext<'a>,
        feature: &'a Feature,
    ) -> Result<Vec<Flag>, CheckError> {
        let gateway = context.gateway;

        let valence = gateway
            .connected_features(feature)
            .into_iter()
            .filter(|edge| edge.is_main_edge())
            .count();
        if valence < self.minimum_valence {
            return Ok(Vec::new());
        }

        let (inbound, outbound) = gateway.edges_at(feature.id());
        let inbound: Vec<&Feature> = inbound
            .into_iter()
            .filter(|edge| self.is_junction_edge(edge))
            .collect();
        let outbound: Vec<&Feature> = outbound
            .into_iter()
            .filter(|edge| self.is_junction_edge(edge))
            .collect();
        if inbound.is_empty() || outbound.len() < 2 {
            return Ok(Vec::new());
        }

        let (plain, roundabouts) = self.pairs(&inbound, &outbound);
        if plain.is_empty() && roundabouts.is_empty() {
            return Ok(Vec::new());
        }

        let key = LedgerKey::entity(feature);
        if !context.ledger.try_claim(key.clone()) {
            return Ok(Vec::new());
        }

        let relations: Vec<&Relation> = gateway
            .relations_of(feature)
            .into_iter()
            .filter(|relation| relation.is_type(&self.relation_type))
            .collect();
        let node_id = feature.osm_id().to_string();

        for pair in &roundabouts {
            let outbound = || pair.outbound.iter().copied();
            let (Some(ring_edge), Some(exit)) = (
                outbound().find(|edge| is_roundabout(edge.tags())),
                outbound().find(|edge| !is_roundabout(edge.tags())),
            ) else {
                continue;
            };

            let needs_flag = relations.is_empty()
                || lacks_destination(exit)
                || !is_member_of_any(&relations, exit.key());
            if !needs_flag {
                continue;
            }

            let mut visited = VisitedSet::new();
            let ring = walk(
                ring_edge,
                |edge| {
                    gateway
                        .connected_features(edge)
                        .into_iter()
                        .filter(|connected| is_ring_edge(connected))
                        .collect()
                },
                &mut visited,
            );
            let edges: Vec<&Feature> = ring
                .values()
                .copied()
                .chain(std::iter::once(exit))
                .collect();

            log::debug!("{}: roundabout junction at {key}", self.id());
            return Ok(vec![
                self.flag()
                    .instruction(ROUNDABOUT, &[node_id, join_osm_ids(edges.iter().copied())])
                    .member(feature)
                    .members(edges)
                    .build(&key)?,
            ]);
        }

        if plain.is_empty() {
            return Ok(Vec::new());
        }

        if relations.is_empty() {
            let edges: BTreeMap<FeatureKey, &Feature> = plain
                .iter()
                .flat_map(|pair| std::iter::once(pair.inbound).chain(pair.outbound.iter().copied()))
                .map(|edge| (edge.key(), edge))
                .collect();
            return Ok(vec![
                self.flag()
                    .instruction(
                        MISSING_RELATION,
                        &[node_id, join_osm_ids(edges.values().copied())],
                    )
                    .member(feature)
                    .members(edges.into_values())
                    .build(&key)?,
            ]);
        }

        let untagged: Vec<&Relation> = relations
            .iter()
            .copied()
            .filter(|relation| relation.tag(DESTINATION).is_none())
            .collect();
        if !untagged.is_empty() {
            let mut flag = self
                .flag()
                .instruction(
                    MISSING_RELATION_TAG,
                    &[node_id, join_ids(untagged.iter().map(|relation| relation.osm_id))],
                )
                .member(feature);
            for relation in untagged {
                flag = flag.relation(relation);
            }
            return Ok(vec![flag.build(&key)?]);
        }

        let mut candidates: BTreeMap<FeatureKey, &Feature> = BTreeMap::new();
        for pair in &plain {
            let missing: Vec<&Feature> = pair
                .outbound
                .iter()
                .copied()
                .filter(|edge| lacks_destination(edge))
                .collect();

            if is_member_of_any(&relations, pair.inbound.key()) {
                let outside: Vec<&Feature> = missing
                    .into_iter()
                    .filter(|edge| !is_member_of_any(&relations, edge.key()))
                    .collect();
                if outside.is_empty() {
                    continue;
                }
                candidates.extend(outside.into_iter().map(|edge| (edge.key(), edge)));
            } else {
                candidates.extend(missing.into_iter().map(|edge| (edge.key(), edge)));
            }
            candidates.insert(pair.inbound.key(), pair.inbound);
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![
            self.flag()
                .instruction(
                    MISSING_EDGES,
                    &[node_id, join_osm_ids(candidates.values().copied())],
                )
                .member(feature)
                .members(candidates.into_values())
                .build(&key)?,
        ])
    }
}
