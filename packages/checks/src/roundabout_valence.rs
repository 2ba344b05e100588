//! Roundabouts with too few or too many connected roads.

use std::collections::BTreeSet;

use topocheck_core::check::{Check, CheckContext, CheckError};
use topocheck_core::ledger::LedgerKey;
use topocheck_core::tags::{HighwayTag, is_roundabout};
use topocheck_core::walker::{VisitedSet, walk};
use topocheck_core::{Instructions, TagFilter};
use topocheck_feature_models::{Feature, FeatureKind};
use topocheck_flag_models::Flag;

use crate::base::{CheckBase, join_osm_ids};
use crate::config::{CheckConfig, ConfigError, RoundaboutSettings};

pub const INSTRUCTIONS: &[&str] = &[
    "This roundabout, {0}, has the wrong valence. It has a valence of {1}.",
    concat!(
        "This feature, {0}, should not be labelled as a roundabout. ",
        "This feature should be a turning loop or turning circle."
    ),
];

pub struct RoundaboutValence {
    base: CheckBase,
    minimum: usize,
    maximum: usize,
}

impl RoundaboutValence {
    /// # Errors
    ///
    /// * If the configured `tags_filter` is malformed
    /// * If `minimum_valence` exceeds `maximum_valence`
    pub fn new(config: &CheckConfig, settings: &RoundaboutSettings) -> Result<Self, ConfigError> {
        if settings.minimum_valence > settings.maximum_valence {
            return Err(config.invalid(format!(
                "minimum_valence {} exceeds maximum_valence {}",
                settings.minimum_valence, settings.maximum_valence
            )));
        }
        Ok(Self {
            base: CheckBase::new(config, INSTRUCTIONS)?,
            minimum: settings.minimum_valence,
            maximum: settings.maximum_valence,
        })
    }
}

fn is_car_navigable_main_edge(feature: &Feature) -> bool {
    feature.is_main_edge() && HighwayTag::of(feature).is_some_and(HighwayTag::is_car_navigable)
}

fn is_ring_edge(feature: &Feature) -> bool {
    is_car_navigable_main_edge(feature) && is_roundabout(feature.tags())
}

impl Check for RoundaboutValence {
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
        is_ring_edge(feature)
    }

    fn check_feature<'a>(
        &self,
        context: &CheckContext<'a>,
        feature: &'a Feature,
    ) -> Result<Vec<Flag>, CheckError> {
        let gateway = context.gateway;
        let mut visited = VisitedSet::new();

        // Ring edges expand to everything connected; connections stop there.
        let collected = walk(
            feature,
            |edge| {
                if !is_ring_edge(edge) {
                    return Vec::new();
                }
                gateway
                    .connected_features(edge)
                    .into_iter()
                    .filter(|connected| is_car_navigable_main_edge(connected))
                    .collect()
            },
            &mut visited,
        );

        let (ring, connections): (Vec<&Feature>, Vec<&Feature>) =
            collected.values().copied().partition(|edge| is_ring_edge(edge));

        if !context.ledger.try_claim(LedgerKey::component(ring.iter().copied())) {
            return Ok(Vec::new());
        }

        let valence = connections.len();
        if (self.minimum..=self.maximum).contains(&valence) {
            return Ok(Vec::new());
        }

        let ring_nodes: BTreeSet<i64> = ring
            .iter()
            .filter_map(|edge| edge.as_edge())
            .flat_map(|edge| [edge.start_node, edge.end_node])
            .collect();
        let junctions = connections.iter().flat_map(|connection| {
            let (start, end) = gateway.nodes_of(connection);
            [start, end]
                .into_iter()
                .flatten()
                .filter(|node| ring_nodes.contains(&node.id()))
                .flat_map(|node| node.as_node().map(|node| node.location))
        });

        let key = LedgerKey::component(collected.values().copied());
        log::debug!("{}: valence {valence} for ring {key}", self.id());

        let instruction = usize::from(valence == 1);
        Ok(vec![
            self.flag()
                .instruction(
                    instruction,
                    &[join_osm_ids(ring.iter().copied()), valence.to_string()],
                )
                .members(collected.values().copied())
                .points(junctions)
                .build(&key)?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use topocheck_feature_models::{Location, Tags};
    use topocheck_gateway::{MemoryAtlas, MemoryAtlasBuilder};

    use super::*;
    use crate::config::CheckSettings;
    use crate::testing::{config, loc, run, run_parallel, tags};

    fn check() -> RoundaboutValence {
        let config = config("roundabout_valence", "");
        let CheckSettings::RoundaboutValence(settings) = &config.check else {
            unreachable!()
        };
        RoundaboutValence::new(&config, settings).unwrap()
    }

    fn ring_tags() -> Tags {
        tags(&[("highway", "primary"), ("junction", "roundabout"), ("oneway", "yes")])
    }

    /// A square ring of four edges (ids 1-4) with `exits` one-way roads
    /// leaving from its corners (ids 101..).
    fn roundabout(exits: usize) -> MemoryAtlasBuilder {
        let corners = [loc(0, 0), loc(0, 100), loc(100, 100), loc(100, 0)];
        let mut builder = MemoryAtlas::builder();
        for (i, corner) in corners.iter().enumerate() {
            let next = corners[(i + 1) % corners.len()];
            let id = i64::try_from(i).unwrap() + 1;
            builder = builder.edge(id, id, vec![*corner, next], ring_tags());
        }
        for exit in 0..exits {
            let corner = corners[exit % corners.len()];
            let offset = i64::try_from(exit).unwrap() + 1;
            let end = Location::new(corner.lat_dm7 - 1000 * offset, corner.lon_dm7 - 1000);
            let id = 100 + offset;
            builder = builder.edge(id, id, vec![corner, end], tags(&[("highway", "residential")]));
        }
        builder
    }

    #[test]
    fn two_connections_are_valid() {
        let atlas = roundabout(2).build().unwrap();
        assert!(run(&check(), &atlas).is_empty());
    }

    #[test]
    fn eleven_connections_flag_the_whole_collected_set() {
        let atlas = roundabout(11).build().unwrap();
        let flags = run(&check(), &atlas);

        assert_eq!(flags.len(), 1, "the ring is reported once");
        assert_eq!(flags[0].members.len(), 15, "4 ring edges plus 11 connections");
        assert!(flags[0].instructions[0].contains("valence of 11"));
        assert_eq!(flags[0].points.len(), 4, "every corner is a junction");
    }

    #[test]
    fn single_connection_is_a_turning_loop() {
        let atlas = roundabout(1).build().unwrap();
        let flags = run(&check(), &atlas);

        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].members.len(), 5, "ring of 4 plus 1 exit");
        assert_eq!(
            flags[0].instructions,
            vec![
                "This feature, 1, 2, 3, 4, should not be labelled as a roundabout. \
                 This feature should be a turning loop or turning circle."
                    .to_string()
            ]
        );
    }

    #[test]
    fn footways_do_not_count() {
        let atlas = roundabout(2)
            .edge(200, 200, vec![loc(0, 100), loc(-500, 500)], tags(&[("highway", "footway")]))
            .build()
            .unwrap();
        assert!(run(&check(), &atlas).is_empty());
    }

    #[test]
    fn result_does_not_depend_on_scheduling() {
        let atlas = roundabout(11).build().unwrap();
        assert_eq!(run(&check(), &atlas), run_parallel(&check(), &atlas));
    }
}
