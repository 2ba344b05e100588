//! Roads, railways, and other linear features (and optionally buildings)
//! crossing water bodies.
//!
//! Water bodies are areas, linear waterways, and water multipolygon
//! relations. A relation is examined through its outer members, leaving out
//! outers that only carry a country code: those are cut at partition
//! borders and do not follow the real shoreline.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;

use topocheck_core::check::{Check, CheckContext, CheckError};
use topocheck_core::collector::{InvalidCrossing, collect_invalid_crossings};
use topocheck_core::ledger::LedgerKey;
use topocheck_core::policy::{Permit, Side, StructuralRule, ValidityPolicy};
use topocheck_core::tags::{HighwayTag, is_bridge, is_building, level_or};
use topocheck_core::{Instructions, TagFilter};
use topocheck_feature_models::{EntityRef, Feature, FeatureKey, FeatureKind, Relation, Tags};
use topocheck_flag_models::Flag;
use topocheck_gateway::TopologyGateway;

use crate::base::CheckBase;
use crate::config::{CheckConfig, ConfigError, WaterBodySettings};

pub const INSTRUCTIONS: &[&str] = &[
    "The water body with id {0} has invalid crossings.",
    "Linear item {0} is crossing water body invalidly.",
    "Building item {0} is intersecting water body invalidly.",
];

const WATER_BODY: usize = 0;
const LINEAR: usize = 1;
const BUILDING: usize = 2;

const ADDRESS_PREFIX: &str = "addr";
const DEFAULT_LEVEL: &str = "0";
const OUTER: &str = "outer";
const ISO_COUNTRY_CODE: &str = "iso_country_code";

const SUBJECT_KINDS: &[FeatureKind] = &[FeatureKind::Area, FeatureKind::Line];
const COMPONENT_KINDS: &[FeatureKind] = &[FeatureKind::Area, FeatureKind::Line, FeatureKind::Edge];
const LINEAR_KINDS: &[FeatureKind] = &[FeatureKind::Edge, FeatureKind::Line];

pub struct LineCrossingWaterBody {
    base: CheckBase,
    water: TagFilter,
    exclude: TagFilter,
    minimum: HighwayTag,
    highways_exclude: BTreeSet<HighwayTag>,
    offending: TagFilter,
    shapepoints: RangeInclusive<usize>,
    flag_buildings: bool,
    building_exclude: TagFilter,
    linear_policy: ValidityPolicy,
    building_policy: ValidityPolicy,
}

/// A water body under evaluation: a feature or a relation seen through its
/// outer members.
struct WaterBody<'a> {
    entity: EntityRef,
    tags: &'a Tags,
    components: Vec<&'a Feature>,
    relation: Option<&'a Relation>,
}

impl WaterBody<'_> {
    fn contains(&self, feature: &Feature) -> bool {
        self.relation
            .is_some_and(|relation| relation.has_member(feature.key()))
    }

    fn shapepoints(&self) -> usize {
        self.components
            .iter()
            .map(|component| component.locations().len())
            .sum()
    }
}

impl LineCrossingWaterBody {
    /// # Errors
    ///
    /// * If a filter or highway class is invalid
    /// * If `shapepoints_min` exceeds `shapepoints_max`
    pub fn new(config: &CheckConfig, settings: &WaterBodySettings) -> Result<Self, ConfigError> {
        if settings.shapepoints_min > settings.shapepoints_max {
            return Err(config.invalid(format!(
                "shapepoints_min {} exceeds shapepoints_max {}",
                settings.shapepoints_min, settings.shapepoints_max
            )));
        }

        let linear_policy = ValidityPolicy::new()
            .with_permit(Permit::Tags {
                side: Side::Candidate,
                filter: config.exclusion_filter(&settings.can_cross_filter)?,
            })
            .with_permit(Permit::KeyPrefix {
                side: Side::Candidate,
                prefix: ADDRESS_PREFIX.to_string(),
            })
            .with_permit(Permit::NodesAt {
                filter: config.exclusion_filter(&settings.non_offending_nodes)?,
            })
            .with_structural_rule(StructuralRule::Untagged {
                side: Side::Candidate,
            })
            .with_structural_rule(StructuralRule::MultipolygonMember {
                side: Side::Candidate,
                filter: config.exclusion_filter(&settings.relation_filter)?,
            })
            .with_structural_rule(StructuralRule::NeutralTagsOnly {
                side: Side::Candidate,
                keys: settings.neutral_keys.iter().cloned().collect(),
            })
            .with_invalid_instruction(LINEAR);

        let highways_exclude = settings
            .highways_exclude
            .iter()
            .map(|value| config.highway(value))
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Self {
            base: CheckBase::new(config, INSTRUCTIONS)?,
            water: config.filter(&settings.water_filter)?,
            exclude: config.exclusion_filter(&settings.exclude_filter)?,
            minimum: config.highway(&settings.minimum_highway)?,
            highways_exclude,
            offending: config.exclusion_filter(&settings.line_items_offending)?,
            shapepoints: settings.shapepoints_min..=settings.shapepoints_max,
            flag_buildings: settings.flag_buildings,
            building_exclude: config.exclusion_filter(&settings.building_exclude_filter)?,
            linear_policy,
            building_policy: ValidityPolicy::new().with_invalid_instruction(BUILDING),
        })
    }

    fn is_water(&self, tags: &Tags) -> bool {
        self.water.matches(tags) && !self.exclude.matches(tags)
    }

    fn is_linear_candidate(&self, water: &WaterBody<'_>, feature: &Feature) -> bool {
        let tags = feature.tags();
        let offending = match feature {
            Feature::Edge(_) => {
                feature.is_main_edge()
                    && (self.offending.matches(tags)
                        || HighwayTag::of(feature).is_none_or(|highway| {
                            highway.is_at_least(self.minimum)
                                && !self.highways_exclude.contains(&highway)
                        }))
            }
            Feature::Line(_) => !self.is_water(tags),
            Feature::Area(_) | Feature::Node(_) | Feature::Point(_) => false,
        };
        offending
            && !is_bridge(tags)
            && !water.contains(feature)
            && level_or(water.tags, DEFAULT_LEVEL) == level_or(tags, DEFAULT_LEVEL)
    }

    fn is_building_candidate(&self, water: &WaterBody<'_>, feature: &Feature) -> bool {
        is_building(feature.tags())
            && !self.building_exclude.matches(feature.tags())
            && !water.contains(feature)
            && level_or(water.tags, DEFAULT_LEVEL) == level_or(feature.tags(), DEFAULT_LEVEL)
    }

    /// Invalid crossings over every component, one entry per crossing
    /// feature.
    fn crossings<'a>(
        &self,
        gateway: &'a dyn TopologyGateway,
        water: &WaterBody<'a>,
    ) -> BTreeMap<FeatureKey, InvalidCrossing<'a>> {
        let mut merged: BTreeMap<FeatureKey, InvalidCrossing<'a>> = BTreeMap::new();
        for &component in &water.components {
            let mut found = collect_invalid_crossings(
                gateway,
                component,
                LINEAR_KINDS,
                &|candidate| self.is_linear_candidate(water, candidate),
                &self.linear_policy,
            );
            if self.flag_buildings {
                found.extend(collect_invalid_crossings(
                    gateway,
                    component,
                    &[FeatureKind::Area],
                    &|candidate| self.is_building_candidate(water, candidate),
                    &self.building_policy,
                ));
            }

            for crossing in found {
                match merged.get_mut(&crossing.feature.key()) {
                    Some(existing) => existing.locations.extend(crossing.locations),
                    None => {
                        merged.insert(crossing.feature.key(), crossing);
                    }
                }
            }
        }
        merged
    }

    fn check_water_body<'a>(
        &self,
        context: &CheckContext<'a>,
        water: &WaterBody<'a>,
    ) -> Result<Vec<Flag>, CheckError> {
        let key = LedgerKey::osm(water.entity);
        if !context.ledger.try_claim(key.clone()) {
            return Ok(Vec::new());
        }

        let shapepoints = water.shapepoints();
        if !self.shapepoints.contains(&shapepoints) {
            log::info!(
                "{}: skipping {} with {shapepoints} shape points, outside {}-{}",
                self.id(),
                water.entity,
                self.shapepoints.start(),
                self.shapepoints.end()
            );
            return Ok(Vec::new());
        }

        let crossings = self.crossings(context.gateway, water);
        if crossings.is_empty() {
            return Ok(Vec::new());
        }

        let mut flag = self
            .flag()
            .instruction(WATER_BODY, &[water.entity.osm_id.to_string()]);
        flag = match water.relation {
            Some(relation) => flag.relation(relation),
            None => flag.members(water.components.iter().copied()),
        };

        // Sub-edges of one way are all members but named once.
        let mut named = BTreeSet::new();
        for crossing in crossings.into_values() {
            flag = flag
                .member(crossing.feature)
                .points(crossing.locations.iter().copied());
            if named.insert(crossing.feature.osm_id()) {
                flag = flag.instruction(
                    crossing.instruction.unwrap_or(LINEAR),
                    &[crossing.feature.osm_id().to_string()],
                );
            }
        }

        Ok(vec![flag.build(&key)?])
    }
}

/// Outers tagged with nothing but a country code come from partition
/// slicing.
fn is_sliced_outer(feature: &Feature) -> bool {
    let tags = feature.tags();
    !tags.is_empty() && tags.keys().all(|key| key == ISO_COUNTRY_CODE)
}

impl Check for LineCrossingWaterBody {
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
        SUBJECT_KINDS
    }

    fn validate_feature(&self, feature: &Feature) -> bool {
        self.is_water(feature.tags())
    }

    fn check_feature<'a>(
        &self,
        context: &CheckContext<'a>,
        feature: &'a Feature,
    ) -> Result<Vec<Flag>, CheckError> {
        let water = WaterBody {
            entity: feature.entity_ref(),
            tags: feature.tags(),
            components: vec![feature],
            relation: None,
        };
        self.check_water_body(context, &water)
    }

    fn validate_relation(&self, relation: &Relation) -> bool {
        relation.is_multipolygon() && self.is_water(&relation.tags)
    }

    fn check_relation<'a>(
        &self,
        context: &CheckContext<'a>,
        relation: &'a Relation,
    ) -> Result<Vec<Flag>, CheckError> {
        let gateway = context.gateway;
        let components = relation
            .members
            .iter()
            .filter(|member| member.role == OUTER && COMPONENT_KINDS.contains(&member.member.kind))
            .filter_map(|member| gateway.feature(member.member))
            .filter(|feature| !is_sliced_outer(feature))
            .collect();

        let water = WaterBody {
            entity: relation.entity_ref(),
            tags: &relation.tags,
            components,
            relation: Some(relation),
        };
        self.check_water_body(context, &water)
    }
}

#[cfg(test)]
mod tests {
    use topocheck_feature_models::{Location, RelationMember};
    use topocheck_gateway::{MemoryAtlas, MemoryAtlasBuilder};

    use super::*;
    use crate::config::CheckSettings;
    use crate::testing::{config, loc, run, tags};

    fn check(extra: &str) -> LineCrossingWaterBody {
        let config = config("line_crossing_water_body", extra);
        let CheckSettings::LineCrossingWaterBody(settings) = &config.check else {
            unreachable!()
        };
        LineCrossingWaterBody::new(&config, settings).unwrap()
    }

    fn river() -> MemoryAtlasBuilder {
        MemoryAtlas::builder().line(
            1,
            1,
            vec![loc(0, -1000), loc(0, 1000)],
            tags(&[("waterway", "river"), ("name", "Test River")]),
        )
    }

    fn road(extra: &[(&str, &str)]) -> Tags {
        let mut road = tags(&[("highway", "primary")]);
        for (key, value) in extra {
            road.insert(*key, *value);
        }
        road
    }

    fn square(south: i64, west: i64, size: i64) -> Vec<Location> {
        vec![
            loc(south, west),
            loc(south, west + size),
            loc(south + size, west + size),
            loc(south + size, west),
            loc(south, west),
        ]
    }

    fn outer(key: FeatureKey) -> RelationMember {
        RelationMember {
            role: "outer".to_string(),
            member: key,
        }
    }

    #[test]
    fn bridge_crossing_is_valid() {
        let atlas = river()
            .edge(10, 10, vec![loc(-500, 0), loc(500, 0)], road(&[("bridge", "yes")]))
            .build()
            .unwrap();
        assert!(run(&check(""), &atlas).is_empty());
    }

    #[test]
    fn untagged_crossing_is_flagged() {
        let atlas = river()
            .edge(10, 10, vec![loc(-500, 0), loc(500, 0)], road(&[]))
            .build()
            .unwrap();

        let flags = run(&check(""), &atlas);
        assert_eq!(flags.len(), 1);
        assert_eq!(
            flags[0].instructions,
            vec![
                "The water body with id 1 has invalid crossings.".to_string(),
                "Linear item 10 is crossing water body invalidly.".to_string(),
            ]
        );
        assert!(flags[0].has_member_id(1) && flags[0].has_member_id(10));
    }

    #[test]
    fn sub_edges_are_members_but_named_once() {
        let atlas = river()
            .edge(10, 10, vec![loc(-500, 0), loc(500, 0)], road(&[]))
            .edge(11, 10, vec![loc(-500, 500), loc(500, 500)], road(&[]))
            .build()
            .unwrap();

        let flags = run(&check(""), &atlas);
        assert_eq!(flags[0].members.len(), 3);
        assert_eq!(flags[0].instructions.len(), 2);
        assert_eq!(flags[0].points.len(), 2);
    }

    #[test]
    fn sections_of_one_water_way_are_flagged_once() {
        let atlas = MemoryAtlas::builder()
            .line(1, 7, vec![loc(0, -1000), loc(0, 0)], tags(&[("waterway", "river")]))
            .line(2, 7, vec![loc(0, 0), loc(0, 1000)], tags(&[("waterway", "river")]))
            .edge(10, 10, vec![loc(-500, -500), loc(500, -500)], road(&[]))
            .edge(11, 11, vec![loc(-500, 500), loc(500, 500)], road(&[]))
            .build()
            .unwrap();

        let flags = run(&check(""), &atlas);
        assert_eq!(flags.len(), 1, "{flags:?}");
        assert!(flags[0].instructions[0].contains("id 7"));
    }

    #[test]
    fn lake_crossing_uses_the_boundary() {
        let atlas = MemoryAtlas::builder()
            .area(1, 1, square(0, 0, 1000), tags(&[("natural", "water")]))
            .edge(10, 10, vec![loc(500, -500), loc(500, 1500)], road(&[]))
            .edge(11, 11, vec![loc(200, 200), loc(800, 800)], road(&[]))
            .build()
            .unwrap();

        let flags = run(&check(""), &atlas);
        assert_eq!(flags.len(), 1);
        assert!(flags[0].has_member_id(10));
        assert!(!flags[0].has_member_id(11), "a road entirely inside does not cross");
        assert_eq!(flags[0].points.len(), 2);
    }

    #[test]
    fn seasonal_water_is_still_water() {
        let atlas = MemoryAtlas::builder()
            .line(
                1,
                1,
                vec![loc(0, -1000), loc(0, 1000)],
                tags(&[("waterway", "river"), ("seasonal", "yes")]),
            )
            .edge(10, 10, vec![loc(-500, 0), loc(500, 0)], road(&[]))
            .build()
            .unwrap();
        assert_eq!(run(&check(""), &atlas).len(), 1);
    }

    #[test]
    fn artificial_water_is_skipped() {
        let atlas = MemoryAtlas::builder()
            .area(
                1,
                1,
                square(0, 0, 1000),
                tags(&[("natural", "water"), ("water", "treatment_pond")]),
            )
            .edge(10, 10, vec![loc(500, -500), loc(500, 1500)], road(&[]))
            .build()
            .unwrap();
        assert!(run(&check(""), &atlas).is_empty());
    }

    #[test]
    fn empty_exclusions_skip_nothing() {
        let atlas = MemoryAtlas::builder()
            .area(
                1,
                1,
                square(0, 0, 1000),
                tags(&[("natural", "water"), ("water", "treatment_pond")]),
            )
            .edge(10, 10, vec![loc(500, -500), loc(500, 1500)], road(&[]))
            .build()
            .unwrap();
        assert_eq!(run(&check("exclude_filter = \"\""), &atlas).len(), 1);
    }

    #[test]
    fn structural_lines_may_cross() {
        let atlas = river()
            .line(20, 20, vec![loc(-500, 100), loc(500, 100)], tags(&[]))
            .line(21, 21, vec![loc(-500, 200), loc(500, 200)], tags(&[("source", "survey")]))
            .line(22, 22, vec![loc(-500, 300), loc(500, 300)], tags(&[("addr:street", "Main")]))
            .line(23, 23, vec![loc(-500, 400), loc(500, 400)], tags(&[("barrier", "fence")]))
            .line(24, 24, vec![loc(-500, 500), loc(500, 500)], tags(&[("name", "Outline")]))
            .relation(
                900,
                900,
                tags(&[("type", "multipolygon"), ("landuse", "forest")]),
                vec![outer(FeatureKey::new(FeatureKind::Line, 24))],
            )
            .build()
            .unwrap();

        let flags = run(&check(""), &atlas);
        assert_eq!(flags.len(), 1);
        let crossers: Vec<i64> = flags[0]
            .members
            .iter()
            .map(|member| member.id)
            .filter(|&id| id != 1)
            .collect();
        assert_eq!(crossers, vec![23], "only the fence is unexplained");
    }

    #[test]
    fn buildings_are_flagged_when_enabled() {
        let atlas = river()
            .area(30, 30, square(-100, -100, 200), tags(&[("building", "yes")]))
            .build()
            .unwrap();

        assert!(run(&check(""), &atlas).is_empty());
        let flags = run(&check("flag_buildings = true"), &atlas);
        assert_eq!(flags.len(), 1);
        assert_eq!(
            flags[0].instructions[1],
            "Building item 30 is intersecting water body invalidly."
        );
    }

    #[test]
    fn multipolygon_water_is_checked_through_its_outers() {
        let atlas = MemoryAtlas::builder()
            .line(2, 2, square(0, 0, 1000), Tags::new())
            .relation(
                900,
                900,
                tags(&[("type", "multipolygon"), ("natural", "water")]),
                vec![outer(FeatureKey::new(FeatureKind::Line, 2))],
            )
            .edge(10, 10, vec![loc(500, -500), loc(500, 1500)], road(&[]))
            .build()
            .unwrap();

        let flags = run(&check(""), &atlas);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].instructions[0], "The water body with id 900 has invalid crossings.");
        assert!(flags[0].has_member_id(900) && flags[0].has_member_id(10));
        assert!(!flags[0].has_member_id(2), "the relation stands for its outers");
        assert_eq!(flags[0].points.len(), 2);
    }

    #[test]
    fn sliced_outers_are_ignored() {
        let atlas = MemoryAtlas::builder()
            .line(2, 2, square(0, 0, 1000), tags(&[("iso_country_code", "NZL")]))
            .relation(
                900,
                900,
                tags(&[("type", "multipolygon"), ("natural", "water")]),
                vec![outer(FeatureKey::new(FeatureKind::Line, 2))],
            )
            .edge(10, 10, vec![loc(500, -500), loc(500, 1500)], road(&[]))
            .build()
            .unwrap();

        assert!(run(&check(""), &atlas).is_empty());
    }

    #[test]
    fn shapepoint_range_is_enforced() {
        let atlas = MemoryAtlas::builder()
            .area(1, 1, square(0, 0, 1000), tags(&[("natural", "water")]))
            .edge(10, 10, vec![loc(500, -500), loc(500, 1500)], road(&[]))
            .build()
            .unwrap();

        assert!(run(&check("shapepoints_max = 4"), &atlas).is_empty());
        assert!(run(&check("shapepoints_min = 6"), &atlas).is_empty());
        assert_eq!(run(&check("shapepoints_min = 5\nshapepoints_max = 5"), &atlas).len(), 1);

        let inverted = config(
            "line_crossing_water_body",
            "shapepoints_min = 10\nshapepoints_max = 5",
        );
        assert!(matches!(
            crate::build_check(&inverted),
            Err(ConfigError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn excluded_highways_unless_offending() {
        let track = |grade: &str| tags(&[("highway", "track"), ("tracktype", grade)]);
        let atlas = river()
            .edge(10, 10, vec![loc(-500, 0), loc(500, 0)], track("grade1"))
            .edge(11, 11, vec![loc(-500, 500), loc(500, 500)], track("grade4"))
            .build()
            .unwrap();

        let flags = run(
            &check("highways_exclude = [\"track\"]\nline_items_offending = \"tracktype->grade1\""),
            &atlas,
        );
        assert_eq!(flags.len(), 1);
        assert!(flags[0].has_member_id(10));
        assert!(!flags[0].has_member_id(11));
    }

    #[test]
    fn ford_node_at_the_crossing_permits_it() {
        let crossing = |ford: &str| {
            river()
                .node(50, 50, loc(0, 0), tags(&[("ford", ford)]))
                .edge(10, 10, vec![loc(-500, 0), loc(500, 0)], road(&[]))
                .build()
                .unwrap()
        };

        assert!(run(&check(""), &crossing("yes")).is_empty());
        assert_eq!(run(&check(""), &crossing("no")).len(), 1);
        assert_eq!(
            run(&check("non_offending_nodes = \"\""), &crossing("yes")).len(),
            1,
            "with no node permits a ford node does not help"
        );
    }
}
