//! Roads and other lines crossing buildings.

use std::collections::BTreeSet;

use topocheck_core::check::{Check, CheckContext, CheckError};
use topocheck_core::collector::collect_invalid_crossings;
use topocheck_core::ledger::LedgerKey;
use topocheck_core::policy::{Permit, Side, ValidityPolicy};
use topocheck_core::tags::is_building;
use topocheck_core::{Instructions, TagFilter};
use topocheck_feature_models::{Feature, FeatureKind};
use topocheck_flag_models::Flag;

use crate::base::CheckBase;
use crate::config::{BuildingSettings, CheckConfig, ConfigError};

pub const INSTRUCTIONS: &[&str] = &[
    "The building with id {0} has invalid crossings.",
    "The Line with id {0} has invalid crossings.",
];

const CROSSING: usize = 1;

pub struct LineCrossingBuilding {
    base: CheckBase,
    exclude: TagFilter,
    policy: ValidityPolicy,
}

impl LineCrossingBuilding {
    /// # Errors
    ///
    /// * If a configured filter is malformed
    pub fn new(config: &CheckConfig, settings: &BuildingSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            base: CheckBase::new(config, INSTRUCTIONS)?,
            exclude: config.exclusion_filter(&settings.exclude_filter)?,
            policy: ValidityPolicy::new()
                .with_permit(Permit::Tags {
                    side: Side::Candidate,
                    filter: config.exclusion_filter(&settings.can_cross_filter)?,
                })
                .with_invalid_instruction(CROSSING),
        })
    }
}

fn is_crossing_candidate(feature: &Feature) -> bool {
    match feature {
        Feature::Edge(_) => feature.is_main_edge(),
        Feature::Line(_) => true,
        Feature::Area(_) | Feature::Node(_) | Feature::Point(_) => false,
    }
}

impl Check for LineCrossingBuilding {
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
        &[FeatureKind::Area]
    }

    fn validate_feature(&self, feature: &Feature) -> bool {
        is_building(feature.tags()) && !self.exclude.matches(feature.tags())
    }

    fn check_feature<'a>(
        &self,
        context: &CheckContext<'a>,
        feature: &'a Feature,
    ) -> Result<Vec<Flag>, CheckError> {
        let key = LedgerKey::entity(feature);
        if !context.ledger.try_claim(key.clone()) {
            return Ok(Vec::new());
        }

        let crossings = collect_invalid_crossings(
            context.gateway,
            feature,
            &[FeatureKind::Edge, FeatureKind::Line],
            &is_crossing_candidate,
            &self.policy,
        );
        if crossings.is_empty() {
            return Ok(Vec::new());
        }

        let mut flag = self
            .flag()
            .instruction(0, &[feature.osm_id().to_string()])
            .member(feature);
        let mut named = BTreeSet::new();
        for crossing in crossings {
            flag = flag
                .member(crossing.feature)
                .points(crossing.locations.iter().copied());
            if named.insert(crossing.feature.osm_id()) {
                flag = flag.instruction(
                    crossing.instruction.unwrap_or(CROSSING),
                    &[crossing.feature.osm_id().to_string()],
                );
            }
        }

        Ok(vec![flag.build(&key)?])
    }
}

#[cfg(test)]
mod tests {
    use topocheck_feature_models::Location;
    use topocheck_gateway::MemoryAtlas;

    use super::*;
    use crate::config::CheckSettings;
    use crate::testing::{config, loc, run, tags};

    fn check() -> LineCrossingBuilding {
        check_with("")
    }

    fn check_with(extra: &str) -> LineCrossingBuilding {
        let config = config("line_crossing_building", extra);
        let CheckSettings::LineCrossingBuilding(settings) = &config.check else {
            unreachable!()
        };
        LineCrossingBuilding::new(&config, settings).unwrap()
    }

    fn square() -> Vec<Location> {
        vec![loc(0, 0), loc(0, 100), loc(100, 100), loc(100, 0), loc(0, 0)]
    }

    #[test]
    fn road_through_building_is_flagged() {
        let atlas = MemoryAtlas::builder()
            .area(1, 1, square(), tags(&[("building", "yes")]))
            .edge(10, 10, vec![loc(50, -50), loc(50, 150)], tags(&[("highway", "residential")]))
            .build()
            .unwrap();

        let flags = run(&check(), &atlas);
        assert_eq!(flags.len(), 1);
        assert_eq!(
            flags[0].instructions,
            vec![
                "The building with id 1 has invalid crossings.".to_string(),
                "The Line with id 10 has invalid crossings.".to_string(),
            ]
        );
        assert_eq!(flags[0].points.len(), 2);
    }

    #[test]
    fn permitted_crossings_are_valid() {
        let atlas = MemoryAtlas::builder()
            .area(1, 1, square(), tags(&[("building", "yes")]))
            .edge(
                10,
                10,
                vec![loc(50, -50), loc(50, 150)],
                tags(&[("highway", "residential"), ("tunnel", "building_passage")]),
            )
            .line(20, 20, vec![loc(-50, 30), loc(150, 30)], tags(&[("power", "line")]))
            .line(21, 21, vec![loc(-50, 60), loc(150, 60)], tags(&[("service", "driveway")]))
            .build()
            .unwrap();
        assert!(run(&check(), &atlas).is_empty());
    }

    #[test]
    fn roofs_are_skipped() {
        let atlas = MemoryAtlas::builder()
            .area(1, 1, square(), tags(&[("building", "roof")]))
            .edge(10, 10, vec![loc(50, -50), loc(50, 150)], tags(&[("highway", "residential")]))
            .build()
            .unwrap();
        assert!(run(&check(), &atlas).is_empty());
        assert_eq!(
            run(&check_with("exclude_filter = \"\""), &atlas).len(),
            1,
            "with no exclusions a roof is checked like any building"
        );
    }

    #[test]
    fn sub_edges_are_named_once() {
        let atlas = MemoryAtlas::builder()
            .area(1, 1, square(), tags(&[("building", "yes")]))
            .edge(10, 10, vec![loc(50, -50), loc(50, 50)], tags(&[("highway", "residential")]))
            .edge(11, 10, vec![loc(50, 50), loc(50, 150)], tags(&[("highway", "residential")]))
            .build()
            .unwrap();

        let flags = run(&check(), &atlas);
        assert_eq!(flags[0].members.len(), 3);
        assert_eq!(flags[0].instructions.len(), 2);
    }
}
