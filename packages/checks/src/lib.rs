#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Concrete topology checks.
//!
//! Each check is instantiated from a [`CheckConfig`]; the default set ships
//! embedded in the binary (see [`registry`]). [`build_checks`] turns
//! configurations into runnable [`Check`] objects, failing fast on invalid
//! thresholds or filters.

pub mod base;
pub mod boundary_intersection;
pub mod building;
pub mod config;
pub mod edge_crossing;
pub mod registry;
pub mod roundabout_valence;
pub mod sign_post;
pub mod water_body;

use topocheck_core::Check;

pub use config::{CheckConfig, CheckSettings, ConfigError, load_config_dir, parse_check_toml};

/// Instantiates the check described by `config`.
///
/// # Errors
///
/// * If a filter, highway class, or threshold in `config` is invalid
pub fn build_check(config: &CheckConfig) -> Result<Box<dyn Check>, ConfigError> {
    Ok(match &config.check {
        CheckSettings::EdgeCrossingEdge(settings) => {
            Box::new(edge_crossing::EdgeCrossingEdge::new(config, settings)?)
        }
        CheckSettings::LineCrossingWaterBody(settings) => {
            Box::new(water_body::LineCrossingWaterBody::new(config, settings)?)
        }
        CheckSettings::LineCrossingBuilding(settings) => {
            Box::new(building::LineCrossingBuilding::new(config, settings)?)
        }
        CheckSettings::RoundaboutValence(settings) => {
            Box::new(roundabout_valence::RoundaboutValence::new(config, settings)?)
        }
        CheckSettings::AtGradeSignPost(settings) => {
            Box::new(sign_post::AtGradeSignPost::new(config, settings)?)
        }
        CheckSettings::BoundaryIntersection(settings) => Box::new(
            boundary_intersection::BoundaryIntersection::new(config, settings)?,
        ),
    })
}

/// Instantiates the checks to run.
///
/// With `only` empty, every enabled configuration is used. Otherwise the
/// named checks are used in the given order, enabled or not.
///
/// # Errors
///
/// * [`ConfigError::UnknownCheck`] if a name in `only` is not configured
/// * Any error from [`build_check`]
pub fn build_checks(
    configs: &[CheckConfig],
    only: &[String],
) -> Result<Vec<Box<dyn Check>>, ConfigError> {
    if only.is_empty() {
        return configs
            .iter()
            .filter(|config| config.enabled)
            .map(build_check)
            .collect();
    }

    only.iter()
        .map(|id| {
            configs
                .iter()
                .find(|config| &config.id == id)
                .ok_or_else(|| ConfigError::UnknownCheck(id.clone()))
                .and_then(build_check)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use topocheck_core::{Check, NullProgress, RunOptions, run_check};
    use topocheck_feature_models::{Location, Tags};
    use topocheck_flag_models::Flag;
    use topocheck_gateway::MemoryAtlas;

    use crate::config::{CheckConfig, parse_check_toml};

    pub fn loc(lat: i64, lon: i64) -> Location {
        Location::new(lat, lon)
    }

    pub fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs.iter().copied().collect()
    }

    /// A configuration of check `kind` with default settings plus `extra`
    /// lines in the `[check]` table.
    pub fn config(kind: &str, extra: &str) -> CheckConfig {
        parse_check_toml(
            kind,
            &format!("id = \"{kind}\"\n\n[check]\ntype = \"{kind}\"\n{extra}\n"),
        )
        .unwrap()
    }

    pub fn run(check: &dyn Check, atlas: &MemoryAtlas) -> Vec<Flag> {
        run_check(check, atlas, RunOptions { sequential: true }, &NullProgress).flags
    }

    pub fn run_parallel(check: &dyn Check, atlas: &MemoryAtlas) -> Vec<Flag> {
        run_check(check, atlas, RunOptions::default(), &NullProgress).flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::config;

    #[test]
    fn selection_by_name_includes_disabled_checks() {
        let mut disabled = config("roundabout_valence", "");
        disabled.enabled = false;
        let configs = vec![config("edge_crossing_edge", ""), disabled];

        assert_eq!(build_checks(&configs, &[]).unwrap().len(), 1);
        let named = build_checks(&configs, &["roundabout_valence".to_string()]).unwrap();
        assert_eq!(named[0].id(), "roundabout_valence");
    }

    #[test]
    fn unknown_names_are_rejected() {
        let configs = vec![config("edge_crossing_edge", "")];
        let result = build_checks(&configs, &["bogus".to_string()]);
        assert!(matches!(result, Err(ConfigError::UnknownCheck(name)) if name == "bogus"));
    }

    #[test]
    fn invalid_thresholds_fail_construction() {
        let inverted = config("roundabout_valence", "minimum_valence = 5\nmaximum_valence = 3");
        assert!(matches!(
            build_check(&inverted),
            Err(ConfigError::InvalidThreshold { .. })
        ));

        let bad_filter = config("line_crossing_building", "can_cross_filter = \"bridge\"");
        assert!(matches!(build_check(&bad_filter), Err(ConfigError::Filter { .. })));
    }
}
