//! State and helpers shared by every concrete check.

use std::collections::BTreeSet;

use topocheck_core::{Instructions, TagFilter};
use topocheck_feature_models::Feature;

use crate::config::{CheckConfig, ConfigError};

/// Identity, instructions, and eligibility filter of a configured check.
#[derive(Debug, Clone)]
pub struct CheckBase {
    pub id: String,
    pub instructions: Instructions,
    pub tags_filter: TagFilter,
}

impl CheckBase {
    /// # Errors
    ///
    /// * If the configured `tags_filter` is malformed
    pub fn new(config: &CheckConfig, fallback: &[&str]) -> Result<Self, ConfigError> {
        Ok(Self {
            id: config.id.clone(),
            instructions: config.instructions(fallback),
            tags_filter: config.tags_filter()?,
        })
    }
}

/// Distinct OSM identifiers of `features`, ascending, comma separated.
pub fn join_osm_ids<'f>(features: impl IntoIterator<Item = &'f Feature>) -> String {
    join_ids(features.into_iter().map(Feature::osm_id))
}

/// Distinct identifiers, ascending, comma separated.
pub fn join_ids(ids: impl IntoIterator<Item = i64>) -> String {
    ids.into_iter()
        .collect::<BTreeSet<_>>()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sorted_and_deduplicated() {
        assert_eq!(join_ids([30, 10, 20, 10]), "10, 20, 30");
        assert_eq!(join_ids([]), "");
    }
}
