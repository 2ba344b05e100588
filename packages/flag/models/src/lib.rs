#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Output records produced by topocheck checks.
//!
//! A [`Flag`] reports one logical defect: rendered instructions, the set of
//! features involved, and the locations worth looking at. Flags are written
//! as JSON lines by the CLI.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use topocheck_feature_models::{EntityRef, Location};

/// One reported defect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    /// Identifier of the check that produced the flag.
    pub check: String,
    /// Stable deduplication key, unique per check within a run.
    pub key: String,
    /// Rendered instruction lines, in the order they were added.
    pub instructions: Vec<String>,
    /// Features and relations involved. Never empty.
    pub members: BTreeSet<EntityRef>,
    /// Points of interest (crossing locations, junction nodes).
    pub points: BTreeSet<Location>,
}

impl Flag {
    /// Distinct OSM identifiers of the members, ascending.
    #[must_use]
    pub fn member_osm_ids(&self) -> BTreeSet<i64> {
        self.members.iter().map(|m| m.osm_id).collect()
    }

    /// Whether any member has the given partition identifier.
    #[must_use]
    pub fn has_member_id(&self, id: i64) -> bool {
        self.members.iter().any(|m| m.id == id)
    }
}
