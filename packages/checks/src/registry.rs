//! Check registry: the default check configurations, embedded from TOML.
//!
//! Each `.toml` file in `packages/checks/checks/` is baked into the binary
//! at compile time via [`include_str!`]. A directory of files in the same
//! format can replace the whole set at runtime (see
//! [`crate::load_config_dir`]).

use crate::config::{CheckConfig, parse_check_toml};

/// TOML configs embedded at compile time.
const CHECK_TOMLS: &[(&str, &str)] = &[
    // ── Crossings ────────────────────────────────────────────────────
    (
        "edge_crossing_edge",
        include_str!("../checks/edge_crossing_edge.toml"),
    ),
    (
        "line_crossing_water_body",
        include_str!("../checks/line_crossing_water_body.toml"),
    ),
    (
        "line_crossing_building",
        include_str!("../checks/line_crossing_building.toml"),
    ),
    (
        "boundary_intersection",
        include_str!("../checks/boundary_intersection.toml"),
    ),
    // ── Junctions ────────────────────────────────────────────────────
    (
        "roundabout_valence",
        include_str!("../checks/roundabout_valence.toml"),
    ),
    (
        "at_grade_sign_post",
        include_str!("../checks/at_grade_sign_post.toml"),
    ),
];

#[cfg(test)]
const EXPECTED_CHECK_COUNT: usize = 6;

/// Returns every default check configuration, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_check_configs() -> Vec<CheckConfig> {
    CHECK_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_check_toml(name, toml)
                .unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}
