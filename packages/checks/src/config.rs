//! Check configuration.
//!
//! Every check is described by one TOML document: common fields shared by
//! all checks plus a `[check]` table tagged by `type` that carries the
//! check-specific thresholds and permit lists. Missing check-specific
//! fields fall back to the defaults below.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use topocheck_core::{FilterParseError, HighwayTag, Instructions, Navigability, TagFilter};

/// Why a check configuration was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A TOML document could not be parsed.
    #[error("Failed to parse {name}: {source}")]
    Toml {
        /// Document name (registry entry or file path).
        name: String,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A tag filter definition is malformed.
    #[error("Check {check}: {source}")]
    Filter {
        /// Check id.
        check: String,
        /// Underlying parse error.
        #[source]
        source: FilterParseError,
    },

    /// A numeric or ordering constraint does not hold.
    #[error("Check {check}: {message}")]
    InvalidThreshold {
        /// Check id.
        check: String,
        /// What is wrong.
        message: String,
    },

    /// A highway class name is not recognized.
    #[error("Check {check}: unknown highway class {value:?}")]
    UnknownHighway {
        /// Check id.
        check: String,
        /// Offending value.
        value: String,
    },

    /// A requested check id is not configured.
    #[error("Unknown check: {0}")]
    UnknownCheck(String),

    /// Two configurations share an id.
    #[error("Duplicate check id: {0}")]
    DuplicateCheck(String),
}

// ── Top-level check config ───────────────────────────────────────────────

/// A complete check configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckConfig {
    /// Unique identifier (e.g., `"edge_crossing_edge"`).
    pub id: String,
    /// Human-readable summary shown by `topocheck checks`.
    #[serde(default)]
    pub description: String,
    /// Disabled checks are skipped unless requested explicitly.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Preferred instruction language. Defaults to `en`.
    #[serde(default)]
    pub locale: Option<String>,
    /// Per-language instruction templates overriding the built-in ones.
    #[serde(default)]
    pub instructions: BTreeMap<String, Vec<String>>,
    /// Additional eligibility filter applied before the check runs.
    #[serde(default)]
    pub tags_filter: String,
    /// Check type and its settings.
    pub check: CheckSettings,
}

const fn default_enabled() -> bool {
    true
}

impl CheckConfig {
    /// Instruction templates with `fallback` as the built-in list.
    #[must_use]
    pub fn instructions(&self, fallback: &[&str]) -> Instructions {
        let instructions = Instructions::new(fallback).with_localized(self.instructions.clone());
        match &self.locale {
            Some(locale) => instructions.with_locale(locale.clone()),
            None => instructions,
        }
    }

    /// # Errors
    ///
    /// * If `tags_filter` is malformed
    pub fn tags_filter(&self) -> Result<TagFilter, ConfigError> {
        self.filter(&self.tags_filter)
    }

    /// Parses a filter definition belonging to this check.
    ///
    /// # Errors
    ///
    /// * If `definition` is malformed
    pub fn filter(&self, definition: &str) -> Result<TagFilter, ConfigError> {
        TagFilter::parse(definition).map_err(|source| ConfigError::Filter {
            check: self.id.clone(),
            source,
        })
    }

    /// Parses a filter that singles features out, such as an exclusion
    /// list. Unlike [`CheckConfig::filter`], an empty definition matches
    /// nothing.
    ///
    /// # Errors
    ///
    /// * If `definition` is malformed
    pub fn exclusion_filter(&self, definition: &str) -> Result<TagFilter, ConfigError> {
        if definition.trim().is_empty() {
            return Ok(TagFilter::none());
        }
        self.filter(definition)
    }

    /// Parses a highway class name belonging to this check.
    ///
    /// # Errors
    ///
    /// * If `value` is not a known highway class
    pub fn highway(&self, value: &str) -> Result<HighwayTag, ConfigError> {
        value.trim().parse().map_err(|_| ConfigError::UnknownHighway {
            check: self.id.clone(),
            value: value.to_string(),
        })
    }

    /// Builds an [`ConfigError::InvalidThreshold`] for this check.
    #[must_use]
    pub fn invalid(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::InvalidThreshold {
            check: self.id.clone(),
            message: message.into(),
        }
    }
}

// ── Check-specific settings ──────────────────────────────────────────────

/// Which check a configuration instantiates.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckSettings {
    /// Roads crossing without a shared node or layer separation.
    EdgeCrossingEdge(EdgeCrossingSettings),
    /// Linear features and buildings crossing water bodies.
    LineCrossingWaterBody(WaterBodySettings),
    /// Linear features crossing buildings.
    LineCrossingBuilding(BuildingSettings),
    /// Roundabouts with too few or too many connections.
    RoundaboutValence(RoundaboutSettings),
    /// At-grade junctions missing destination sign data.
    AtGradeSignPost(SignPostSettings),
    /// Boundary relations crossing each other.
    BoundaryIntersection(BoundarySettings),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EdgeCrossingSettings {
    /// Least important highway class considered.
    pub minimum_highway: String,
    /// Most important highway class considered.
    pub maximum_highway: String,
    /// Navigability required of checked edges.
    pub navigability: Navigability,
    /// Navigability required of crossing edges.
    pub crossing_navigability: Navigability,
    /// Edges matching this filter are indoor mapping and skipped.
    pub indoor_filter: String,
    /// Layer assumed for edges without a `layer` tag.
    pub layer_default: i64,
    /// Require explicit `layer` tags on both edges for vertical separation.
    pub explicit_layers_only: bool,
    /// Crossings further apart than this are reported separately.
    pub cluster_distance_meters: f64,
}

impl Default for EdgeCrossingSettings {
    fn default() -> Self {
        Self {
            minimum_highway: "no".to_string(),
            maximum_highway: "motorway".to_string(),
            navigability: Navigability::car(),
            crossing_navigability: Navigability::car(),
            indoor_filter: "indoor->*|highway->corridor,steps|level->*".to_string(),
            layer_default: 0,
            explicit_layers_only: false,
            cluster_distance_meters: 500.0,
        }
    }
}

pub const DEFAULT_WATER_BODY_FILTER: &str = concat!(
    "natural->spring,hot_spring&name->*|natural->lake,pond|water:type->lake|landuse->pond",
    "|water->lake,pond,oxbow,salt_lake",
    "|natural->stream|water->canal,river,lock,moat,riverbank,creek,stream,stream_pool",
    "|waterway->river,riverbank,brook,ditch,stream,creek,canal,derelict_canal",
    "|stream->*|waterway->drain&name->*|water->drain&name->*",
    "|water->reservoir|water->dam&natural->water|landuse->reservoir|natural->reservoir",
    "|seamark:type->dam&natural->water",
    "|natural->water|waterway->water|water->water,perennial|landuse->water",
    "|wetland->tidalflat,reedbed|water->tidalflat,reedbed|natural->tidalflat,reedbed",
    "|natural->lagoon|water->lagoon|waterway->lagoon",
    "|intermittent->dry|seasonal->dry|natural->dry_lake",
    "|waterway->billabong,navigablechannel,river;stream,reservoir",
);

pub const DEFAULT_WATER_BODY_EXCLUDE_FILTER: &str = concat!(
    "natural->dock,water_point,floodway,spillway,wastewater,waterhole",
    "|waterway->lock_gate,dock,water_point,floodway,spillway,wastewater,waterhole,culvert,dam,",
    "waterfall,fish_pass,dry_dock,construction,boat_lift,weir,breakwater,boatyard",
    "|water->lock_gate,dock,water_point,floodway,spillway,wastewater,waterhole,pool,",
    "reflecting_pool,swimming_pool,salt_pool,fountain,tank,fish_pass",
    "|tunnel->culvert|waterway->drain&name->!|water->drain&name->!",
    "|wetland->tidalflat,reedbed&seasonal->yes|water->tidalflat,reedbed&seasonal->yes",
    "|natural->tidalflat,reedbed&seasonal->yes|covered->yes|highway->*",
    "|natural->strait,channel,fjord,sound,bay|harbour->*&harbour->!no",
    "|estuary->*&estuary->!no|bay->*&bay->!no",
    "|seamark:type->harbour,harbour_basin,sea_area|place->sea|water->bay,cove,harbour",
    "|waterway->artificial,dock|man_made->breakwater,pier|natural->beach,marsh,swamp",
    "|water->marsh|wetland->bog,fen,mangrove,marsh,saltern,saltmarsh,string_bog,swamp,wet_meadow",
    "|waterway->drainage_channel,glacier,Minnow Falls,pumping_station",
    "|water->tank,Earth_Tank_,_Off_Stream_Flow_Dam,treatment_pond,re#,swamp_-_occasional,",
    "trough,waste_water",
);

pub const DEFAULT_CAN_CROSS_WATER_BODY_FILTER: &str = concat!(
    "waterway->*|boundary->*|landuse->*",
    "|bridge->yes,viaduct,aqueduct,boardwalk,covered,low_water_crossing,movable,suspension",
    "|tunnel->yes,culvert,building_passage|embankment->yes|location->underwater,underground",
    "|power->line,minor_line|man_made->pier,breakwater,embankment,groyne,dyke,pipeline",
    "|route->ferry|highway->proposed,construction|ice_road->yes|winter_road->yes",
    "|snowmobile->yes|ski->yes|ford->!no&ford->*",
);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WaterBodySettings {
    /// Features matching this filter are water bodies.
    pub water_filter: String,
    /// Water bodies matching this filter are skipped.
    pub exclude_filter: String,
    /// Crossing features matching this filter are permitted.
    pub can_cross_filter: String,
    /// Least important highway class reported as a crossing.
    pub minimum_highway: String,
    /// Highway classes never reported, regardless of importance.
    pub highways_exclude: Vec<String>,
    /// Edges and lines matching this filter are reported whatever their
    /// highway class. Empty selects nothing.
    pub line_items_offending: String,
    /// A crossing is permitted where a node matching this filter sits at
    /// every crossing point (fords, slipways, ferry terminals).
    pub non_offending_nodes: String,
    /// Water bodies whose outer geometry has fewer shape points are skipped.
    pub shapepoints_min: usize,
    /// Water bodies whose outer geometry has more shape points are skipped.
    pub shapepoints_max: usize,
    /// Also report buildings intersecting water bodies.
    pub flag_buildings: bool,
    /// Buildings matching this filter are never reported.
    pub building_exclude_filter: String,
    /// Multipolygon relations matching this filter may cross water.
    pub relation_filter: String,
    /// Lines tagged only with these keys may cross water.
    pub neutral_keys: Vec<String>,
}

impl Default for WaterBodySettings {
    fn default() -> Self {
        Self {
            water_filter: DEFAULT_WATER_BODY_FILTER.to_string(),
            exclude_filter: DEFAULT_WATER_BODY_EXCLUDE_FILTER.to_string(),
            can_cross_filter: DEFAULT_CAN_CROSS_WATER_BODY_FILTER.to_string(),
            minimum_highway: "toll_gantry".to_string(),
            highways_exclude: Vec::new(),
            line_items_offending: String::new(),
            non_offending_nodes: "ford->!no&ford->*|leisure->slipway|amenity->ferry_terminal"
                .to_string(),
            shapepoints_min: 1,
            shapepoints_max: 5000,
            flag_buildings: false,
            building_exclude_filter: "public_transport->station|aerialway->station".to_string(),
            relation_filter:
                "natural->*|place->*|landuse->*|waterway->*|admin_level->*|boundary->*"
                    .to_string(),
            neutral_keys: ["note", "source", "natural", "place", "admin_level"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildingSettings {
    /// Buildings matching this filter may be crossed.
    pub exclude_filter: String,
    /// Crossing features matching this filter are permitted.
    pub can_cross_filter: String,
}

impl Default for BuildingSettings {
    fn default() -> Self {
        Self {
            exclude_filter: "building->roof,entrance|building:part->roof|barrier->toll_booth|highway->pedestrian"
                .to_string(),
            can_cross_filter: concat!(
                "boundary->*|landuse->*|location->underground|tunnel->!no&tunnel->*",
                "|power->line,minor_line|addr:interpolation->*|bridge->!no&bridge->*",
                "|aerialway->*|railway->subway|service->driveway|covered->yes",
            )
            .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoundaboutSettings {
    pub minimum_valence: usize,
    pub maximum_valence: usize,
}

impl Default for RoundaboutSettings {
    fn default() -> Self {
        Self {
            minimum_valence: 2,
            maximum_valence: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignPostSettings {
    /// Inbound highway class to the outbound classes it forms a junction
    /// with.
    pub connected_highway_types: BTreeMap<String, Vec<String>>,
    /// `type` of the relations describing signage.
    pub relation_type: String,
    /// Junctions with fewer connected edges are skipped.
    pub minimum_valence: usize,
}

impl Default for SignPostSettings {
    fn default() -> Self {
        let table = |outbound: &[&str]| outbound.iter().map(ToString::to_string).collect();
        Self {
            connected_highway_types: BTreeMap::from([
                ("primary".to_string(), table(&["trunk", "primary", "secondary"])),
                ("trunk".to_string(), table(&["primary"])),
                ("secondary".to_string(), table(&["primary"])),
            ]),
            relation_type: "destination_sign".to_string(),
            minimum_valence: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoundarySettings {
    /// `type` of the relations checked.
    pub relation_type: String,
}

impl Default for BoundarySettings {
    fn default() -> Self {
        Self {
            relation_type: "boundary".to_string(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────────────

/// Parses one check configuration.
///
/// # Errors
///
/// * If the document is not a valid check configuration
pub fn parse_check_toml(name: &str, toml_str: &str) -> Result<CheckConfig, ConfigError> {
    toml::de::from_str(toml_str).map_err(|source| ConfigError::Toml {
        name: name.to_string(),
        source,
    })
}

/// Loads every `*.toml` file in `dir`, ordered by file name.
///
/// # Errors
///
/// * If the directory or a file cannot be read
/// * If a file is not a valid check configuration
/// * If two files share a check id
pub fn load_config_dir(dir: &Path) -> Result<Vec<CheckConfig>, ConfigError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut configs: Vec<CheckConfig> = Vec::with_capacity(paths.len());
    for path in paths {
        let contents = std::fs::read_to_string(&path)?;
        let config = parse_check_toml(&path.display().to_string(), &contents)?;
        if configs.iter().any(|existing| existing.id == config.id) {
            return Err(ConfigError::DuplicateCheck(config.id));
        }
        log::debug!("Loaded check {} from {}", config.id, path.display());
        configs.push(config);
    }
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use topocheck_feature_models::Tags;

    use super::*;

    #[test]
    fn settings_fall_back_to_defaults() {
        let config = parse_check_toml(
            "inline",
            r#"
id = "roundabouts"

[check]
type = "roundabout_valence"
maximum_valence = 6
"#,
        )
        .unwrap();

        assert!(config.enabled);
        let CheckSettings::RoundaboutValence(settings) = config.check else {
            panic!("expected roundabout settings, got {:?}", config.check);
        };
        assert_eq!(settings.minimum_valence, 2);
        assert_eq!(settings.maximum_valence, 6);
    }

    #[test]
    fn unknown_check_type_is_rejected() {
        let result = parse_check_toml(
            "inline",
            r#"
id = "x"

[check]
type = "no_such_check"
"#,
        );
        assert!(matches!(result, Err(ConfigError::Toml { .. })));
    }

    #[test]
    fn localized_instructions_override_fallback() {
        let config = parse_check_toml(
            "inline",
            r#"
id = "x"
locale = "fr"

[instructions]
fr = ["Bâtiment {0}"]

[check]
type = "line_crossing_building"
"#,
        )
        .unwrap();

        let instructions = config.instructions(&["Building {0}", "Line {0}"]);
        assert_eq!(instructions.template(0), Some("Bâtiment {0}"));
        assert_eq!(instructions.template(1), Some("Line {0}"));
    }

    #[test]
    fn highway_names_are_validated() {
        let config = parse_check_toml(
            "inline",
            "id = \"x\"\n[check]\ntype = \"edge_crossing_edge\"\n",
        )
        .unwrap();
        assert_eq!(config.highway("Primary").unwrap(), HighwayTag::Primary);
        assert!(matches!(
            config.highway("autobahn"),
            Err(ConfigError::UnknownHighway { .. })
        ));
    }

    #[test]
    fn empty_exclusion_matches_nothing() {
        let config = parse_check_toml(
            "inline",
            "id = \"x\"\n[check]\ntype = \"edge_crossing_edge\"\n",
        )
        .unwrap();
        let indoor: Tags = [("indoor", "yes")].into_iter().collect();

        assert!(config.filter("").unwrap().matches(&indoor));
        assert!(!config.exclusion_filter("  ").unwrap().matches(&indoor));
        assert!(!config.exclusion_filter("").unwrap().matches(&Tags::new()));
        assert!(config.exclusion_filter("indoor->*").unwrap().matches(&indoor));
    }

    #[test]
    fn water_exclusions_cover_artificial_water() {
        let exclude = TagFilter::parse(DEFAULT_WATER_BODY_EXCLUDE_FILTER).unwrap();
        let water = |pairs: &[(&str, &str)]| -> Tags { pairs.iter().copied().collect() };

        assert!(exclude.matches(&water(&[("natural", "water"), ("water", "treatment_pond")])));
        assert!(exclude.matches(&water(&[("waterway", "drainage_channel")])));
        assert!(exclude.matches(&water(&[("waterway", "Minnow Falls")])));
        assert!(!exclude.matches(&water(&[("waterway", "river"), ("seasonal", "yes")])));
        assert!(!exclude.matches(&water(&[("natural", "water"), ("tidal", "yes")])));
    }

    #[test]
    fn default_filters_parse() {
        for definition in [
            DEFAULT_WATER_BODY_FILTER,
            DEFAULT_WATER_BODY_EXCLUDE_FILTER,
            DEFAULT_CAN_CROSS_WATER_BODY_FILTER,
            &BuildingSettings::default().can_cross_filter,
            &WaterBodySettings::default().non_offending_nodes,
            &EdgeCrossingSettings::default().indoor_filter,
        ] {
            assert!(TagFilter::parse(definition).is_ok(), "failed to parse {definition}");
        }
    }
}
