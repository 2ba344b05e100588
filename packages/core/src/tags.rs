//! Tag semantics shared by the checks: highway classes, vertical layering,
//! and common feature predicates.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use topocheck_feature_models::{Feature, Tags};

pub const HIGHWAY: &str = "highway";
pub const LAYER: &str = "layer";
pub const LEVEL: &str = "level";

/// Value of the `highway` tag, declared from most to least important.
///
/// The derived ordering follows declaration order, so `Motorway` is the
/// smallest value.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum HighwayTag {
    Motorway,
    Trunk,
    Primary,
    Secondary,
    Tertiary,
    Unclassified,
    Residential,
    Service,
    MotorwayLink,
    TrunkLink,
    PrimaryLink,
    SecondaryLink,
    TertiaryLink,
    LivingStreet,
    Pedestrian,
    Track,
    BusGuideway,
    Raceway,
    Road,
    Footway,
    Bridleway,
    Steps,
    Corridor,
    Path,
    Cycleway,
    Crossing,
    Construction,
    Proposed,
    Platform,
    TollGantry,
    No,
}

impl HighwayTag {
    /// Parses the `highway` tag of a tag map. Unknown values yield `None`.
    #[must_use]
    pub fn from_tags(tags: &Tags) -> Option<Self> {
        tags.get(HIGHWAY).and_then(|value| value.parse().ok())
    }

    #[must_use]
    pub fn of(feature: &Feature) -> Option<Self> {
        Self::from_tags(feature.tags())
    }

    /// Whether this class lies between `least` and `most` important,
    /// inclusive.
    #[must_use]
    pub fn is_between(self, least: Self, most: Self) -> bool {
        self <= least && self >= most
    }

    /// Whether this class is at least as important as `other`.
    #[must_use]
    pub fn is_at_least(self, other: Self) -> bool {
        self <= other
    }

    #[must_use]
    pub const fn is_car_navigable(self) -> bool {
        matches!(
            self,
            Self::Motorway
                | Self::Trunk
                | Self::Primary
                | Self::Secondary
                | Self::Tertiary
                | Self::Unclassified
                | Self::Residential
                | Self::Service
                | Self::MotorwayLink
                | Self::TrunkLink
                | Self::PrimaryLink
                | Self::SecondaryLink
                | Self::TertiaryLink
                | Self::LivingStreet
                | Self::Track
                | Self::Road
        )
    }

    #[must_use]
    pub const fn is_pedestrian_navigable(self) -> bool {
        matches!(
            self,
            Self::LivingStreet
                | Self::Pedestrian
                | Self::Footway
                | Self::Steps
                | Self::Corridor
                | Self::Path
                | Self::Crossing
        )
    }
}

/// Which navigability classes an edge may belong to. An edge qualifies when
/// it belongs to at least one enabled class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigability {
    pub car: bool,
    pub pedestrian: bool,
}

impl Navigability {
    #[must_use]
    pub const fn car() -> Self {
        Self {
            car: true,
            pedestrian: false,
        }
    }

    #[must_use]
    pub const fn admits(self, highway: HighwayTag) -> bool {
        (self.car && highway.is_car_navigable())
            || (self.pedestrian && highway.is_pedestrian_navigable())
    }
}

impl Default for Navigability {
    fn default() -> Self {
        Self::car()
    }
}

/// Integer value of `key`, if present and parseable.
#[must_use]
pub fn integer_tag(tags: &Tags, key: &str) -> Option<i64> {
    tags.get(key).and_then(|value| value.trim().parse().ok())
}

/// `level` value, or `default` when absent.
#[must_use]
pub fn level_or<'a>(tags: &'a Tags, default: &'a str) -> &'a str {
    tags.get(LEVEL).unwrap_or(default)
}

/// `layer` value, or `0` when absent or unparseable.
#[must_use]
pub fn layer_or_zero(tags: &Tags) -> i64 {
    integer_tag(tags, LAYER).unwrap_or(0)
}

#[must_use]
pub fn is_roundabout(tags: &Tags) -> bool {
    tags.is("junction", "roundabout")
}

/// `oneway=no`.
#[must_use]
pub fn is_explicitly_two_way(tags: &Tags) -> bool {
    tags.is("oneway", "no")
}

/// `building` present and not `no`.
#[must_use]
pub fn is_building(tags: &Tags) -> bool {
    tags.get("building").is_some_and(|v| !v.eq_ignore_ascii_case("no"))
}

/// `bridge` present and not `no`.
#[must_use]
pub fn is_bridge(tags: &Tags) -> bool {
    tags.get("bridge").is_some_and(|v| !v.eq_ignore_ascii_case("no"))
}
