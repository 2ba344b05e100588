//! Crossing validity evaluation.
//!
//! A [`ValidityPolicy`] is a small rule table evaluated in a fixed order:
//! shared node, vertical separation, tag permits, structural inference.
//! The first rule that sanctions the crossing wins; if none does the
//! crossing is invalid. Policies hold no mutable state and are shared
//! freely across worker threads.

use std::collections::BTreeSet;

use topocheck_feature_models::{Feature, Location, Relation, Tags};

use crate::tag_filter::TagFilter;
use crate::tags::integer_tag;

/// A geometric crossing between two features, with the relations both
/// belong to.
#[derive(Debug, Clone)]
pub struct CrossingCandidate<'a> {
    pub subject: &'a Feature,
    pub candidate: &'a Feature,
    pub locations: BTreeSet<Location>,
    pub subject_relations: Vec<&'a Relation>,
    pub candidate_relations: Vec<&'a Relation>,
    /// Nodes and points sitting on the crossing locations. Only gathered
    /// for policies that consult them.
    pub crossing_nodes: Vec<&'a Feature>,
}

impl<'a> CrossingCandidate<'a> {
    fn feature(&self, side: Side) -> &'a Feature {
        match side {
            Side::Subject | Side::Either => self.subject,
            Side::Candidate => self.candidate,
        }
    }

    fn relations(&self, side: Side) -> &[&'a Relation] {
        match side {
            Side::Subject | Side::Either => &self.subject_relations,
            Side::Candidate => &self.candidate_relations,
        }
    }

    /// Whether `predicate` holds for the feature(s) on `side`.
    fn any_side(&self, side: Side, predicate: impl Fn(&Feature, &[&Relation]) -> bool) -> bool {
        match side {
            Side::Subject | Side::Candidate => {
                predicate(self.feature(side), self.relations(side))
            }
            Side::Either => {
                predicate(self.subject, &self.subject_relations)
                    || predicate(self.candidate, &self.candidate_relations)
            }
        }
    }
}

/// Whose tags a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Subject,
    Candidate,
    Either,
}

/// Why a crossing was judged valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidReason {
    SharedNode,
    VerticalSeparation,
    Permitted,
    StructuralInference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid(ValidReason),
    /// Carries the instruction template to report the crossing with, if the
    /// policy selects one.
    Invalid {
        instruction: Option<usize>,
    },
    /// No intersection to judge.
    NotApplicable,
}

impl Verdict {
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        matches!(self, Self::Invalid { .. })
    }
}

/// Vertical separation by a numeric tag such as `layer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRule {
    pub key: String,
    /// Value used when the tag is absent. `None` requires both features to
    /// be tagged explicitly.
    pub default: Option<i64>,
}

impl LayerRule {
    /// `layer`, defaulting to `0`.
    #[must_use]
    pub fn layer() -> Self {
        Self {
            key: crate::tags::LAYER.to_string(),
            default: Some(0),
        }
    }

    #[must_use]
    pub fn resolve(&self, tags: &Tags) -> Option<i64> {
        integer_tag(tags, &self.key).or(self.default)
    }

    fn separates(&self, a: &Tags, b: &Tags) -> bool {
        matches!((self.resolve(a), self.resolve(b)), (Some(x), Some(y)) if x != y)
    }
}

/// A tag-based permission for a crossing.
#[derive(Debug, Clone)]
pub enum Permit {
    /// The feature on `side` matches `filter`.
    Tags { side: Side, filter: TagFilter },
    /// The feature on `side` has a key starting with `prefix`.
    KeyPrefix { side: Side, prefix: String },
    /// Every crossing location carries a node or point matching `filter`,
    /// such as a ford or a slipway.
    NodesAt { filter: TagFilter },
}

impl Permit {
    fn allows(&self, candidate: &CrossingCandidate<'_>) -> bool {
        match self {
            Self::Tags { side, filter } => {
                candidate.any_side(*side, |feature, _| filter.matches(feature.tags()))
            }
            Self::KeyPrefix { side, prefix } => candidate.any_side(*side, |feature, _| {
                feature.tags().has_key_starting_with(prefix)
            }),
            Self::NodesAt { filter } => candidate.locations.iter().all(|&location| {
                candidate.crossing_nodes.iter().any(|node| {
                    node.locations().first() == Some(&location) && filter.matches(node.tags())
                })
            }),
        }
    }
}

/// Inference of un-ingested or structural features that may cross freely.
#[derive(Debug, Clone)]
pub enum StructuralRule {
    /// No tags and no relation membership: a boundary or coastline fragment.
    Untagged { side: Side },
    /// Member of a multipolygon relation whose tags match `filter`.
    MultipolygonMember { side: Side, filter: TagFilter },
    /// Only tags from `keys` (e.g. `note`, `source`).
    NeutralTagsOnly { side: Side, keys: BTreeSet<String> },
}

impl StructuralRule {
    fn allows(&self, candidate: &CrossingCandidate<'_>) -> bool {
        match self {
            Self::Untagged { side } => candidate.any_side(*side, |feature, relations| {
                feature.tags().is_empty() && feature.relations().is_empty() && relations.is_empty()
            }),
            Self::MultipolygonMember { side, filter } => {
                candidate.any_side(*side, |_, relations| {
                    relations
                        .iter()
                        .any(|relation| relation.is_multipolygon() && filter.matches(&relation.tags))
                })
            }
            Self::NeutralTagsOnly { side, keys } => candidate.any_side(*side, |feature, _| {
                !feature.tags().is_empty() && feature.tags().keys().all(|key| keys.contains(key))
            }),
        }
    }
}

/// Ordered rule table deciding whether a crossing is sanctioned.
#[derive(Debug, Clone)]
pub struct ValidityPolicy {
    layers: Vec<LayerRule>,
    permits: Vec<Permit>,
    structural: Vec<StructuralRule>,
    invalid_instruction: Option<usize>,
}

impl Default for ValidityPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidityPolicy {
    /// A policy with only the shared-node rule.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            layers: Vec::new(),
            permits: Vec::new(),
            structural: Vec::new(),
            invalid_instruction: None,
        }
    }

    #[must_use]
    pub fn with_layer_rule(mut self, rule: LayerRule) -> Self {
        self.layers.push(rule);
        self
    }

    #[must_use]
    pub fn with_permit(mut self, permit: Permit) -> Self {
        self.permits.push(permit);
        self
    }

    #[must_use]
    pub fn with_structural_rule(mut self, rule: StructuralRule) -> Self {
        self.structural.push(rule);
        self
    }

    #[must_use]
    pub fn with_invalid_instruction(mut self, index: usize) -> Self {
        self.invalid_instruction = Some(index);
        self
    }

    /// Whether [`CrossingCandidate::crossing_nodes`] must be gathered.
    #[must_use]
    pub fn consults_crossing_nodes(&self) -> bool {
        self.permits
            .iter()
            .any(|permit| matches!(permit, Permit::NodesAt { .. }))
    }

    /// Judges one crossing.
    #[must_use]
    pub fn evaluate(&self, candidate: &CrossingCandidate<'_>) -> Verdict {
        if candidate.locations.is_empty() {
            return Verdict::NotApplicable;
        }

        if candidate.locations.iter().all(|&location| {
            candidate.subject.has_vertex(location) && candidate.candidate.has_vertex(location)
        }) {
            return Verdict::Valid(ValidReason::SharedNode);
        }

        if self
            .layers
            .iter()
            .any(|rule| rule.separates(candidate.subject.tags(), candidate.candidate.tags()))
        {
            return Verdict::Valid(ValidReason::VerticalSeparation);
        }

        if self.permits.iter().any(|permit| permit.allows(candidate)) {
            return Verdict::Valid(ValidReason::Permitted);
        }

        if self.structural.iter().any(|rule| rule.allows(candidate)) {
            return Verdict::Valid(ValidReason::StructuralInference);
        }

        Verdict::Invalid {
            instruction: self.invalid_instruction,
        }
    }
}

#[cfg(test)]
mod tests {
    use topocheck_feature_models::{Edge, Line, Node, PolyLine};

    use super::*;

    fn edge(id: i64, points: &[(i64, i64)], tags: &[(&str, &str)]) -> Feature {
        Feature::Edge(Edge {
            id,
            osm_id: id,
            polyline: PolyLine::new(points.iter().map(|&(a, b)| Location::new(a, b)).collect()),
            tags: tags.iter().copied().collect(),
            relations: BTreeSet::new(),
            start_node: 0,
            end_node: 0,
        })
    }

    fn line(id: i64, points: &[(i64, i64)], tags: &[(&str, &str)]) -> Feature {
        Feature::Line(Line {
            id,
            osm_id: id,
            polyline: PolyLine::new(points.iter().map(|&(a, b)| Location::new(a, b)).collect()),
            tags: tags.iter().copied().collect(),
            relations: BTreeSet::new(),
        })
    }

    fn crossing<'a>(subject: &'a Feature, candidate: &'a Feature, at: &[(i64, i64)]) -> CrossingCandidate<'a> {
        CrossingCandidate {
            subject,
            candidate,
            locations: at.iter().map(|&(a, b)| Location::new(a, b)).collect(),
            subject_relations: Vec::new(),
            candidate_relations: Vec::new(),
            crossing_nodes: Vec::new(),
        }
    }

    #[test]
    fn no_intersection_is_not_applicable() {
        let a = edge(1, &[(0, 0), (0, 10)], &[("highway", "primary")]);
        let b = edge(2, &[(5, 0), (5, 10)], &[("highway", "primary")]);
        let verdict = ValidityPolicy::new().evaluate(&crossing(&a, &b, &[]));
        assert_eq!(verdict, Verdict::NotApplicable);
    }

    #[test]
    fn shared_vertex_is_valid() {
        let a = edge(1, &[(0, 0), (0, 5), (0, 10)], &[("highway", "primary")]);
        let b = edge(2, &[(-5, 5), (0, 5), (5, 5)], &[("highway", "primary")]);
        let verdict = ValidityPolicy::new().evaluate(&crossing(&a, &b, &[(0, 5)]));
        assert_eq!(verdict, Verdict::Valid(ValidReason::SharedNode));
    }

    #[test]
    fn vertex_on_one_side_only_is_invalid() {
        let a = edge(1, &[(0, 0), (0, 5), (0, 10)], &[("highway", "primary")]);
        let b = edge(2, &[(-5, 5), (5, 5)], &[("highway", "primary")]);
        let verdict = ValidityPolicy::new()
            .with_invalid_instruction(1)
            .evaluate(&crossing(&a, &b, &[(0, 5)]));
        assert_eq!(verdict, Verdict::Invalid { instruction: Some(1) });
    }

    #[test]
    fn layer_difference_separates() {
        let a = edge(1, &[(0, 0), (0, 10)], &[("highway", "primary"), ("layer", "1")]);
        let b = edge(2, &[(-5, 5), (5, 5)], &[("highway", "primary")]);
        let policy = ValidityPolicy::new().with_layer_rule(LayerRule::layer());
        assert_eq!(
            policy.evaluate(&crossing(&a, &b, &[(0, 5)])),
            Verdict::Valid(ValidReason::VerticalSeparation)
        );

        let strict = ValidityPolicy::new().with_layer_rule(LayerRule {
            default: None,
            ..LayerRule::layer()
        });
        assert!(
            strict.evaluate(&crossing(&a, &b, &[(0, 5)])).is_invalid(),
            "without a default both features must carry the layer tag"
        );
    }

    #[test]
    fn ford_node_at_every_crossing_permits() {
        let water = line(1, &[(0, 0), (0, 10)], &[("waterway", "river")]);
        let road = edge(2, &[(-5, 5), (5, 5), (5, 8), (-5, 8)], &[("highway", "track")]);
        let ford = Feature::Node(Node {
            id: 7,
            osm_id: 7,
            location: Location::new(0, 5),
            tags: [("ford", "yes")].into_iter().collect(),
            relations: BTreeSet::new(),
        });
        let policy = ValidityPolicy::new().with_permit(Permit::NodesAt {
            filter: TagFilter::parse("ford->!no&ford->*").unwrap(),
        });
        assert!(policy.consults_crossing_nodes());

        let mut at_ford = crossing(&water, &road, &[(0, 5)]);
        at_ford.crossing_nodes = vec![&ford];
        assert_eq!(policy.evaluate(&at_ford), Verdict::Valid(ValidReason::Permitted));

        let mut twice = crossing(&water, &road, &[(0, 5), (0, 8)]);
        twice.crossing_nodes = vec![&ford];
        assert!(
            policy.evaluate(&twice).is_invalid(),
            "the second crossing has no ford"
        );
    }

    #[test]
    fn permit_ownership_is_respected() {
        let water = line(1, &[(0, 0), (0, 10)], &[("waterway", "river"), ("bridge", "yes")]);
        let road = edge(2, &[(-5, 5), (5, 5)], &[("highway", "primary")]);
        let policy = ValidityPolicy::new().with_permit(Permit::Tags {
            side: Side::Candidate,
            filter: TagFilter::parse("bridge->yes").unwrap(),
        });
        assert!(
            policy.evaluate(&crossing(&water, &road, &[(0, 5)])).is_invalid(),
            "a bridge tag on the subject must not permit the candidate"
        );
        assert_eq!(
            policy.evaluate(&crossing(&road, &water, &[(0, 5)])),
            Verdict::Valid(ValidReason::Permitted)
        );
    }

    #[test]
    fn untagged_lines_are_inferred_structural() {
        let water = line(1, &[(0, 0), (0, 10)], &[("waterway", "river")]);
        let bare = line(2, &[(-5, 5), (5, 5)], &[]);
        let policy = ValidityPolicy::new()
            .with_structural_rule(StructuralRule::Untagged { side: Side::Candidate });
        assert_eq!(
            policy.evaluate(&crossing(&water, &bare, &[(0, 5)])),
            Verdict::Valid(ValidReason::StructuralInference)
        );
    }

    #[test]
    fn neutral_tags_only() {
        let water = line(1, &[(0, 0), (0, 10)], &[("waterway", "river")]);
        let noted = line(2, &[(-5, 5), (5, 5)], &[("note", "x"), ("source", "survey")]);
        let named = line(3, &[(-5, 5), (5, 5)], &[("note", "x"), ("name", "y")]);
        let policy = ValidityPolicy::new().with_structural_rule(StructuralRule::NeutralTagsOnly {
            side: Side::Candidate,
            keys: ["note", "source"].into_iter().map(String::from).collect(),
        });
        assert!(!policy.evaluate(&crossing(&water, &noted, &[(0, 5)])).is_invalid());
        assert!(policy.evaluate(&crossing(&water, &named, &[(0, 5)])).is_invalid());
    }
}
