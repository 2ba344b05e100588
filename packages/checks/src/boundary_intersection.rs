//! Boundary relations whose ways cross the ways of other boundaries.
//!
//! Every crossing pair of relations yields one flag. Either relation may be
//! visited first; the pair is claimed in the ledger and the flag is always
//! worded from the relation with the lower identifier, so both visiting
//! orders produce the same record.

use std::collections::{BTreeMap, BTreeSet};

use topocheck_core::check::{Check, CheckContext, CheckError};
use topocheck_core::collector::collect_invalid_crossings;
use topocheck_core::ledger::LedgerKey;
use topocheck_core::policy::ValidityPolicy;
use topocheck_core::{Instructions, TagFilter};
use topocheck_feature_models::{Feature, FeatureKey, FeatureKind, Location, Relation};
use topocheck_flag_models::Flag;

use crate::base::{CheckBase, join_osm_ids};
use crate::config::{BoundarySettings, CheckConfig, ConfigError};

pub const INSTRUCTIONS: &[&str] = &[
    concat!(
        "Boundary {0} with way {1} is crossing invalidly with boundary(ies) {3} with way {2}. ",
        "Two boundaries should not intersect each other."
    ),
    "Boundary {0} with way {1} is crossing invalidly with boundary(ies) {3} with way {2}.",
];

const BOUNDARY: &str = "boundary";
const WAY_KINDS: &[FeatureKind] = &[FeatureKind::Edge, FeatureKind::Line];

pub struct BoundaryIntersection {
    base: CheckBase,
    relation_type: String,
    policy: ValidityPolicy,
}

/// Crossings between one relation's ways and another's.
#[derive(Default)]
struct Contact<'a> {
    own: BTreeMap<FeatureKey, &'a Feature>,
    other: BTreeMap<FeatureKey, &'a Feature>,
    points: BTreeSet<Location>,
}

impl BoundaryIntersection {
    /// # Errors
    ///
    /// * If the configured `tags_filter` is malformed
    pub fn new(config: &CheckConfig, settings: &BoundarySettings) -> Result<Self, ConfigError> {
        Ok(Self {
            base: CheckBase::new(config, INSTRUCTIONS)?,
            relation_type: settings.relation_type.clone(),
            policy: ValidityPolicy::new(),
        })
    }

    fn is_boundary(&self, relation: &Relation) -> bool {
        relation.is_type(&self.relation_type) && relation.tag(BOUNDARY).is_some()
    }
}

fn is_way(feature: &Feature) -> bool {
    match feature {
        Feature::Edge(_) => feature.is_main_edge(),
        Feature::Line(_) => true,
        Feature::Area(_) | Feature::Node(_) | Feature::Point(_) => false,
    }
}

impl Check for BoundaryIntersection {
    fn id(&self) -> &str {
        &self.base.id
    }

    fn instructions(&self) -> &Instructions {
        &self.base.instructions
    }

    fn tags_filter(&self) -> &TagFilter {
        &self.base.tags_filter
    }

    fn validate_relation(&self, relation: &Relation) -> bool {
        self.is_boundary(relation)
    }

    fn check_relation<'a>(
        &self,
        context: &CheckContext<'a>,
        relation: &'a Relation,
    ) -> Result<Vec<Flag>, CheckError> {
        let gateway = context.gateway;
        let ways = relation
            .members_of_kind(WAY_KINDS)
            .filter_map(|key| gateway.feature(key))
            .filter(|feature| is_way(feature));

        let mut contacts: BTreeMap<i64, (&'a Relation, Contact<'a>)> = BTreeMap::new();
        for way in ways {
            let eligible = |candidate: &Feature| {
                is_way(candidate)
                    && !relation.has_member(candidate.key())
                    && gateway
                        .relations_of(candidate)
                        .iter()
                        .any(|other| self.is_boundary(other))
            };
            let crossings =
                collect_invalid_crossings(gateway, way, WAY_KINDS, &eligible, &self.policy);

            for crossing in crossings {
                for other in gateway.relations_of(crossing.feature) {
                    if other.id == relation.id
                        || !self.is_boundary(other)
                        || other.has_member(way.key())
                    {
                        continue;
                    }
                    let (_, contact) = contacts
                        .entry(other.id)
                        .or_insert_with(|| (other, Contact::default()));
                    contact.own.insert(way.key(), way);
                    contact.other.insert(crossing.feature.key(), crossing.feature);
                    contact.points.extend(crossing.locations.iter().copied());
                }
            }
        }

        let mut flags = Vec::new();
        for (other, contact) in contacts.into_values() {
            let key = LedgerKey::pair(relation, other);
            if !context.ledger.try_claim(key.clone()) {
                continue;
            }

            let (subject, target, subject_ways, target_ways) = if relation.id <= other.id {
                (relation, other, &contact.own, &contact.other)
            } else {
                (other, relation, &contact.other, &contact.own)
            };
            log::debug!(
                "{}: boundaries {} and {} cross at {} point(s)",
                self.id(),
                subject.osm_id,
                target.osm_id,
                contact.points.len()
            );

            flags.push(
                self.flag()
                    .instruction(
                        0,
                        &[
                            subject.osm_id.to_string(),
                            join_osm_ids(subject_ways.values().copied()),
                            join_osm_ids(target_ways.values().copied()),
                            target.osm_id.to_string(),
                        ],
                    )
                    .relation(subject)
                    .relation(target)
                    .members(contact.own.values().copied())
                    .members(contact.other.values().copied())
                    .points(contact.points.iter().copied())
                    .build(&key)?,
            );
        }

        Ok(flags)
    }
}
