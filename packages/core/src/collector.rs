//! Per-subject crossing collection.

use std::collections::BTreeSet;

use topocheck_feature_models::{BoundingBox, Feature, FeatureKind, Location};
use topocheck_gateway::TopologyGateway;

use crate::policy::{CrossingCandidate, ValidityPolicy, Verdict};

/// A counterpart whose crossing with the subject was judged invalid.
#[derive(Debug, Clone)]
pub struct InvalidCrossing<'a> {
    pub feature: &'a Feature,
    pub locations: BTreeSet<Location>,
    /// Instruction template chosen by the policy, if any.
    pub instruction: Option<usize>,
}

/// Finds the features that cross `subject` invalidly.
///
/// Candidates are the features of `kinds` whose bounds touch the subject's,
/// excluding the subject itself, that satisfy `eligible`. Candidates whose
/// geometry cannot be intersected are logged and skipped. Results are
/// ordered by candidate key.
pub fn collect_invalid_crossings<'a>(
    gateway: &'a dyn TopologyGateway,
    subject: &'a Feature,
    kinds: &[FeatureKind],
    eligible: &dyn Fn(&Feature) -> bool,
    policy: &ValidityPolicy,
) -> Vec<InvalidCrossing<'a>> {
    let Some(bounds) = subject.bounds() else {
        return Vec::new();
    };
    let subject_key = subject.key();
    let subject_relations = gateway.relations_of(subject);
    let with_nodes = policy.consults_crossing_nodes();

    gateway
        .features_intersecting(&bounds, kinds, &|feature| {
            feature.key() != subject_key && eligible(feature)
        })
        .into_iter()
        .filter_map(|feature| {
            let locations = match gateway.intersection_locations(subject, feature) {
                Ok(locations) => locations,
                Err(e) => {
                    log::debug!("Skipping {} against {subject_key}: {e}", feature.key());
                    return None;
                }
            };

            let crossing_nodes = if with_nodes {
                nodes_at(gateway, &locations)
            } else {
                Vec::new()
            };
            let candidate = CrossingCandidate {
                subject,
                candidate: feature,
                locations,
                subject_relations: subject_relations.clone(),
                candidate_relations: gateway.relations_of(feature),
                crossing_nodes,
            };

            match policy.evaluate(&candidate) {
                Verdict::Invalid { instruction } => Some(InvalidCrossing {
                    feature,
                    locations: candidate.locations,
                    instruction,
                }),
                Verdict::Valid(_) | Verdict::NotApplicable => None,
            }
        })
        .collect()
}

/// Nodes and points located exactly on one of `locations`.
fn nodes_at<'a>(gateway: &'a dyn TopologyGateway, locations: &BTreeSet<Location>) -> Vec<&'a Feature> {
    let corners: Vec<Location> = locations.iter().copied().collect();
    let Some(bounds) = BoundingBox::from_locations(&corners) else {
        return Vec::new();
    };
    gateway.features_intersecting(&bounds, &[FeatureKind::Node, FeatureKind::Point], &|feature| {
        feature
            .locations()
            .first()
            .is_some_and(|location| locations.contains(location))
    })
}

#[cfg(test)]
mod tests {
    use topocheck_feature_models::{FeatureKey, Tags};
    use topocheck_gateway::MemoryAtlas;

    use super::*;
    use crate::ledger::{FlagLedger, LedgerKey};
    use crate::policy::LayerRule;

    fn loc(lat: i64, lon: i64) -> Location {
        Location::new(lat, lon)
    }

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs.iter().copied().collect()
    }

    #[test]
    fn keeps_only_invalid_counterparts() {
        let atlas = MemoryAtlas::builder()
            .edge(1, 1, vec![loc(0, 0), loc(0, 100)], tags(&[("highway", "primary")]))
            .edge(2, 2, vec![loc(-50, 50), loc(50, 50)], tags(&[("highway", "primary")]))
            .edge(
                3,
                3,
                vec![loc(-50, 20), loc(50, 20)],
                tags(&[("highway", "primary"), ("layer", "1")]),
            )
            .edge(4, 4, vec![loc(-50, 80), loc(0, 80), loc(50, 80)], tags(&[("highway", "primary")]))
            .edge(5, 5, vec![loc(10, 0), loc(10, 100)], tags(&[("highway", "primary")]))
            .build()
            .unwrap();

        let subject = atlas.feature(FeatureKey::edge(1)).unwrap();
        let policy = ValidityPolicy::new().with_layer_rule(LayerRule::layer());
        let crossings =
            collect_invalid_crossings(&atlas, subject, &[FeatureKind::Edge], &|_| true, &policy);

        let ids: Vec<i64> = crossings.iter().map(|c| c.feature.id()).collect();
        assert_eq!(
            ids,
            vec![2, 4],
            "edge 3 is on another layer and edge 5 does not touch the subject"
        );
        assert_eq!(crossings[0].locations, BTreeSet::from([loc(0, 50)]));
    }

    #[test]
    fn swapped_subjects_claim_the_same_pair() {
        let atlas = MemoryAtlas::builder()
            .edge(1, 1, vec![loc(0, 0), loc(0, 100)], tags(&[("highway", "primary")]))
            .edge(2, 2, vec![loc(-50, 50), loc(50, 50)], tags(&[("highway", "primary")]))
            .build()
            .unwrap();
        let policy = ValidityPolicy::new();
        let ledger = FlagLedger::new();

        let mut claims = Vec::new();
        for id in [1, 2] {
            let subject = atlas.feature(FeatureKey::edge(id)).unwrap();
            let crossings =
                collect_invalid_crossings(&atlas, subject, &[FeatureKind::Edge], &|_| true, &policy);
            assert_eq!(crossings.len(), 1);
            claims.push(ledger.try_claim(LedgerKey::pair(subject, crossings[0].feature)));
        }

        assert_eq!(claims, vec![true, false], "the reverse evaluation must be rejected");
    }
}
