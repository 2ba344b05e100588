//! Breadth-first connected-component expansion.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use topocheck_feature_models::{Feature, FeatureKey};

/// Keys already reached by a walk. Directed edges have distinct ids per
/// direction, so each direction is tracked separately.
pub type VisitedSet = BTreeSet<FeatureKey>;

/// Collects every feature reachable from `seed` through `next_candidates`.
///
/// Expansion is iterative and stops at keys already in `visited`, so it
/// terminates on cyclic graphs. The seed is part of the result unless it
/// was already visited, in which case the result is empty. Callers that
/// share `visited` across walks get disjoint results.
pub fn walk<'a, F>(
    seed: &'a Feature,
    mut next_candidates: F,
    visited: &mut VisitedSet,
) -> BTreeMap<FeatureKey, &'a Feature>
where
    F: FnMut(&'a Feature) -> Vec<&'a Feature>,
{
    let mut found = BTreeMap::new();
    if !visited.insert(seed.key()) {
        return found;
    }

    let mut queue = VecDeque::from([seed]);
    found.insert(seed.key(), seed);

    while let Some(current) = queue.pop_front() {
        for next in next_candidates(current) {
            let key = next.key();
            if visited.insert(key) {
                found.insert(key, next);
                queue.push_back(next);
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use topocheck_feature_models::{Edge, Location, PolyLine, Tags};

    use super::*;

    fn edge(id: i64) -> Feature {
        Feature::Edge(Edge {
            id,
            osm_id: id,
            polyline: PolyLine::new(vec![Location::new(0, 0), Location::new(0, 1)]),
            tags: Tags::new(),
            relations: BTreeSet::new(),
            start_node: 0,
            end_node: 0,
        })
    }

    /// A ring of `n` edges where each edge links to the next, plus an exit
    /// edge hanging off edge 1.
    fn ring_with_exit(n: i64) -> Vec<Feature> {
        (1..=n).map(edge).chain(std::iter::once(edge(100))).collect()
    }

    #[test]
    fn ring_walk_terminates_and_is_complete() {
        let features = ring_with_exit(4);
        let by_id = |id: i64| features.iter().find(|f| f.id() == id).unwrap();

        let mut visited = VisitedSet::new();
        let found = walk(
            by_id(1),
            |current| {
                let id = current.id();
                if id == 100 {
                    return vec![];
                }
                let next = if id == 4 { 1 } else { id + 1 };
                let mut out = vec![by_id(next)];
                if id == 1 {
                    out.push(by_id(100));
                }
                out
            },
            &mut visited,
        );

        assert_eq!(found.len(), 5, "ring of 4 plus one exit");
        let ring = found.keys().filter(|key| key.id != 100).count();
        assert_eq!(found.len() - ring, 1, "valence is one");
    }

    #[test]
    fn visited_seed_yields_nothing() {
        let seed = edge(1);
        let mut visited = VisitedSet::from([seed.key()]);
        assert!(walk(&seed, |_| vec![], &mut visited).is_empty());
    }
}
