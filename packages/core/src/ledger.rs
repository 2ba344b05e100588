//! Run-scoped registry of flagged defects.
//!
//! The ledger is the only shared mutable state during a run. A claim is a
//! single atomic insert into a [`DashSet`], so two workers racing on the
//! same defect can never both win.

use dashmap::DashSet;
use topocheck_feature_models::{EntityKind, EntityRef, Feature, Relation};

/// Identity of a single entity inside a ledger key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LedgerEntity {
    pub kind: EntityKind,
    pub id: i64,
}

impl From<&Feature> for LedgerEntity {
    fn from(feature: &Feature) -> Self {
        Self {
            kind: feature.kind().into(),
            id: feature.id(),
        }
    }
}

impl From<&Relation> for LedgerEntity {
    fn from(relation: &Relation) -> Self {
        Self {
            kind: EntityKind::Relation,
            id: relation.id,
        }
    }
}

impl From<EntityRef> for LedgerEntity {
    fn from(entity: EntityRef) -> Self {
        Self {
            kind: entity.kind,
            id: entity.id,
        }
    }
}

impl std::fmt::Display for LedgerEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind, self.id)
    }
}

/// A claimable defect identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LedgerKey {
    Entity(LedgerEntity),
    /// An OSM object, shared by every partition feature cut from it.
    Osm(LedgerEntity),
    /// An unordered pair, stored with the smaller entity first.
    Pair(LedgerEntity, LedgerEntity),
    /// A component or cluster identity built by the caller.
    Composite(String),
}

impl LedgerKey {
    #[must_use]
    pub fn entity(entity: impl Into<LedgerEntity>) -> Self {
        Self::Entity(entity.into())
    }

    /// Keys the OSM object behind `entity` rather than the partition item.
    #[must_use]
    pub const fn osm(entity: EntityRef) -> Self {
        Self::Osm(LedgerEntity {
            kind: entity.kind,
            id: entity.osm_id,
        })
    }

    /// Builds a pair key; argument order does not matter.
    #[must_use]
    pub fn pair(a: impl Into<LedgerEntity>, b: impl Into<LedgerEntity>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b { Self::Pair(a, b) } else { Self::Pair(b, a) }
    }

    /// Builds a component key from member entities; order and duplicates do
    /// not matter.
    #[must_use]
    pub fn component<I, E>(members: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<LedgerEntity>,
    {
        let members: std::collections::BTreeSet<LedgerEntity> =
            members.into_iter().map(Into::into).collect();
        Self::Composite(
            members
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

impl std::fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Entity(entity) => write!(f, "{entity}"),
            Self::Osm(entity) => write!(f, "osm:{entity}"),
            Self::Pair(a, b) => write!(f, "{a}:{b}"),
            Self::Composite(key) => write!(f, "[{key}]"),
        }
    }
}

/// Set of claimed defect keys for one check over one partition.
#[derive(Debug, Default)]
pub struct FlagLedger {
    claimed: DashSet<LedgerKey>,
}

impl FlagLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key`. Returns `true` only for the first caller.
    pub fn try_claim(&self, key: LedgerKey) -> bool {
        self.claimed.insert(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn edge(id: i64) -> LedgerEntity {
        LedgerEntity {
            kind: EntityKind::Edge,
            id,
        }
    }

    #[test]
    fn second_claim_fails() {
        let ledger = FlagLedger::new();
        assert!(ledger.try_claim(LedgerKey::entity(edge(1))));
        assert!(!ledger.try_claim(LedgerKey::entity(edge(1))));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn pair_keys_are_symmetric() {
        let ledger = FlagLedger::new();
        assert!(ledger.try_claim(LedgerKey::pair(edge(2), edge(1))));
        assert!(
            !ledger.try_claim(LedgerKey::pair(edge(1), edge(2))),
            "the swapped pair must be rejected"
        );
        assert_eq!(LedgerKey::pair(edge(2), edge(1)).to_string(), "edge1:edge2");
    }

    #[test]
    fn osm_keys_span_sub_features() {
        let ledger = FlagLedger::new();
        let section = |id| EntityRef {
            kind: EntityKind::Area,
            id,
            osm_id: 40,
        };
        assert!(ledger.try_claim(LedgerKey::osm(section(40_000_001))));
        assert!(!ledger.try_claim(LedgerKey::osm(section(40_000_002))));
        assert!(
            ledger.try_claim(LedgerKey::entity(section(40))),
            "partition identifiers are a separate key space"
        );
        assert_eq!(LedgerKey::osm(section(1)).to_string(), "osm:area40");
    }

    #[test]
    fn component_keys_ignore_order() {
        assert_eq!(
            LedgerKey::component([edge(3), edge(1), edge(3)]),
            LedgerKey::component([edge(1), edge(3)])
        );
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        let ledger = Arc::new(FlagLedger::new());
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let wins = Arc::clone(&wins);
                std::thread::spawn(move || {
                    if ledger.try_claim(LedgerKey::entity(edge(7))) {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }
}
