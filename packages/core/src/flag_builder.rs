//! Assembly of [`Flag`] records.

use std::collections::BTreeSet;

use topocheck_feature_models::{EntityRef, Feature, Location, Relation};
use topocheck_flag_models::Flag;

use crate::instructions::Instructions;
use crate::ledger::LedgerKey;

/// Why a flag could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlagError {
    /// No template list has an entry at `index`.
    #[error("No instruction template at index {index}")]
    TemplateOutOfRange {
        /// Requested template.
        index: usize,
    },

    /// A template referenced an argument that was not supplied.
    #[error("Placeholder {{{placeholder}}} used but only {available} argument(s) supplied")]
    PlaceholderOutOfRange {
        /// Placeholder number.
        placeholder: usize,
        /// Number of supplied arguments.
        available: usize,
    },

    /// A flag must reference at least one feature or relation.
    #[error("Flag {key} has no members")]
    EmptyMembers {
        /// Dedup key of the rejected flag.
        key: String,
    },
}

/// Builds one flag. Instructions, members, and points accumulate
/// independently; any rendering failure makes [`FlagBuilder::build`] fail
/// as a whole.
#[derive(Debug)]
pub struct FlagBuilder<'a> {
    check: &'a str,
    instructions: &'a Instructions,
    lines: Vec<String>,
    members: BTreeSet<EntityRef>,
    points: BTreeSet<Location>,
    error: Option<FlagError>,
}

impl<'a> FlagBuilder<'a> {
    #[must_use]
    pub const fn new(check: &'a str, instructions: &'a Instructions) -> Self {
        Self {
            check,
            instructions,
            lines: Vec::new(),
            members: BTreeSet::new(),
            points: BTreeSet::new(),
            error: None,
        }
    }

    /// Appends the rendering of template `index`.
    #[must_use]
    pub fn instruction(mut self, index: usize, args: &[String]) -> Self {
        if self.error.is_none() {
            match self.instructions.render(index, args) {
                Ok(line) => self.lines.push(line),
                Err(e) => self.error = Some(e),
            }
        }
        self
    }

    #[must_use]
    pub fn member(mut self, feature: &Feature) -> Self {
        self.members.insert(feature.entity_ref());
        self
    }

    #[must_use]
    pub fn members<'f>(mut self, features: impl IntoIterator<Item = &'f Feature>) -> Self {
        self.members
            .extend(features.into_iter().map(Feature::entity_ref));
        self
    }

    #[must_use]
    pub fn relation(mut self, relation: &Relation) -> Self {
        self.members.insert(relation.entity_ref());
        self
    }

    #[must_use]
    pub fn point(mut self, location: Location) -> Self {
        self.points.insert(location);
        self
    }

    #[must_use]
    pub fn points(mut self, locations: impl IntoIterator<Item = Location>) -> Self {
        self.points.extend(locations);
        self
    }

    /// Finishes the flag under `key`.
    ///
    /// # Errors
    ///
    /// * The first error raised while rendering instructions
    /// * [`FlagError::EmptyMembers`] if no member was added
    pub fn build(self, key: &LedgerKey) -> Result<Flag, FlagError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.members.is_empty() {
            return Err(FlagError::EmptyMembers {
                key: key.to_string(),
            });
        }
        Ok(Flag {
            check: self.check.to_string(),
            key: key.to_string(),
            instructions: self.lines,
            members: self.members,
            points: self.points,
        })
    }
}

#[cfg(test)]
mod tests {
    use topocheck_feature_models::{Edge, PolyLine, Tags};

    use super::*;
    use crate::ledger::LedgerEntity;

    fn edge(id: i64) -> Feature {
        Feature::Edge(Edge {
            id,
            osm_id: id * 10,
            polyline: PolyLine::new(vec![Location::new(0, 0), Location::new(0, 1)]),
            tags: Tags::new(),
            relations: BTreeSet::new(),
            start_node: 0,
            end_node: 0,
        })
    }

    fn key() -> LedgerKey {
        LedgerKey::entity(LedgerEntity::from(&edge(1)))
    }

    #[test]
    fn builds_flag_with_members_and_points() {
        let instructions = Instructions::new(&["Edge {0} is broken"]);
        let flag = FlagBuilder::new("demo", &instructions)
            .instruction(0, &["10".to_string()])
            .members([&edge(1), &edge(2)])
            .member(&edge(1))
            .point(Location::new(0, 1))
            .build(&key())
            .unwrap();

        assert_eq!(flag.instructions, vec!["Edge 10 is broken".to_string()]);
        assert_eq!(flag.members.len(), 2);
        assert_eq!(flag.points.len(), 1);
        assert_eq!(flag.key, "edge1");
    }

    #[test]
    fn rendering_failure_fails_the_whole_flag() {
        let instructions = Instructions::new(&["{0}", "{3}"]);
        let result = FlagBuilder::new("demo", &instructions)
            .instruction(0, &["ok".to_string()])
            .instruction(1, &["only one".to_string()])
            .member(&edge(1))
            .build(&key());
        assert!(matches!(
            result,
            Err(FlagError::PlaceholderOutOfRange { placeholder: 3, .. })
        ));
    }

    #[test]
    fn empty_member_set_is_rejected() {
        let instructions = Instructions::new(&["x"]);
        let result = FlagBuilder::new("demo", &instructions)
            .instruction(0, &[])
            .build(&key());
        assert!(matches!(result, Err(FlagError::EmptyMembers { .. })));
    }
}
