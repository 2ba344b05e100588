//! The contract every validation check implements.

use topocheck_feature_models::{Feature, FeatureKind, Relation};
use topocheck_flag_models::Flag;
use topocheck_gateway::{GeometryError, TopologyGateway};

use crate::flag_builder::{FlagBuilder, FlagError};
use crate::instructions::Instructions;
use crate::ledger::FlagLedger;
use crate::tag_filter::TagFilter;

/// Failure of one check on one feature or relation. The runner logs it and
/// moves on.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// A flag could not be assembled.
    #[error("Flag construction failed: {0}")]
    Flag(#[from] FlagError),

    /// Geometry needed by the check was unusable.
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),
}

/// Shared state handed to a check while it evaluates one item.
#[derive(Clone, Copy)]
pub struct CheckContext<'a> {
    pub gateway: &'a dyn TopologyGateway,
    /// Ledger scoped to this check for the current run.
    pub ledger: &'a FlagLedger,
}

/// A validation check over features and/or relations.
///
/// The runner calls [`Check::check_feature`] for every feature whose kind is
/// in [`Check::feature_kinds`], that matches [`Check::tags_filter`], and that
/// passes [`Check::validate_feature`]; relations go through the equivalent
/// relation methods.
pub trait Check: Send + Sync {
    /// Stable identifier (e.g. `edge_crossing_edge`).
    fn id(&self) -> &str;

    fn instructions(&self) -> &Instructions;

    /// Additional configured eligibility filter.
    fn tags_filter(&self) -> &TagFilter;

    /// Feature kinds this check evaluates. Empty for relation-only checks.
    fn feature_kinds(&self) -> &[FeatureKind] {
        &[]
    }

    fn validate_feature(&self, _feature: &Feature) -> bool {
        false
    }

    /// # Errors
    ///
    /// * If a flag for this feature cannot be produced
    fn check_feature<'a>(
        &self,
        _context: &CheckContext<'a>,
        _feature: &'a Feature,
    ) -> Result<Vec<Flag>, CheckError> {
        Ok(Vec::new())
    }

    fn validate_relation(&self, _relation: &Relation) -> bool {
        false
    }

    /// # Errors
    ///
    /// * If a flag for this relation cannot be produced
    fn check_relation<'a>(
        &self,
        _context: &CheckContext<'a>,
        _relation: &'a Relation,
    ) -> Result<Vec<Flag>, CheckError> {
        Ok(Vec::new())
    }

    /// Starts a flag rendered with this check's instructions.
    fn flag(&self) -> FlagBuilder<'_> {
        FlagBuilder::new(self.id(), self.instructions())
    }

    /// Whether the runner should hand `feature` to [`Check::check_feature`].
    fn accepts_feature(&self, feature: &Feature) -> bool {
        self.feature_kinds().contains(&feature.kind())
            && self.tags_filter().matches(feature.tags())
            && self.validate_feature(feature)
    }

    /// Whether the runner should hand `relation` to [`Check::check_relation`].
    fn accepts_relation(&self, relation: &Relation) -> bool {
        self.tags_filter().matches(&relation.tags) && self.validate_relation(relation)
    }
}
