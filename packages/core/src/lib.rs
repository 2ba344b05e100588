#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crossing validity engine.
//!
//! The pipeline a check runs for one subject feature:
//!
//! 1. eligibility ([`Check::accepts_feature`], [`tag_filter::TagFilter`])
//! 2. candidate collection ([`collector::collect_invalid_crossings`]) judged
//!    by a [`policy::ValidityPolicy`]
//! 3. optional component expansion ([`walker::walk`])
//! 4. at-most-once claiming ([`ledger::FlagLedger`])
//! 5. flag assembly ([`flag_builder::FlagBuilder`])
//!
//! [`runner`] drives checks over a whole partition.

pub mod check;
pub mod collector;
pub mod flag_builder;
pub mod instructions;
pub mod ledger;
pub mod policy;
pub mod progress;
pub mod runner;
pub mod tag_filter;
pub mod tags;
pub mod walker;

pub use check::{Check, CheckContext, CheckError};
pub use flag_builder::{FlagBuilder, FlagError};
pub use instructions::Instructions;
pub use ledger::{FlagLedger, LedgerEntity, LedgerKey};
pub use policy::{CrossingCandidate, LayerRule, Permit, Side, StructuralRule, ValidityPolicy, Verdict};
pub use progress::{CheckProgress, NullProgress, ProgressTally, null_progress};
pub use runner::{CheckReport, RunOptions, run_check, run_checks};
pub use tag_filter::{FilterParseError, TagFilter};
pub use tags::{HighwayTag, Navigability};
