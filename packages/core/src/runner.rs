//! Drives checks over a partition.
//!
//! Each check gets its own [`FlagLedger`] for the run. Items are evaluated
//! sequentially or on the rayon pool; a failing item is logged and skipped.
//! Flags come back sorted by dedup key so output does not depend on
//! scheduling.

use std::sync::Arc;

use rayon::prelude::*;
use topocheck_feature_models::{Feature, Relation};
use topocheck_flag_models::Flag;
use topocheck_gateway::TopologyGateway;

use crate::check::{Check, CheckContext, CheckError};
use crate::ledger::FlagLedger;
use crate::progress::CheckProgress;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Evaluate on the calling thread instead of the rayon pool.
    pub sequential: bool,
}

/// Outcome of one check over one partition.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub check: String,
    pub flags: Vec<Flag>,
    /// Features and relations handed to the check.
    pub evaluated: usize,
    /// Items on which the check returned an error.
    pub failed: usize,
}

enum Item<'a> {
    Feature(&'a Feature),
    Relation(&'a Relation),
}

impl Item<'_> {
    fn describe(&self) -> String {
        match self {
            Self::Feature(feature) => feature.key().to_string(),
            Self::Relation(relation) => format!("relation{}", relation.id),
        }
    }
}

fn evaluate<'a>(
    check: &dyn Check,
    context: &CheckContext<'a>,
    item: &Item<'a>,
) -> Result<Vec<Flag>, CheckError> {
    match item {
        Item::Feature(feature) => check.check_feature(context, feature),
        Item::Relation(relation) => check.check_relation(context, relation),
    }
}

/// Runs one check over every eligible feature and relation.
#[must_use]
pub fn run_check(
    check: &dyn Check,
    gateway: &dyn TopologyGateway,
    options: RunOptions,
    progress: &dyn CheckProgress,
) -> CheckReport {
    let ledger = FlagLedger::new();
    let context = CheckContext {
        gateway,
        ledger: &ledger,
    };

    let items: Vec<Item<'_>> = gateway
        .features()
        .iter()
        .filter(|feature| check.accepts_feature(feature))
        .map(Item::Feature)
        .chain(
            gateway
                .relations()
                .iter()
                .filter(|relation| check.accepts_relation(relation))
                .map(Item::Relation),
        )
        .collect();

    progress.started(check.id(), items.len() as u64);

    let run_one = |item: &Item<'_>| {
        let result = evaluate(check, &context, item);
        progress.evaluated(result.as_ref().map_or(0, Vec::len));
        result.map_err(|e| {
            log::error!("{} failed on {}: {e}", check.id(), item.describe());
        })
    };

    let results: Vec<Result<Vec<Flag>, ()>> = if options.sequential {
        items.iter().map(run_one).collect()
    } else {
        items.par_iter().map(run_one).collect()
    };

    let failed = results.iter().filter(|r| r.is_err()).count();
    let mut flags: Vec<Flag> = results.into_iter().flatten().flatten().collect();
    flags.sort_by(|a, b| a.key.cmp(&b.key));

    log::info!(
        "{}: {} flag(s) from {} item(s), {} failure(s)",
        check.id(),
        flags.len(),
        items.len(),
        failed
    );

    let report = CheckReport {
        check: check.id().to_string(),
        flags,
        evaluated: items.len(),
        failed,
    };
    progress.finished(&report);
    report
}

/// Runs every check in order, creating a progress reporter per check.
#[must_use]
pub fn run_checks(
    checks: &[Box<dyn Check>],
    gateway: &dyn TopologyGateway,
    options: RunOptions,
    progress_for: &dyn Fn(&dyn Check) -> Arc<dyn CheckProgress>,
) -> Vec<CheckReport> {
    checks
        .iter()
        .map(|check| {
            let progress = progress_for(check.as_ref());
            run_check(check.as_ref(), gateway, options, progress.as_ref())
        })
        .collect()
}
