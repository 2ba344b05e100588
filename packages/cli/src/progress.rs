//! Per-check `indicatif` bars, plus logger setup that keeps log lines from
//! tearing through the bars.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use topocheck_core::{Check, CheckProgress, CheckReport};

/// One bar per check. Spins until the runner has collected the check's
/// items, then counts evaluated items with the running flag total in the
/// message.
pub struct CheckBar {
    bar: ProgressBar,
    bar_style: ProgressStyle,
    check: String,
    flags: AtomicUsize,
}

impl CheckBar {
    #[must_use]
    pub fn new(multi: &MultiProgress, check: &dyn Check) -> Arc<dyn CheckProgress> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(format!("{}: collecting items", check.id()));

        let bar_style = ProgressStyle::with_template(
            "  {msg:32} {wide_bar:.cyan/dim} {pos}/{len} items [{eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Arc::new(Self {
            bar,
            bar_style,
            check: check.id().to_string(),
            flags: AtomicUsize::new(0),
        })
    }
}

/// Closing line of a check's bar.
fn summary(report: &CheckReport) -> String {
    let mut line = format!(
        "{}: {} flag(s) from {} item(s)",
        report.check,
        report.flags.len(),
        report.evaluated
    );
    if report.failed > 0 {
        line.push_str(&format!(", {} failed", report.failed));
    }
    line
}

impl CheckProgress for CheckBar {
    fn started(&self, _check: &str, items: u64) {
        self.bar.set_length(items);
        self.bar.set_position(0);
        self.bar.set_style(self.bar_style.clone());
        self.bar.set_message(self.check.clone());
    }

    fn evaluated(&self, flags: usize) {
        if flags > 0 {
            let total = self.flags.fetch_add(flags, Ordering::Relaxed) + flags;
            self.bar.set_message(format!("{} ({total} flagged)", self.check));
        }
        self.bar.inc(1);
    }

    fn finished(&self, report: &CheckReport) {
        self.bar.finish_with_message(summary(report));
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge`, honouring
/// `RUST_LOG`.
///
/// Returns the [`MultiProgress`] that all check bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // Already set (e.g., in tests)

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(failed: usize) -> CheckReport {
        CheckReport {
            check: "edge_crossing_edge".to_string(),
            flags: Vec::new(),
            evaluated: 12,
            failed,
        }
    }

    #[test]
    fn summary_mentions_failures_only_when_present() {
        assert_eq!(summary(&report(0)), "edge_crossing_edge: 0 flag(s) from 12 item(s)");
        assert_eq!(
            summary(&report(2)),
            "edge_crossing_edge: 0 flag(s) from 12 item(s), 2 failed"
        );
    }
}
