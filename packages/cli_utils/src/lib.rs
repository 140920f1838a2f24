#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal progress and logging for the `employment_map` binary.
//!
//! Each pipeline phase gets its own [`PhaseBar`]. Log output goes through
//! `indicatif-log-bridge` so log lines print above the bars instead of
//! tearing them.

use std::sync::Arc;
use std::time::Duration;

use employment_map_pipeline::progress::{ProgressCallback, RunProgress};
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;

pub use indicatif::MultiProgress;

/// A step of a pipeline run, as shown on the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Postal code resolution (network-bound).
    Geocode,
    /// Spatial join against the partitions.
    Join,
    /// Per-partition aggregation and point weighting.
    Aggregate,
}

impl Phase {
    const fn label(self) -> &'static str {
        match self {
            Self::Geocode => "geocode",
            Self::Join => "join",
            Self::Aggregate => "aggregate",
        }
    }

    const fn color(self) -> &'static str {
        match self {
            Self::Geocode => "yellow",
            Self::Join => "cyan",
            Self::Aggregate => "green",
        }
    }

    fn waiting_style(self) -> ProgressStyle {
        ProgressStyle::with_template(&format!(
            "{{spinner:.{}}} [{:<9}] {{msg}}",
            self.color(),
            self.label()
        ))
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn counting_style(self) -> ProgressStyle {
        ProgressStyle::with_template(&format!(
            "  [{:<9}] {{msg}} {{wide_bar:.{}/dim}} {{pos}}/{{len}} [{{elapsed}}]",
            self.label(),
            self.color()
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
    }
}

/// Terminal bar for one [`Phase`]. Spins until the phase reports its
/// total, then counts.
pub struct PhaseBar {
    phase: Phase,
    bar: ProgressBar,
}

impl PhaseBar {
    /// Adds a waiting bar for `phase` to `multi`.
    #[must_use]
    pub fn new(multi: &MultiProgress, phase: Phase) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.set_style(phase.waiting_style());
        bar.set_message("waiting");
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { phase, bar }
    }
}

impl ProgressCallback for PhaseBar {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_style(self.phase.counting_style());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.set_style(self.phase.waiting_style());
        self.bar.finish_with_message(msg);
    }
}

/// One bar per phase of a full run, stacked in execution order.
#[must_use]
pub fn run_progress(multi: &MultiProgress) -> RunProgress {
    let bar = |phase| -> Arc<dyn ProgressCallback> { Arc::new(PhaseBar::new(multi, phase)) };
    RunProgress {
        geocode: bar(Phase::Geocode),
        join: bar(Phase::Join),
        aggregate: bar(Phase::Aggregate),
    }
}

/// Installs the `pretty_env_logger` formatter behind the progress bars.
///
/// Logs at `info` unless `RUST_LOG` says otherwise. Returns the
/// [`MultiProgress`] every bar must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(LevelFilter::Info);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    let logger = builder.build();
    let max_level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(max_level);
    }

    multi
}
