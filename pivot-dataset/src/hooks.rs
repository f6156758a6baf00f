//! FILENAME: pivot-dataset/src/hooks.rs
//! Build phase instrumentation.
//!
//! Every build or update runs up to five phases in a fixed order. Each phase
//! is timed and logged under the `PIVOT` target; an optional observer is
//! notified when a phase starts and ends.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One phase of a dataset build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildPhase {
    /// Filtering, cube ingestion and value collection.
    Collect,
    Total,
    Sort,
    TreeBuild,
    /// Zero alignment of paired chart measures.
    Align,
}

impl BuildPhase {
    pub fn name(&self) -> &'static str {
        match self {
            BuildPhase::Collect => "collect",
            BuildPhase::Total => "total",
            BuildPhase::Sort => "sort",
            BuildPhase::TreeBuild => "tree_build",
            BuildPhase::Align => "align",
        }
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Receives phase notifications. Both methods default to doing nothing.
pub trait PhaseObserver: Send + Sync {
    fn phase_started(&self, _phase: BuildPhase) {}

    fn phase_finished(&self, _phase: BuildPhase, _elapsed: Duration) {}
}

/// Shared handle to an observer, carried by `DatasetOptions`.
#[derive(Clone)]
pub struct PhaseHooks(pub Arc<dyn PhaseObserver>);

impl PhaseHooks {
    pub fn new(observer: impl PhaseObserver + 'static) -> Self {
        PhaseHooks(Arc::new(observer))
    }
}

impl fmt::Debug for PhaseHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PhaseHooks(..)")
    }
}

/// Runs `work` as `phase`, timing it and notifying `hooks`.
pub fn run_phase<T>(hooks: Option<&PhaseHooks>, phase: BuildPhase, work: impl FnOnce() -> T) -> T {
    if let Some(hooks) = hooks {
        hooks.0.phase_started(phase);
    }
    let started = Instant::now();
    let result = work();
    let elapsed = started.elapsed();
    log::debug!(
        target: "PIVOT",
        "phase {} took {:.1}ms",
        phase,
        elapsed.as_secs_f64() * 1000.0
    );
    if let Some(hooks) = hooks {
        hooks.0.phase_finished(phase, elapsed);
    }
    result
}
