//! Progress hooks invoked by the orchestrator around each per-instance search.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::Verdict;

/// Observer called from worker threads; implementations must be `Sync`.
pub trait AttackObserver: Sync {
    /// A search for dataset row `index` is about to start.
    fn instance_started(&self, _index: usize) {}

    /// The search for dataset row `index` finished with `verdict`.
    fn instance_finished(&self, _index: usize, _verdict: Verdict) {}
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl AttackObserver for SilentObserver {}

/// Counts started, finished and broken instances.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    started: AtomicUsize,
    finished: AtomicUsize,
    attacked: AtomicUsize,
}

impl ProgressCounter {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::Relaxed)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::Relaxed)
    }

    pub fn attacked(&self) -> usize {
        self.attacked.load(Ordering::Relaxed)
    }
}

impl AttackObserver for ProgressCounter {
    fn instance_started(&self, _index: usize) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    fn instance_finished(&self, _index: usize, verdict: Verdict) {
        self.finished.fetch_add(1, Ordering::Relaxed);
        if verdict == Verdict::AttackFound {
            self.attacked.fetch_add(1, Ordering::Relaxed);
        }
    }
}
