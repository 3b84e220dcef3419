use crate::shared_types::{RenderSummary, TileOutcome};
use std::{
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};
use tracing::info;

const LOG_INTERVAL: Duration = Duration::from_millis(1000);

/// Job counters shared by the producer and all workers of one call.
#[derive(Debug)]
pub struct Progress {
    region: String,
    queued: AtomicU64,
    rendered: AtomicU64,
    existing: AtomicU64,
    empty: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
    last_log: Mutex<Instant>,
}

impl Progress {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            queued: AtomicU64::new(0),
            rendered: AtomicU64::new(0),
            existing: AtomicU64::new(0),
            empty: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
            last_log: Mutex::new(Instant::now()),
        }
    }

    pub fn queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn done(&self, outcome: TileOutcome) {
        let counter = match outcome {
            TileOutcome::Rendered => &self.rendered,
            TileOutcome::Exists => &self.existing,
            TileOutcome::Empty => &self.empty,
            TileOutcome::Failed => &self.failed,
            TileOutcome::Abandoned => &self.abandoned,
        };

        counter.fetch_add(1, Ordering::Relaxed);

        // another thread holding the lock is about to print anyway
        let Ok(mut last_log) = self.last_log.try_lock() else {
            return;
        };

        if last_log.elapsed() > LOG_INTERVAL {
            *last_log = Instant::now();

            self.print_stats();
        }
    }

    pub fn summary(&self) -> RenderSummary {
        RenderSummary {
            submitted: self.queued.load(Ordering::Relaxed),
            rendered: self.rendered.load(Ordering::Relaxed),
            existing: self.existing.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            ..RenderSummary::default()
        }
    }

    pub fn print_stats(&self) {
        let summary = self.summary();

        info!(
            region = %self.region,
            queued = summary.submitted,
            finished = summary.processed(),
            rendered = summary.rendered,
            failed = summary.failed,
            "progress"
        );
    }
}
