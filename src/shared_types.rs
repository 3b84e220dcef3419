use crate::tile::TileCoordinate;
use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
    sync::Arc,
};

/// One tile to render. Created by the producer and consumed by exactly one
/// worker.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderJob {
    pub region: Arc<str>,
    pub path: PathBuf,
    pub tile: TileCoordinate,
}

#[derive(Debug)]
pub enum Message {
    Render(RenderJob),
    Shutdown,
}

/// What a worker did with one job.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TileOutcome {
    /// Rendered and written.
    Rendered,
    /// Target file already present, nothing rendered.
    Exists,
    /// Rendered but had nothing to draw; not kept.
    Empty,
    /// Rendering or writing failed.
    Failed,
    /// Dropped unrendered because the run was aborting.
    Abandoned,
}

impl TileOutcome {
    pub const fn exists(self) -> bool {
        matches!(self, Self::Exists)
    }

    pub const fn empty(self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Counts of one or more `render_tiles` calls.
///
/// Every submitted job ends in exactly one of `rendered`, `existing`, `empty`,
/// `failed` or `abandoned`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub submitted: u64,
    pub rendered: u64,
    pub existing: u64,
    pub empty: u64,
    pub failed: u64,
    pub abandoned: u64,
    /// Skipped because an earlier call of the same run queued them.
    pub deduplicated: u64,
    /// Enumerated but never queued because the run stopped early.
    pub not_submitted: u64,
    pub cancelled: bool,
}

impl RenderSummary {
    pub fn record(&mut self, outcome: TileOutcome) {
        let counter = match outcome {
            TileOutcome::Rendered => &mut self.rendered,
            TileOutcome::Exists => &mut self.existing,
            TileOutcome::Empty => &mut self.empty,
            TileOutcome::Failed => &mut self.failed,
            TileOutcome::Abandoned => &mut self.abandoned,
        };

        *counter += 1;
    }

    pub fn processed(&self) -> u64 {
        self.rendered + self.existing + self.empty + self.failed + self.abandoned
    }

    pub fn is_complete(&self) -> bool {
        self.submitted == self.processed()
    }
}

impl std::ops::AddAssign for RenderSummary {
    fn add_assign(&mut self, other: Self) {
        self.submitted += other.submitted;
        self.rendered += other.rendered;
        self.existing += other.existing;
        self.empty += other.empty;
        self.failed += other.failed;
        self.abandoned += other.abandoned;
        self.deduplicated += other.deduplicated;
        self.not_submitted += other.not_submitted;
        self.cancelled |= other.cancelled;
    }
}

impl Display for RenderSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} submitted, {} rendered, {} existing, {} empty, {} failed",
            self.submitted, self.rendered, self.existing, self.empty, self.failed
        )?;

        if self.abandoned > 0 {
            write!(f, ", {} abandoned", self.abandoned)?;
        }

        if self.deduplicated > 0 {
            write!(f, ", {} deduplicated", self.deduplicated)?;
        }

        if self.not_submitted > 0 {
            write!(f, ", {} not submitted", self.not_submitted)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summaries_add_up() {
        let mut a = RenderSummary {
            submitted: 3,
            ..Default::default()
        };

        a.record(TileOutcome::Rendered);
        a.record(TileOutcome::Exists);
        a.record(TileOutcome::Empty);

        assert!(a.is_complete());

        let mut b = RenderSummary {
            submitted: 1,
            not_submitted: 4,
            cancelled: true,
            ..Default::default()
        };

        b.record(TileOutcome::Failed);

        a += b;

        assert_eq!(a.submitted, 4);
        assert_eq!(a.processed(), 4);
        assert_eq!(a.not_submitted, 4);
        assert!(a.cancelled);
        assert_eq!(
            a.to_string(),
            "4 submitted, 1 rendered, 1 existing, 1 empty, 1 failed, 4 not submitted"
        );
    }
}
