//! Per-tile completion records.

use crate::shared_types::{RenderJob, TileOutcome};
use tracing::{info, warn};

/// Receives exactly one call per job a worker takes off the queue.
pub trait CompletionLog: Send + Sync {
    fn completed(&self, job: &RenderJob, outcome: TileOutcome);
}

/// Emits one `tilegen::tile` event per job.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLog;

impl CompletionLog for TracingLog {
    fn completed(&self, job: &RenderJob, outcome: TileOutcome) {
        let tile = job.tile;

        match outcome {
            TileOutcome::Rendered | TileOutcome::Exists | TileOutcome::Empty => info!(
                target: "tilegen::tile",
                region = %job.region,
                zoom = tile.zoom,
                x = tile.x,
                y = tile.y,
                exists = outcome.exists(),
                empty = outcome.empty(),
                ?outcome,
                "tile"
            ),
            TileOutcome::Failed | TileOutcome::Abandoned => warn!(
                target: "tilegen::tile",
                region = %job.region,
                zoom = tile.zoom,
                x = tile.x,
                y = tile.y,
                exists = outcome.exists(),
                empty = outcome.empty(),
                ?outcome,
                "tile"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileCoordinate;
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(outcomes: &[TileOutcome]) -> Vec<String> {
        let buffer = Buffer::default();

        let writer = buffer.clone();

        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .finish();

        let job = RenderJob {
            region: "mc-monaco".into(),
            path: "out/mc-monaco/13/4264/2989.png".into(),
            tile: TileCoordinate::new(13, 4264, 2989),
        };

        tracing::subscriber::with_default(subscriber, || {
            for &outcome in outcomes {
                TracingLog.completed(&job, outcome);
            }
        });

        let bytes = buffer.0.lock().unwrap().clone();

        String::from_utf8(bytes).unwrap().lines().map(str::to_owned).collect()
    }

    #[test]
    fn every_outcome_has_the_same_fields() {
        let lines = capture(&[
            TileOutcome::Rendered,
            TileOutcome::Exists,
            TileOutcome::Empty,
            TileOutcome::Failed,
            TileOutcome::Abandoned,
        ]);

        assert_eq!(lines.len(), 5);

        for line in &lines {
            for field in [
                "region=mc-monaco",
                "zoom=13",
                "x=4264",
                "y=2989",
                "exists=",
                "empty=",
                "outcome=",
            ] {
                assert!(line.contains(field), "{field} missing from {line}");
            }
        }

        assert!(lines[1].contains("exists=true empty=false outcome=Exists"));
        assert!(lines[2].contains("exists=false empty=true outcome=Empty"));
        assert!(lines[3].contains("exists=false empty=false outcome=Failed"));
        assert!(lines[0].contains("INFO"));
        assert!(lines[4].contains("WARN"));
    }
}
