//! Fixed set of render threads fed from one [`WorkQueue`].

use crate::{
    completion::CompletionLog,
    empty::EmptyTile,
    engine::RenderEngine,
    pipeline::PipelineError,
    progress::Progress,
    queue::{WorkQueue, WorkReceiver},
    rasterization::TileRasterizer,
    shared_types::{Message, RenderJob, RenderSummary, TileOutcome},
};
use std::{
    fmt::Display,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};
use tracing::{debug, error};

/// Lifecycle of a [`WorkerPool`]; it only ever moves forward.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PoolState {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// What a worker does after a tile fails.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Log, count as failed and go on with the next job.
    #[default]
    LogAndContinue,
    /// Stop the run: remaining queued jobs are abandoned without rendering.
    FailFast,
}

#[derive(Clone, Debug)]
pub struct TileFailure {
    pub job: RenderJob,
    pub message: String,
}

pub struct PoolSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub policy: ErrorPolicy,
    pub empty: Arc<dyn EmptyTile>,
    pub log: Arc<dyn CompletionLog>,
}

/// Result of a drained pool.
#[derive(Debug)]
pub struct PoolReport {
    pub summary: RenderSummary,
    /// First failure seen under [`ErrorPolicy::FailFast`].
    pub failure: Option<TileFailure>,
}

struct Shared {
    empty: Arc<dyn EmptyTile>,
    log: Arc<dyn CompletionLog>,
    progress: Progress,
    policy: ErrorPolicy,
    aborted: AtomicBool,
    first_failure: Mutex<Option<TileFailure>>,
}

impl Shared {
    fn fail(&self, job: &RenderJob, err: &dyn Display) -> TileOutcome {
        error!(
            region = %job.region,
            tile = %job.tile,
            path = %job.path.display(),
            "failed to render tile: {err}"
        );

        if self.policy == ErrorPolicy::FailFast {
            self.aborted.store(true, Ordering::SeqCst);

            self.first_failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_or_insert_with(|| TileFailure {
                    job: job.clone(),
                    message: err.to_string(),
                });
        }

        TileOutcome::Failed
    }
}

pub struct WorkerPool<E> {
    engine: Arc<E>,
    workers: usize,
    queue_capacity: usize,
    state: PoolState,
    queue: Option<WorkQueue>,
    handles: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl<E: RenderEngine + 'static> WorkerPool<E> {
    pub fn new(engine: Arc<E>, region: &str, settings: PoolSettings) -> Self {
        Self {
            engine,
            workers: settings.workers.max(1),
            queue_capacity: settings.queue_capacity,
            state: PoolState::Idle,
            queue: None,
            handles: Vec::new(),
            shared: Arc::new(Shared {
                empty: settings.empty,
                log: settings.log,
                progress: Progress::new(region),
                policy: settings.policy,
                aborted: AtomicBool::new(false),
                first_failure: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    /// Set once a tile failed under [`ErrorPolicy::FailFast`].
    pub fn is_aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::SeqCst)
    }

    fn transition(&mut self, from: PoolState, to: PoolState) -> Result<(), PipelineError> {
        if self.state != from {
            return Err(PipelineError::PoolState {
                expected: from,
                actual: self.state,
            });
        }

        debug!(?from, ?to, "worker pool state");

        self.state = to;

        Ok(())
    }

    /// Spawns the workers. Each creates its own render context on its thread.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        self.transition(PoolState::Idle, PoolState::Running)?;

        let (queue, receiver) = WorkQueue::new(self.queue_capacity);

        self.queue = Some(queue);

        for index in 0..self.workers {
            let engine = Arc::clone(&self.engine);

            let shared = Arc::clone(&self.shared);

            let receiver = receiver.clone();

            let spawned = thread::Builder::new()
                .name(format!("render-{index}"))
                .spawn(move || work(index, engine.as_ref(), &receiver, &shared));

            match spawned {
                Ok(handle) => self.handles.push(handle),
                Err(err) => {
                    self.shutdown()?;

                    return Err(PipelineError::Spawn(err));
                }
            }
        }

        Ok(())
    }

    /// Queues a job, blocking while the queue is full.
    pub fn submit(&self, job: RenderJob) -> Result<(), PipelineError> {
        let queue = match (&self.queue, self.state) {
            (Some(queue), PoolState::Running) => queue,
            _ => {
                return Err(PipelineError::PoolState {
                    expected: PoolState::Running,
                    actual: self.state,
                });
            }
        };

        queue.push(job)?;

        self.shared.progress.queued();

        Ok(())
    }

    /// Sends one shutdown signal per worker, waits for all of them and
    /// returns the counts.
    pub fn shutdown(&mut self) -> Result<PoolReport, PipelineError> {
        self.transition(PoolState::Running, PoolState::Draining)?;

        if let Some(queue) = self.queue.take() {
            // only fails when every worker is already gone
            if queue.shutdown(self.handles.len()).is_err() {
                debug!("workers exited before shutdown");
            }
        }

        let panicked = self
            .handles
            .drain(..)
            .map(JoinHandle::join)
            .filter(Result::is_err)
            .count();

        self.transition(PoolState::Draining, PoolState::Stopped)?;

        self.shared.progress.print_stats();

        if panicked > 0 {
            return Err(PipelineError::WorkerPanicked(panicked));
        }

        let failure = self
            .shared
            .first_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        Ok(PoolReport {
            summary: self.shared.progress.summary(),
            failure,
        })
    }
}

impl<E> Drop for WorkerPool<E> {
    fn drop(&mut self) {
        // closing the queue makes every worker read a shutdown
        self.queue.take();

        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn work<E: RenderEngine>(index: usize, engine: &E, receiver: &WorkReceiver, shared: &Shared) {
    let mut rasterizer = match engine.create_context() {
        Ok(context) => Ok(TileRasterizer::new(context, Arc::clone(&shared.empty))),
        Err(err) => {
            error!(worker = index, "failed to create render context: {err}");

            Err(err.to_string())
        }
    };

    debug!(worker = index, "worker started");

    while let Message::Render(job) = receiver.pop() {
        let outcome = if shared.aborted.load(Ordering::SeqCst) {
            TileOutcome::Abandoned
        } else {
            match rasterizer.as_mut() {
                Ok(rasterizer) => rasterizer
                    .render_tile(&job)
                    .unwrap_or_else(|err| shared.fail(&job, &err)),
                Err(message) => shared.fail(&job, &*message),
            }
        };

        shared.progress.done(outcome);

        shared.log.completed(&job, outcome);
    }

    debug!(worker = index, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        completion::TracingLog,
        empty::UniformColor,
        engine::{EngineError, ProjectedBox, RenderContext},
        projection::GeoPoint,
        tile::TileCoordinate,
    };
    use image::{Rgba, RgbaImage};
    use std::{fs, path::Path};

    /// Engine whose contexts fail either at creation or on every render.
    struct Broken {
        at_creation: bool,
    }

    struct BrokenContext;

    impl RenderContext for BrokenContext {
        fn forward(&self, point: GeoPoint) -> Result<(f64, f64), EngineError> {
            Ok((point.lon, point.lat))
        }

        fn resize(&mut self, _width: u32, _height: u32) {}

        fn zoom_to_box(&mut self, _extent: ProjectedBox) {}

        fn buffer_size(&self) -> u32 {
            0
        }

        fn set_buffer_size(&mut self, _buffer_size: u32) {}

        fn render(&mut self) -> Result<RgbaImage, EngineError> {
            Err(EngineError::Other("boom".into()))
        }
    }

    impl RenderEngine for Broken {
        type Context = BrokenContext;

        fn create_context(&self) -> Result<BrokenContext, EngineError> {
            if self.at_creation {
                Err(EngineError::Other("no context".into()))
            } else {
                Ok(BrokenContext)
            }
        }
    }

    fn settings(workers: usize, policy: ErrorPolicy) -> PoolSettings {
        PoolSettings {
            workers,
            queue_capacity: 4,
            policy,
            empty: Arc::new(UniformColor),
            log: Arc::new(TracingLog),
        }
    }

    fn jobs(root: &Path, count: u32) -> Vec<RenderJob> {
        (0..count)
            .map(|x| {
                let tile = TileCoordinate::new(8, x, 0);

                fs::create_dir_all(tile.dir(root)).unwrap();

                RenderJob {
                    region: Arc::from("test"),
                    path: tile.path(root, false),
                    tile,
                }
            })
            .collect()
    }

    #[test]
    fn state_machine_only_moves_forward() {
        let mut pool = WorkerPool::new(
            Arc::new(Broken { at_creation: false }),
            "test",
            settings(2, ErrorPolicy::LogAndContinue),
        );

        assert_eq!(pool.state(), PoolState::Idle);

        let dir = tempfile::tempdir().unwrap();

        let job = jobs(dir.path(), 1).remove(0);

        assert!(matches!(
            pool.submit(job.clone()),
            Err(PipelineError::PoolState {
                expected: PoolState::Running,
                actual: PoolState::Idle
            })
        ));

        assert!(pool.shutdown().is_err());

        pool.start().unwrap();

        assert_eq!(pool.state(), PoolState::Running);

        assert!(pool.start().is_err());

        pool.submit(job.clone()).unwrap();

        let report = pool.shutdown().unwrap();

        assert_eq!(pool.state(), PoolState::Stopped);
        assert_eq!(report.summary.submitted, 1);
        assert_eq!(report.summary.failed, 1);
        assert!(report.failure.is_none());

        assert!(pool.submit(job).is_err());
        assert!(pool.shutdown().is_err());
    }

    #[test]
    fn context_failure_still_drains_queue() {
        let dir = tempfile::tempdir().unwrap();

        let mut pool = WorkerPool::new(
            Arc::new(Broken { at_creation: true }),
            "test",
            settings(3, ErrorPolicy::LogAndContinue),
        );

        pool.start().unwrap();

        for job in jobs(dir.path(), 20) {
            pool.submit(job).unwrap();
        }

        let report = pool.shutdown().unwrap();

        assert_eq!(report.summary.submitted, 20);
        assert_eq!(report.summary.failed, 20);
        assert!(report.summary.is_complete());
    }

    #[test]
    fn fail_fast_abandons_remaining_jobs() {
        let dir = tempfile::tempdir().unwrap();

        let mut pool = WorkerPool::new(
            Arc::new(Broken { at_creation: false }),
            "test",
            settings(1, ErrorPolicy::FailFast),
        );

        pool.start().unwrap();

        for job in jobs(dir.path(), 10) {
            if pool.is_aborted() {
                break;
            }

            pool.submit(job).unwrap();
        }

        let report = pool.shutdown().unwrap();

        let summary = report.summary;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failed + summary.abandoned, summary.submitted);

        let failure = report.failure.unwrap();

        assert_eq!(failure.job.tile, TileCoordinate::new(8, 0, 0));
        assert!(failure.message.contains("boom"));
    }

    #[test]
    fn dropping_a_running_pool_joins_workers() {
        struct Blank;

        struct BlankContext;

        impl RenderContext for BlankContext {
            fn forward(&self, point: GeoPoint) -> Result<(f64, f64), EngineError> {
                Ok((point.lon, point.lat))
            }

            fn resize(&mut self, _width: u32, _height: u32) {}

            fn zoom_to_box(&mut self, _extent: ProjectedBox) {}

            fn buffer_size(&self) -> u32 {
                0
            }

            fn set_buffer_size(&mut self, _buffer_size: u32) {}

            fn render(&mut self) -> Result<RgbaImage, EngineError> {
                Ok(RgbaImage::from_pixel(256, 256, Rgba([0, 0, 0, 0])))
            }
        }

        impl RenderEngine for Blank {
            type Context = BlankContext;

            fn create_context(&self) -> Result<BlankContext, EngineError> {
                Ok(BlankContext)
            }
        }

        let dir = tempfile::tempdir().unwrap();

        let mut pool = WorkerPool::new(
            Arc::new(Blank),
            "test",
            settings(2, ErrorPolicy::LogAndContinue),
        );

        pool.start().unwrap();

        for job in jobs(dir.path(), 5) {
            pool.submit(job).unwrap();
        }

        drop(pool);
    }
}
