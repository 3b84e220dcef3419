//! Turns a bounding box and a zoom range into a populated tile tree.

use crate::{
    cancel::CancellationToken,
    completion::{CompletionLog, TracingLog},
    empty::{EmptyTile, UniformColor},
    engine::RenderEngine,
    pool::{ErrorPolicy, PoolSettings, PoolState, WorkerPool},
    projection::{ProjectionError, TileProjection},
    queue::{DEFAULT_CAPACITY, Disconnected},
    shared_types::{RenderJob, RenderSummary},
    tile::{BoundingBox, TileCoordinate, TileSet, ZoomRange, covered_tile_count, covered_tiles_at},
};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_CONCURRENCY: usize = 6;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("bounding box {0} has non-finite coordinates")]
    InvalidBox(BoundingBox),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error("failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to spawn worker: {0}")]
    Spawn(io::Error),
    #[error(transparent)]
    Queue(#[from] Disconnected),
    #[error("worker pool is {actual:?}, expected {expected:?}")]
    PoolState {
        expected: PoolState,
        actual: PoolState,
    },
    #[error("{0} worker(s) panicked")]
    WorkerPanicked(usize),
    #[error("tile {region}/{tile} failed: {message}")]
    TileFailed {
        region: String,
        tile: TileCoordinate,
        message: String,
    },
}

/// Settings shared by every `render_tiles` call of one run.
#[derive(Clone)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub error_policy: ErrorPolicy,
    pub empty_tile: Arc<dyn EmptyTile>,
    pub log: Arc<dyn CompletionLog>,
    pub cancel: CancellationToken,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_CAPACITY,
            error_policy: ErrorPolicy::default(),
            empty_tile: Arc::new(UniformColor),
            log: Arc::new(TracingLog),
            cancel: CancellationToken::new(),
        }
    }
}

/// One `render_tiles` call.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderRequest {
    pub bbox: BoundingBox,
    /// Tiles go to `<output_root>/<region>/<z>/<x>/<y>.png`.
    pub output_root: PathBuf,
    pub zoom: ZoomRange,
    pub region: String,
    pub concurrency: usize,
    /// Name files by TMS row instead of the slippy map row.
    pub tms: bool,
}

impl RenderRequest {
    pub fn new(bbox: BoundingBox, output_root: impl Into<PathBuf>, region: &str) -> Self {
        Self {
            bbox,
            output_root: output_root.into(),
            zoom: ZoomRange::default(),
            region: region.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            tms: false,
        }
    }

    pub fn region_root(&self) -> PathBuf {
        self.output_root.join(&self.region)
    }
}

pub struct Pipeline<E> {
    engine: Arc<E>,
    config: PipelineConfig,
}

#[derive(Default)]
struct Production {
    submitted: u64,
    deduplicated: u64,
    cancelled: bool,
}

impl<E: RenderEngine + 'static> Pipeline<E> {
    pub fn new(engine: Arc<E>, config: PipelineConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Renders every tile touching `request.bbox` over `request.zoom` and
    /// returns once all workers have exited.
    ///
    /// Tiles already in `seen` are skipped and every queued tile is added to
    /// it.
    pub fn render_tiles(
        &self,
        request: &RenderRequest,
        seen: Option<&mut TileSet>,
    ) -> Result<RenderSummary, PipelineError> {
        if !request.bbox.is_finite() {
            return Err(PipelineError::InvalidBox(request.bbox));
        }

        let projection = TileProjection::new(request.zoom.max() + 1);

        let total = covered_tile_count(&projection, &request.bbox, request.zoom)?;

        info!(
            region = %request.region,
            bbox = %request.bbox,
            zoom = %request.zoom,
            tiles = total,
            "rendering"
        );

        let mut pool = WorkerPool::new(
            Arc::clone(&self.engine),
            &request.region,
            PoolSettings {
                workers: request.concurrency,
                queue_capacity: self.config.queue_capacity,
                policy: self.config.error_policy,
                empty: Arc::clone(&self.config.empty_tile),
                log: Arc::clone(&self.config.log),
            },
        );

        pool.start()?;

        let produced = self.produce(&pool, &projection, request, seen);

        // workers are joined on every path, including a failed producer
        let report = pool.shutdown()?;

        let production = produced?;

        if let Some(failure) = report.failure {
            return Err(PipelineError::TileFailed {
                region: failure.job.region.to_string(),
                tile: failure.job.tile,
                message: failure.message,
            });
        }

        let summary = RenderSummary {
            deduplicated: production.deduplicated,
            not_submitted: total - production.submitted - production.deduplicated,
            cancelled: production.cancelled,
            ..report.summary
        };

        if summary.cancelled {
            warn!(region = %request.region, %summary, "cancelled");
        } else {
            info!(region = %request.region, %summary, "done");
        }

        Ok(summary)
    }

    fn produce(
        &self,
        pool: &WorkerPool<E>,
        projection: &TileProjection,
        request: &RenderRequest,
        mut seen: Option<&mut TileSet>,
    ) -> Result<Production, PipelineError> {
        let root = request.region_root();

        let region: Arc<str> = Arc::from(request.region.as_str());

        let mut production = Production::default();

        let mut last_dir = None;

        for zoom in request.zoom.levels() {
            for tile in covered_tiles_at(projection, &request.bbox, zoom)? {
                if self.config.cancel.is_cancelled() {
                    production.cancelled = true;

                    return Ok(production);
                }

                if pool.is_aborted() {
                    return Ok(production);
                }

                if let Some(seen) = seen.as_deref_mut() {
                    if !seen.insert(tile) {
                        production.deduplicated += 1;

                        continue;
                    }
                }

                let dir = tile.dir(&root);

                if last_dir.as_ref() != Some(&dir) {
                    create_dir(&dir)?;

                    last_dir = Some(dir);
                }

                pool.submit(RenderJob {
                    region: Arc::clone(&region),
                    path: tile.path(&root, request.tms),
                    tile,
                })?;

                production.submitted += 1;
            }
        }

        Ok(production)
    }
}

fn create_dir(dir: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(dir).map_err(|source| PipelineError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}
