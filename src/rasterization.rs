use crate::{
    empty::{EmptyTile, RenderedTile},
    encode::encode_png256,
    engine::{EngineError, ProjectedBox, RenderContext},
    projection::{PixelPoint, ProjectionError, TILE_SIZE, TileProjection},
    shared_types::{RenderJob, TileOutcome},
    tile::{MAX_ZOOM, TileCoordinate},
};
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::Builder;
use thiserror::Error;

/// Render buffer in pixels every tile gets at least.
pub const MIN_BUFFER_SIZE: u32 = 128;

#[derive(Debug, Error)]
pub enum RasterizeError {
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to encode tile: {0}")]
    Encode(#[from] png::EncodingError),
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Owns one worker's render context and turns jobs into tile files.
pub struct TileRasterizer<C> {
    context: C,
    projection: TileProjection,
    empty: Arc<dyn EmptyTile>,
}

impl<C: RenderContext> TileRasterizer<C> {
    pub fn new(context: C, empty: Arc<dyn EmptyTile>) -> Self {
        Self {
            context,
            projection: TileProjection::new(MAX_ZOOM + 1),
            empty,
        }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    /// Tile footprint in the context's projected units.
    pub fn extent(&self, tile: TileCoordinate) -> Result<ProjectedBox, RasterizeError> {
        let size = TILE_SIZE as f64;

        let (x, y) = (tile.x as f64, tile.y as f64);

        // pixel y grows southwards so the bottom left corner has the larger y
        let bottom_left = PixelPoint::new(x * size, (y + 1.0) * size);
        let top_right = PixelPoint::new((x + 1.0) * size, y * size);

        let bottom_left = self.projection.to_geo(bottom_left, tile.zoom)?;
        let top_right = self.projection.to_geo(top_right, tile.zoom)?;

        Ok(ProjectedBox::from_corners(
            self.context.forward(bottom_left)?,
            self.context.forward(top_right)?,
        ))
    }

    /// Renders the job's tile unless its file already exists.
    ///
    /// Empty tiles are detected before anything is written, so they never
    /// appear in the output tree.
    pub fn render_tile(&mut self, job: &RenderJob) -> Result<TileOutcome, RasterizeError> {
        if job.path.exists() {
            return Ok(TileOutcome::Exists);
        }

        let extent = self.extent(job.tile)?;

        self.context.resize(TILE_SIZE, TILE_SIZE);

        self.context.zoom_to_box(extent);

        if self.context.buffer_size() < MIN_BUFFER_SIZE {
            self.context.set_buffer_size(MIN_BUFFER_SIZE);
        }

        let image = self.context.render()?;

        let encoded = encode_png256(&image)?;

        let rendered = RenderedTile {
            image: &image,
            encoded: &encoded,
        };

        if self.empty.is_empty(&rendered) {
            return Ok(TileOutcome::Empty);
        }

        write_atomic(&job.path, &encoded).map_err(|source| RasterizeError::Write {
            path: job.path.clone(),
            source,
        })?;

        Ok(TileOutcome::Rendered)
    }
}

/// Writes into a temporary file beside `path` and renames it into place.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));

    let mut file = Builder::new().prefix(".").suffix(".tmp").tempfile_in(dir)?;

    file.write_all(data)?;

    file.persist(path).map_err(|err| err.error)?;

    Ok(())
}
