//! Renders Web Mercator map tiles for geographic boxes into a
//! `<region>/<z>/<x>/<y>.png` tree using a pool of render threads.

pub mod cancel;
pub mod completion;
pub mod empty;
pub mod encode;
pub mod engine;
pub mod logging;
pub mod options;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod projection;
pub mod queue;
pub mod rasterization;
pub mod region;
pub mod shared_types;
pub mod style;
pub mod tile;
pub mod vector;

pub use cancel::CancellationToken;
pub use completion::{CompletionLog, TracingLog};
pub use empty::{EmptyTile, EncodedSize, RenderedTile, UniformColor};
pub use engine::{EngineError, ProjectedBox, RenderContext, RenderEngine};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, RenderRequest};
pub use pool::{ErrorPolicy, PoolState, WorkerPool};
pub use projection::{GeoPoint, PixelPoint, ProjectionError, TileProjection};
pub use region::{RegionError, RegionManifest, RegionRun, discover_manifests, run_region};
pub use shared_types::{RenderJob, RenderSummary, TileOutcome};
pub use style::Style;
pub use tile::{BoundingBox, TileCoordinate, TileSet, ZoomRange};
pub use vector::VectorEngine;
