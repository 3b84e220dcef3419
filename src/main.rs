use clap::Parser;
use std::{process::ExitCode, sync::Arc};
use thiserror::Error;
use tilegen::{
    CancellationToken, EncodedSize, ErrorPolicy, Pipeline, PipelineConfig, RegionManifest,
    RegionRun, RenderRequest, RenderSummary, Style, TracingLog, UniformColor, VectorEngine,
    ZoomRange, discover_manifests, empty::EmptyTile, logging::init_logging, options::Options,
    run_region,
};
use tracing::{error, info, warn};

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Style(#[from] tilegen::style::StyleError),
    #[error("failed to set up renderer: {0}")]
    Engine(#[from] tilegen::EngineError),
    #[error(transparent)]
    Zoom(#[from] tilegen::tile::ZoomRangeError),
    #[error(transparent)]
    Region(#[from] tilegen::RegionError),
    #[error(transparent)]
    Pipeline(#[from] tilegen::PipelineError),
    #[error("failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

fn run(options: &Options) -> Result<RenderSummary, AppError> {
    let style = Style::load(&options.style)?;

    let engine = Arc::new(VectorEngine::new(&style)?);

    info!(
        style = %options.style.display(),
        srs = %style.srs,
        features = engine.feature_count(),
        "style loaded"
    );

    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();

        ctrlc::set_handler(move || {
            warn!("interrupted, finishing queued tiles");

            cancel.cancel();
        })?;
    }

    let empty_tile: Arc<dyn EmptyTile> = match options.empty_tile_bytes {
        Some(bytes) => Arc::new(EncodedSize(bytes)),
        None => Arc::new(UniformColor),
    };

    let pipeline = Pipeline::new(
        engine,
        PipelineConfig {
            queue_capacity: options.queue_capacity,
            error_policy: if options.strict {
                ErrorPolicy::FailFast
            } else {
                ErrorPolicy::LogAndContinue
            },
            empty_tile,
            log: Arc::new(TracingLog),
            cancel,
        },
    );

    if let (Some(bbox), Some(region)) = (options.bbox, &options.region) {
        let request = RenderRequest {
            bbox,
            output_root: options.output.clone(),
            zoom: options.zoom_range(ZoomRange::default())?,
            region: region.clone(),
            concurrency: options.threads,
            tms: options.tms,
        };

        return Ok(pipeline.render_tiles(&request, None)?);
    }

    let run = RegionRun {
        output_root: options.output.clone(),
        concurrency: options.threads,
        tms: options.tms,
        dedup: options.dedup,
        zooms: options.zoom_override()?,
    };

    let manifests = discover_manifests(&options.regions)?;

    info!(manifests = manifests.len(), "regions found");

    let mut total = RenderSummary::default();

    for path in manifests {
        let manifest = RegionManifest::load(&path)?;

        total += run_region(&pipeline, &manifest, &run)?;

        if total.cancelled {
            break;
        }
    }

    Ok(total)
}

fn main() -> ExitCode {
    let options = Options::parse();

    if let Err(err) = init_logging() {
        eprintln!("failed to initialise logging: {err}");
    }

    match run(&options) {
        Ok(summary) if summary.cancelled => {
            warn!(%summary, "cancelled");

            ExitCode::from(130)
        }
        Ok(summary) if summary.failed > 0 => {
            error!(%summary, "finished with failed tiles");

            ExitCode::FAILURE
        }
        Ok(summary) => {
            info!(%summary, "finished");

            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");

            ExitCode::FAILURE
        }
    }
}
