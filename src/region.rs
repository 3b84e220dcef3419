//! Region manifests: the list of boxes and zoom ranges rendered for one
//! named region.
//!
//! ```json
//! {
//!   "zone": "world",
//!   "region": "kw-kuwait",
//!   "name": "Kuwait",
//!   "zooms": [[0, 11], [13, 13], [15, 15], [17, 17]],
//!   "boxes": [[46.54161, 29.10416, 47.73137, 29.11249]]
//! }
//! ```

use crate::{
    engine::RenderEngine,
    pipeline::{Pipeline, PipelineError, RenderRequest},
    shared_types::RenderSummary,
    tile::{BoundingBox, TileSet, ZoomRange},
};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("failed to read manifest {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to scan for manifests: {0}")]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionManifest {
    #[serde(default)]
    pub zone: String,
    /// Directory name under the output root.
    pub region: String,
    /// Human readable name.
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_zooms")]
    pub zooms: Vec<ZoomRange>,
    /// Used as given, corners may be swapped.
    pub boxes: Vec<BoundingBox>,
}

fn default_zooms() -> Vec<ZoomRange> {
    vec![ZoomRange::REGION_BASE]
}

impl RegionManifest {
    pub fn load(path: &Path) -> Result<Self, RegionError> {
        let json = fs::read_to_string(path).map_err(|source| RegionError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&json).map_err(|source| RegionError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Expands directories into the `*.json` files below them. Files given
/// directly are kept whatever their extension. The result is sorted and free
/// of duplicates.
pub fn discover_manifests(paths: &[PathBuf]) -> Result<Vec<PathBuf>, RegionError> {
    let mut manifests = Vec::new();

    for path in paths {
        if !path.is_dir() {
            manifests.push(path.clone());

            continue;
        }

        for entry in WalkDir::new(path).follow_links(true) {
            let entry = entry?;

            if entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "json")
            {
                manifests.push(entry.into_path());
            }
        }
    }

    manifests.sort();

    manifests.dedup();

    Ok(manifests)
}

/// Run wide settings applied to every region.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionRun {
    pub output_root: PathBuf,
    pub concurrency: usize,
    pub tms: bool,
    /// Skip tiles an earlier box of the same region already queued.
    pub dedup: bool,
    /// Replaces the manifest's zoom ranges.
    pub zooms: Option<Vec<ZoomRange>>,
}

/// Calls `render_tiles` for every box and zoom range of the manifest, boxes
/// in file order, and adds up the summaries. Stops after a cancelled call.
pub fn run_region<E: RenderEngine + 'static>(
    pipeline: &Pipeline<E>,
    manifest: &RegionManifest,
    run: &RegionRun,
) -> Result<RenderSummary, RegionError> {
    let zooms = run.zooms.as_ref().unwrap_or(&manifest.zooms);

    info!(
        region = %manifest.region,
        name = %manifest.name,
        boxes = manifest.boxes.len(),
        zoom_ranges = zooms.len(),
        "region"
    );

    let mut seen = run.dedup.then(TileSet::new);

    let mut summary = RenderSummary::default();

    for bbox in &manifest.boxes {
        for zoom in zooms {
            let request = RenderRequest {
                bbox: *bbox,
                output_root: run.output_root.clone(),
                zoom: *zoom,
                region: manifest.region.clone(),
                concurrency: run.concurrency,
                tms: run.tms,
            };

            summary += pipeline.render_tiles(&request, seen.as_mut())?;

            if summary.cancelled {
                return Ok(summary);
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_defaults() {
        let manifest: RegionManifest = serde_json::from_str(
            r#"{ "region": "mc-monaco", "boxes": [[7.39119, 43.72803, 7.3919, 43.7289]] }"#,
        )
        .unwrap();

        assert_eq!(manifest.zooms, vec![ZoomRange::new(0, 11).unwrap()]);
        assert_eq!(
            manifest.boxes,
            vec![BoundingBox::new(7.39119, 43.72803, 7.3919, 43.7289)]
        );
        assert!(manifest.name.is_empty());
    }

    #[test]
    fn manifest_rejects_bad_zoom() {
        let result = serde_json::from_str::<RegionManifest>(
            r#"{ "region": "x", "zooms": [[11, 0]], "boxes": [] }"#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn load_reports_path() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("broken.json");

        fs::write(&path, "{").unwrap();

        match RegionManifest::load(&path) {
            Err(RegionError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            RegionManifest::load(&dir.path().join("missing.json")),
            Err(RegionError::Read { .. })
        ));
    }

    #[test]
    fn discovers_json_files_sorted() {
        let dir = tempfile::tempdir().unwrap();

        let world = dir.path().join("world");
        let us = dir.path().join("us");

        fs::create_dir_all(&world).unwrap();
        fs::create_dir_all(&us).unwrap();

        fs::write(world.join("kw-kuwait.json"), "{}").unwrap();
        fs::write(world.join("README.md"), "").unwrap();
        fs::write(us.join("alabama-al.json"), "{}").unwrap();

        let extra = dir.path().join("extra.manifest");

        fs::write(&extra, "{}").unwrap();

        let found =
            discover_manifests(&[dir.path().to_path_buf(), extra.clone(), world.clone()]).unwrap();

        assert_eq!(
            found,
            vec![
                extra,
                us.join("alabama-al.json"),
                world.join("kw-kuwait.json"),
            ]
        );
    }
}
