use crate::{
    queue::DEFAULT_CAPACITY,
    pipeline::DEFAULT_CONCURRENCY,
    tile::{BoundingBox, ZoomRange, ZoomRangeError},
};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

#[derive(Clone, Debug, Parser, PartialEq)]
#[clap(version, about, group = ArgGroup::new("source").required(true))]
pub struct Options {
    /// Style JSON file
    #[clap(long)]
    pub style: PathBuf,

    /// Output root; tiles are written to <output>/<region>/<z>/<x>/<y>.png
    #[clap(long)]
    pub output: PathBuf,

    /// Region manifests, or directories searched for `*.json` manifests
    #[clap(group = "source")]
    pub regions: Vec<PathBuf>,

    /// Render a single box instead of manifests, as west,south,east,north in degrees
    #[clap(long, group = "source", requires = "region", allow_hyphen_values = true)]
    pub bbox: Option<BoundingBox>,

    /// Region (output directory) name for `--bbox`
    #[clap(long, requires = "bbox")]
    pub region: Option<String>,

    /// Number of render threads
    #[clap(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub threads: usize,

    /// Jobs buffered between the producer and the render threads
    #[clap(long, default_value_t = DEFAULT_CAPACITY)]
    pub queue_capacity: usize,

    /// Name tile files by TMS row (y counted from the south)
    #[clap(long)]
    pub tms: bool,

    /// Stop at the first failed tile instead of logging it and going on
    #[clap(long)]
    pub strict: bool,

    /// Do not queue a tile again when another box of the same region already queued it
    #[clap(long, conflicts_with = "bbox")]
    pub dedup: bool,

    /// Lowest zoom level; overrides the manifests' zoom ranges
    #[clap(long)]
    pub min_zoom: Option<u8>,

    /// Highest zoom level; overrides the manifests' zoom ranges
    #[clap(long)]
    pub max_zoom: Option<u8>,

    /// Treat tiles encoded to exactly this many bytes as empty instead of
    /// checking for a single colour. Depends on the encoder.
    #[clap(long)]
    pub empty_tile_bytes: Option<u64>,
}

impl Options {
    /// Zoom range from `--min-zoom`/`--max-zoom`, missing ends taken from
    /// `fallback` but never past the given end.
    pub fn zoom_range(&self, fallback: ZoomRange) -> Result<ZoomRange, ZoomRangeError> {
        let min = self
            .min_zoom
            .unwrap_or_else(|| fallback.min().min(self.max_zoom.unwrap_or(u8::MAX)));

        let max = self
            .max_zoom
            .unwrap_or_else(|| fallback.max().max(self.min_zoom.unwrap_or(0)));

        ZoomRange::new(min, max)
    }

    /// Replacement for manifest zoom ranges, if any bound was given.
    pub fn zoom_override(&self) -> Result<Option<Vec<ZoomRange>>, ZoomRangeError> {
        if self.min_zoom.is_none() && self.max_zoom.is_none() {
            return Ok(None);
        }

        Ok(Some(vec![self.zoom_range(ZoomRange::REGION_BASE)?]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, clap::Error> {
        Options::try_parse_from(
            ["tilegen", "--style", "style.json", "--output", "out"]
                .iter()
                .chain(args),
        )
    }

    #[test]
    fn manifests_with_defaults() {
        let options = parse(&["zones/world", "zones/us/alabama-al.json"]).unwrap();

        assert_eq!(options.regions.len(), 2);
        assert_eq!(options.threads, 6);
        assert_eq!(options.queue_capacity, 32);
        assert!(!options.tms && !options.strict && !options.dedup);
        assert_eq!(options.zoom_override(), Ok(None));
    }

    #[test]
    fn single_box() {
        let options = parse(&[
            "--bbox",
            "-87.81887,30.22831,-87.8932,30.23924",
            "--region",
            "alabama-al",
            "--max-zoom",
            "11",
            "--min-zoom",
            "0",
        ])
        .unwrap();

        assert_eq!(
            options.bbox,
            Some(BoundingBox::new(-87.81887, 30.22831, -87.8932, 30.23924))
        );
        assert_eq!(
            options.zoom_range(ZoomRange::default()),
            ZoomRange::new(0, 11)
        );
    }

    #[test]
    fn zoom_bounds_fill_from_fallback() {
        let options = parse(&["zones", "--max-zoom", "13"]).unwrap();

        assert_eq!(
            options.zoom_override(),
            Ok(Some(vec![ZoomRange::new(0, 13).unwrap()]))
        );

        let options = parse(&["zones", "--min-zoom", "12"]).unwrap();

        assert_eq!(
            options.zoom_override(),
            Ok(Some(vec![ZoomRange::single(12).unwrap()]))
        );

        let options = parse(&["zones", "--min-zoom", "12", "--max-zoom", "11"]).unwrap();

        assert!(options.zoom_override().is_err());

        let options = parse(&["--bbox", "1,2,3,4", "--region", "x", "--max-zoom", "0"]).unwrap();

        assert_eq!(
            options.zoom_range(ZoomRange::default()),
            ZoomRange::single(0)
        );
    }

    #[test]
    fn needs_exactly_one_source() {
        assert!(parse(&[]).is_err());

        assert!(parse(&["--bbox", "1,2,3,4"]).is_err());

        assert!(parse(&["zones", "--bbox", "1,2,3,4", "--region", "x"]).is_err());
    }

    #[test]
    fn dedup_needs_manifests() {
        assert!(parse(&["zones", "--dedup"]).unwrap().dedup);

        assert!(parse(&["--bbox", "1,2,3,4", "--region", "x", "--dedup"]).is_err());
    }

    #[test]
    fn rejects_non_finite_box() {
        assert!(parse(&["--bbox", "nan,2,3,4", "--region", "x"]).is_err());
    }
}
