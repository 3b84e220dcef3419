use crate::projection::{GeoPoint, ProjectionError, TILE_SIZE, TileProjection};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt::{Display, Formatter},
    ops::RangeInclusive,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

pub const MAX_ZOOM: u8 = 30;

pub const TILE_EXTENSION: &str = "png";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoordinate {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoordinate {
    pub const fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Number of tiles along one axis at this zoom.
    pub const fn axis_len(zoom: u8) -> u64 {
        1 << zoom
    }

    /// Row as counted from the south (OSGeo TMS).
    pub const fn reversed_y(&self) -> u32 {
        ((1_u64 << self.zoom) - 1 - self.y as u64) as u32
    }

    /// `<root>/<zoom>/<x>/`
    pub fn dir(&self, root: &Path) -> PathBuf {
        root.join(self.zoom.to_string()).join(self.x.to_string())
    }

    /// `<root>/<zoom>/<x>/<y>.png`, `y` flipped when `tms` is set.
    pub fn path(&self, root: &Path, tms: bool) -> PathBuf {
        let y = if tms { self.reversed_y() } else { self.y };

        self.dir(root).join(format!("{y}.{TILE_EXTENSION}"))
    }
}

impl Display for TileCoordinate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Geographic rectangle in degrees as supplied by region data. The fields are
/// named for the intended order but callers routinely swap them; nothing here
/// normalises.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    pub const fn north_west(&self) -> GeoPoint {
        GeoPoint::new(self.west, self.north)
    }

    pub const fn south_east(&self) -> GeoPoint {
        GeoPoint::new(self.east, self.south)
    }

    pub fn is_finite(&self) -> bool {
        [self.west, self.south, self.east, self.north]
            .iter()
            .all(|value| value.is_finite())
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from([west, south, east, north]: [f64; 4]) -> Self {
        Self::new(west, south, east, north)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.west, bbox.south, bbox.east, bbox.north]
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseBoundingBoxError {
    #[error("expected four comma separated numbers")]
    Arity,
    #[error("invalid number: {0}")]
    Number(#[from] std::num::ParseFloatError),
    #[error("coordinates must be finite")]
    NonFinite,
}

impl FromStr for BoundingBox {
    type Err = ParseBoundingBoxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|value| value.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()?;

        let values: [f64; 4] = values
            .try_into()
            .map_err(|_| ParseBoundingBoxError::Arity)?;

        let bbox = BoundingBox::from(values);

        if !bbox.is_finite() {
            return Err(ParseBoundingBoxError::NonFinite);
        }

        Ok(bbox)
    }
}

impl Display for BoundingBox {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.west, self.south, self.east, self.north
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ZoomRangeError {
    #[error("min zoom {min} is greater than max zoom {max}")]
    Inverted { min: u8, max: u8 },
    #[error("zoom {0} exceeds the supported maximum of {MAX_ZOOM}")]
    TooDeep(u8),
}

/// Inclusive zoom range.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[u8; 2]", into = "[u8; 2]")]
pub struct ZoomRange {
    min: u8,
    max: u8,
}

impl ZoomRange {
    /// Levels a region is rendered at unless its manifest says otherwise.
    pub const REGION_BASE: Self = Self { min: 0, max: 11 };

    pub fn new(min: u8, max: u8) -> Result<Self, ZoomRangeError> {
        if max > MAX_ZOOM {
            return Err(ZoomRangeError::TooDeep(max));
        }

        if min > max {
            return Err(ZoomRangeError::Inverted { min, max });
        }

        Ok(Self { min, max })
    }

    pub fn single(zoom: u8) -> Result<Self, ZoomRangeError> {
        Self::new(zoom, zoom)
    }

    pub const fn min(&self) -> u8 {
        self.min
    }

    pub const fn max(&self) -> u8 {
        self.max
    }

    pub const fn levels(&self) -> RangeInclusive<u8> {
        self.min..=self.max
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self { min: 1, max: 18 }
    }
}

impl TryFrom<[u8; 2]> for ZoomRange {
    type Error = ZoomRangeError;

    fn try_from([min, max]: [u8; 2]) -> Result<Self, Self::Error> {
        Self::new(min, max)
    }
}

impl From<ZoomRange> for [u8; 2] {
    fn from(range: ZoomRange) -> Self {
        [range.min, range.max]
    }
}

impl Display for ZoomRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

fn tile_index(pixel: f64) -> i64 {
    (pixel / TILE_SIZE as f64).floor() as i64
}

/// Inclusive index range between two pixel positions, clipped to the pyramid.
fn axis_range(a: f64, b: f64, zoom: u8) -> Option<RangeInclusive<u32>> {
    let (a, b) = (tile_index(a), tile_index(b));

    let limit = TileCoordinate::axis_len(zoom) as i64 - 1;

    let min = a.min(b).max(0);
    let max = a.max(b).min(limit);

    (min <= max).then(|| min as u32..=max as u32)
}

/// Tiles touched by `bbox` at one zoom level, column by column.
///
/// Corner order does not matter: the index range on each axis is taken between
/// the two projected corners whichever is larger. Indices outside the pyramid
/// are dropped.
pub fn covered_tiles_at(
    projection: &TileProjection,
    bbox: &BoundingBox,
    zoom: u8,
) -> Result<impl Iterator<Item = TileCoordinate> + use<>, ProjectionError> {
    let ranges = covered_ranges(projection, bbox, zoom)?;

    Ok(ranges.into_iter().flat_map(move |(xs, ys)| {
        xs.flat_map(move |x| ys.clone().map(move |y| TileCoordinate::new(zoom, x, y)))
    }))
}

fn covered_ranges(
    projection: &TileProjection,
    bbox: &BoundingBox,
    zoom: u8,
) -> Result<Option<(RangeInclusive<u32>, RangeInclusive<u32>)>, ProjectionError> {
    let p0 = projection.to_pixel(bbox.north_west(), zoom)?;
    let p1 = projection.to_pixel(bbox.south_east(), zoom)?;

    Ok(axis_range(p0.x, p1.x, zoom).zip(axis_range(p0.y, p1.y, zoom)))
}

/// Number of tiles [`covered_tiles_at`] yields summed over `zoom`, without
/// enumerating them.
pub fn covered_tile_count(
    projection: &TileProjection,
    bbox: &BoundingBox,
    zoom: ZoomRange,
) -> Result<u64, ProjectionError> {
    let mut count = 0;

    for z in zoom.levels() {
        if let Some((xs, ys)) = covered_ranges(projection, bbox, z)? {
            count += (xs.end() - xs.start() + 1) as u64 * (ys.end() - ys.start() + 1) as u64;
        }
    }

    Ok(count)
}

/// Tiles already queued earlier in a run, used to skip repeats across
/// overlapping boxes of one region.
#[derive(Clone, Debug, Default)]
pub struct TileSet(HashSet<TileCoordinate>);

impl TileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `false` if the tile was already present.
    pub fn insert(&mut self, tile: TileCoordinate) -> bool {
        self.0.insert(tile)
    }

    pub fn contains(&self, tile: &TileCoordinate) -> bool {
        self.0.contains(tile)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// All tiles touched by `bbox` over a zoom range, lowest zoom first.
pub fn covered_tiles(
    bbox: &BoundingBox,
    zoom: ZoomRange,
) -> Result<Vec<TileCoordinate>, ProjectionError> {
    let projection = TileProjection::new(zoom.max() + 1);

    let mut tiles = Vec::new();

    for z in zoom.levels() {
        tiles.extend(covered_tiles_at(&projection, bbox, z)?);
    }

    Ok(tiles)
}
