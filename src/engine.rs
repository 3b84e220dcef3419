//! Boundary to whatever turns a style and an extent into pixels.
//!
//! A [`RenderEngine`] is shared by every worker and only hands out contexts.
//! A [`RenderContext`] is the stateful map object; it is created on the worker
//! thread that uses it and never leaves that thread.

use crate::{projection::GeoPoint, style::WEB_MERCATOR};
use image::RgbaImage;
use std::f64::consts::PI;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported SRS {0:?}")]
    UnsupportedSrs(String),
    #[error("projection failed: {0}")]
    Projection(String),
    #[error("map has no extent, call zoom_to_box first")]
    NoExtent,
    #[error("degenerate extent {0:?}")]
    DegenerateExtent(ProjectedBox),
    #[error("cannot allocate {width}x{height} image")]
    Allocation { width: u32, height: u32 },
    #[error("{0}")]
    Other(String),
}

/// Axis aligned box in the engine's projected units.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ProjectedBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl ProjectedBox {
    /// Box spanned by two opposite corners given in any order.
    pub fn from_corners(a: (f64, f64), b: (f64, f64)) -> Self {
        Self {
            min_x: a.0.min(b.0),
            min_y: a.1.min(b.1),
            max_x: a.0.max(b.0),
            max_y: a.1.max(b.1),
        }
    }

    /// Smallest box containing all points, `None` for no points.
    pub fn enclosing(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        points.into_iter().fold(None, |acc, point| {
            let point_box = Self::from_corners(point, point);

            Some(acc.map_or(point_box, |acc: Self| acc.union(&point_box)))
        })
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn buffered(&self, dx: f64, dy: f64) -> Self {
        Self {
            min_x: self.min_x - dx,
            min_y: self.min_y - dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0) || !self.width().is_finite()
    }
}

/// Forward transform from lon/lat degrees to a projected SRS.
pub trait Projection {
    fn forward(&self, point: GeoPoint) -> Result<(f64, f64), EngineError>;
}

const EARTH_RADIUS: f64 = 6_378_137.0;

const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// EPSG:3857 in metres.
#[derive(Copy, Clone, Debug, Default)]
pub struct SphericalMercator;

impl Projection for SphericalMercator {
    fn forward(&self, point: GeoPoint) -> Result<(f64, f64), EngineError> {
        let lat = point.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);

        let x = EARTH_RADIUS * point.lon.to_radians();

        let y = EARTH_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();

        Ok((x, y))
    }
}

#[cfg(feature = "proj")]
pub struct ProjProjection(proj::Proj);

#[cfg(feature = "proj")]
impl ProjProjection {
    pub fn new(srs: &str) -> Result<Self, EngineError> {
        proj::Proj::new_known_crs("EPSG:4326", srs, None)
            .map(Self)
            .map_err(|err| EngineError::Projection(err.to_string()))
    }
}

#[cfg(feature = "proj")]
impl Projection for ProjProjection {
    fn forward(&self, point: GeoPoint) -> Result<(f64, f64), EngineError> {
        self.0
            .convert((point.lon, point.lat))
            .map_err(|err| EngineError::Projection(err.to_string()))
    }
}

/// Builds the lon/lat to `srs` transform.
pub fn projection_for(srs: &str) -> Result<Box<dyn Projection>, EngineError> {
    if srs.eq_ignore_ascii_case(WEB_MERCATOR) || srs.eq_ignore_ascii_case("EPSG:900913") {
        return Ok(Box::new(SphericalMercator));
    }

    #[cfg(feature = "proj")]
    {
        Ok(Box::new(ProjProjection::new(srs)?))
    }

    #[cfg(not(feature = "proj"))]
    {
        Err(EngineError::UnsupportedSrs(srs.to_string()))
    }
}

pub trait RenderEngine: Send + Sync {
    type Context: RenderContext;

    /// Creates a fresh map object for one worker.
    fn create_context(&self) -> Result<Self::Context, EngineError>;
}

pub trait RenderContext {
    /// Projects lon/lat into the map's SRS.
    fn forward(&self, point: GeoPoint) -> Result<(f64, f64), EngineError>;

    fn resize(&mut self, width: u32, height: u32);

    fn zoom_to_box(&mut self, extent: ProjectedBox);

    /// Margin in pixels drawn around the visible extent so that features
    /// crossing the edge are not cut.
    fn buffer_size(&self) -> u32;

    fn set_buffer_size(&mut self, buffer_size: u32);

    fn render(&mut self) -> Result<RgbaImage, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mercator_known_values() {
        let (x, y) = SphericalMercator.forward(GeoPoint::new(0.0, 0.0)).unwrap();

        assert!(x.abs() < 1e-9 && y.abs() < 1e-9);

        let (x, y) = SphericalMercator
            .forward(GeoPoint::new(180.0, MAX_MERCATOR_LAT))
            .unwrap();

        assert!((x - 20_037_508.342_789_244).abs() < 1e-6);
        assert!((y - 20_037_508.342_789_244).abs() < 1e-3);
    }

    #[test]
    fn mercator_clamps_poles() {
        let (_, y) = SphericalMercator.forward(GeoPoint::new(0.0, 90.0)).unwrap();

        assert!(y.is_finite());
    }

    #[test]
    fn boxes_normalise_corners() {
        let a = ProjectedBox::from_corners((10.0, -5.0), (-10.0, 5.0));

        assert_eq!(
            a,
            ProjectedBox {
                min_x: -10.0,
                min_y: -5.0,
                max_x: 10.0,
                max_y: 5.0
            }
        );

        assert!(a.intersects(&ProjectedBox::from_corners((9.0, 4.0), (20.0, 20.0))));
        assert!(!a.intersects(&ProjectedBox::from_corners((11.0, 0.0), (20.0, 1.0))));
        assert!(a.buffered(2.0, 0.0).intersects(&ProjectedBox::from_corners((11.0, 0.0), (20.0, 1.0))));

        assert!(ProjectedBox::from_corners((1.0, 1.0), (1.0, 3.0)).is_degenerate());
        assert!(!a.is_degenerate());

        assert_eq!(
            ProjectedBox::enclosing([(1.0, 2.0), (-1.0, 0.0), (0.5, 7.0)]),
            Some(ProjectedBox::from_corners((-1.0, 0.0), (1.0, 7.0)))
        );
        assert_eq!(ProjectedBox::enclosing([]), None);
    }

    #[test]
    fn web_mercator_is_built_in() {
        assert!(projection_for("EPSG:3857").is_ok());
        assert!(projection_for("epsg:900913").is_ok());
    }

    #[cfg(not(feature = "proj"))]
    #[test]
    fn other_srs_needs_proj() {
        assert!(matches!(
            projection_for("EPSG:5514"),
            Err(EngineError::UnsupportedSrs(_))
        ));
    }
}
