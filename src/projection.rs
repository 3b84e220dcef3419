//! Spherical mercator ("Google") projection between lon/lat degrees and
//! global pixel coordinates of a 256 px tile pyramid.

use crate::tile::MAX_ZOOM;
use std::f64::consts::PI;
use thiserror::Error;

pub const TILE_SIZE: u32 = 256;

/// Sine of latitude is clamped to this value so the transform stays finite
/// near the poles.
const MAX_SIN_LAT: f64 = 0.9999;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Pixel position in the whole-world image at some zoom; y grows southwards.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("zoom {zoom} out of range, projection covers levels 0..{levels}")]
    ZoomOutOfRange { zoom: u8, levels: u8 },
    #[error("longitude and latitude must be finite")]
    NonFinite,
}

#[derive(Clone, Debug)]
struct Level {
    pixels_per_degree: f64,
    pixels_per_radian: f64,
    center: f64,
}

#[derive(Clone, Debug)]
pub struct TileProjection {
    levels: Vec<Level>,
}

impl TileProjection {
    /// Precomputes scale factors for zoom levels `0..levels`, at most up to
    /// [`MAX_ZOOM`].
    pub fn new(levels: u8) -> Self {
        let levels = (0..levels.min(MAX_ZOOM + 1))
            .map(|zoom| {
                let size = ((TILE_SIZE as u64) << zoom) as f64;

                Level {
                    pixels_per_degree: size / 360.0,
                    pixels_per_radian: size / (2.0 * PI),
                    center: size / 2.0,
                }
            })
            .collect();

        Self { levels }
    }

    pub fn levels(&self) -> u8 {
        self.levels.len() as u8
    }

    fn level(&self, zoom: u8) -> Result<&Level, ProjectionError> {
        self.levels
            .get(zoom as usize)
            .ok_or(ProjectionError::ZoomOutOfRange {
                zoom,
                levels: self.levels(),
            })
    }

    pub fn to_pixel(&self, point: GeoPoint, zoom: u8) -> Result<PixelPoint, ProjectionError> {
        let level = self.level(zoom)?;

        if !point.lon.is_finite() || !point.lat.is_finite() {
            return Err(ProjectionError::NonFinite);
        }

        let x = (level.center + point.lon * level.pixels_per_degree).round();

        let sin = point.lat.to_radians().sin().clamp(-MAX_SIN_LAT, MAX_SIN_LAT);

        let y = (level.center - level.pixels_per_radian * 0.5 * ((1.0 + sin) / (1.0 - sin)).ln())
            .round();

        Ok(PixelPoint::new(x, y))
    }

    pub fn to_geo(&self, pixel: PixelPoint, zoom: u8) -> Result<GeoPoint, ProjectionError> {
        let level = self.level(zoom)?;

        let lon = (pixel.x - level.center) / level.pixels_per_degree;

        let g = (pixel.y - level.center) / -level.pixels_per_radian;

        let lat = (2.0 * g.exp().atan() - 0.5 * PI).to_degrees();

        Ok(GeoPoint::new(lon, lat))
    }
}
