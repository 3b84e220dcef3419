//! Map style: what the built-in engine draws and how.
//!
//! A style is a JSON document loaded once per run and shared read-only by all
//! workers:
//!
//! ```json
//! {
//!   "srs": "EPSG:3857",
//!   "background": "f2efe9",
//!   "buffer_size": 64,
//!   "layers": [
//!     {
//!       "name": "land",
//!       "fill": "#e0dccfff",
//!       "stroke": "808080",
//!       "stroke_width": 1.0,
//!       "features": [
//!         { "type": "Polygon", "coordinates": [[[7.39, 43.72], [7.44, 43.72], [7.44, 43.76], [7.39, 43.72]]] }
//!       ]
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Deserializer, de};
use std::{fmt::Display, fs, num::ParseIntError, path::Path, str::FromStr};
use thiserror::Error;

pub const WEB_MERCATOR: &str = "EPSG:3857";

#[derive(Debug, Error)]
pub enum StyleError {
    #[error("failed to read style {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse style: {0}")]
    Parse(#[from] serde_json::Error),
}

/// RGBA colour written as `RRGGBB` or `RRGGBBAA`, `#` optional.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Rgba(pub [u8; 4]);

#[derive(Debug, Error, PartialEq)]
pub enum ParseColorError {
    #[error("colour must have 6 or 8 hex digits, got {0:?}")]
    Length(String),
    #[error("invalid hex colour: {0}")]
    Hex(#[from] ParseIntError),
}

impl FromStr for Rgba {
    type Err = ParseColorError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let hex = string.trim_start_matches('#');

        let color = u32::from_str_radix(hex, 16)?;

        match hex.len() {
            6 => {
                let [_, r, g, b] = color.to_be_bytes();

                Ok(Self([r, g, b, 0xFF]))
            }
            8 => Ok(Self(color.to_be_bytes())),
            _ => Err(ParseColorError::Length(string.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Rgba {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(deserializer)?;

        string.parse().map_err(de::Error::custom)
    }
}

impl Display for Rgba {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [r, g, b, a] = self.0;

        write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
    }
}

pub type Position = [f64; 2];

/// Subset of GeoJSON geometries, lon/lat degrees.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Layer {
    #[serde(default)]
    pub name: String,
    pub fill: Option<Rgba>,
    pub stroke: Option<Rgba>,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f32,
    /// Radius used for point features.
    #[serde(default = "default_point_radius")]
    pub point_radius: f32,
    #[serde(default)]
    pub features: Vec<Geometry>,
}

fn default_stroke_width() -> f32 {
    1.0
}

fn default_point_radius() -> f32 {
    3.0
}

fn default_srs() -> String {
    WEB_MERCATOR.to_string()
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Style {
    #[serde(default = "default_srs")]
    pub srs: String,
    /// Transparent when absent.
    pub background: Option<Rgba>,
    /// Render buffer in pixels declared by the style.
    #[serde(default)]
    pub buffer_size: u32,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

impl Style {
    pub fn load(path: &Path) -> Result<Self, StyleError> {
        let json = fs::read_to_string(path).map_err(|source| StyleError::Read {
            path: path.display().to_string(),
            source,
        })?;

        json.parse()
    }
}

impl FromStr for Style {
    type Err = StyleError;

    fn from_str(json: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(json)?)
    }
}
