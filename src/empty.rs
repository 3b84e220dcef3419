//! Predicates deciding that a freshly rendered tile carries nothing worth
//! keeping. Such tiles are never written to the output tree.

use image::RgbaImage;

/// A tile right after rendering and encoding, before it is persisted.
#[derive(Clone, Copy, Debug)]
pub struct RenderedTile<'a> {
    pub image: &'a RgbaImage,
    pub encoded: &'a [u8],
}

pub trait EmptyTile: Send + Sync {
    fn is_empty(&self, tile: &RenderedTile<'_>) -> bool;
}

/// Every pixel has the same RGBA value.
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformColor;

impl EmptyTile for UniformColor {
    fn is_empty(&self, tile: &RenderedTile<'_>) -> bool {
        let mut pixels = tile.image.pixels();

        match pixels.next() {
            Some(first) => pixels.all(|pixel| pixel == first),
            None => true,
        }
    }
}

/// Encoded tile is exactly this many bytes long.
///
/// Only meaningful for one encoder configuration: the blank tile of a given
/// encoder has a fixed size, any other encoder produces a different one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodedSize(pub u64);

impl EmptyTile for EncodedSize {
    fn is_empty(&self, tile: &RenderedTile<'_>) -> bool {
        tile.encoded.len() as u64 == self.0
    }
}
