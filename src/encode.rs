//! Palette PNG, the single output format.
//!
//! Tiles with at most 256 distinct RGBA colours are stored losslessly; busier
//! tiles are quantised with NeuQuant.

use color_quant::NeuQuant;
use image::RgbaImage;
use std::collections::HashMap;

const MAX_COLORS: usize = 256;

/// NeuQuant sampling factor, 1 is best quality and slowest.
const QUANT_SAMPLE_FACTOR: i32 = 10;

struct Indexed {
    /// RGBA entries.
    palette: Vec<[u8; 4]>,
    indices: Vec<u8>,
}

fn exact_palette(image: &RgbaImage) -> Option<Indexed> {
    let mut lookup = HashMap::<[u8; 4], u8>::new();

    let mut palette = Vec::new();

    let mut indices = Vec::with_capacity((image.width() * image.height()) as usize);

    for pixel in image.pixels() {
        let index = match lookup.get(&pixel.0) {
            Some(index) => *index,
            None => {
                if palette.len() == MAX_COLORS {
                    return None;
                }

                let index = palette.len() as u8;

                palette.push(pixel.0);

                lookup.insert(pixel.0, index);

                index
            }
        };

        indices.push(index);
    }

    Some(Indexed { palette, indices })
}

fn quantized_palette(image: &RgbaImage) -> Indexed {
    let quant = NeuQuant::new(QUANT_SAMPLE_FACTOR, MAX_COLORS, image.as_raw());

    let palette = quant
        .color_map_rgba()
        .chunks_exact(4)
        .map(|c| [c[0], c[1], c[2], c[3]])
        .collect();

    let indices = image
        .pixels()
        .map(|pixel| quant.index_of(&pixel.0) as u8)
        .collect();

    Indexed { palette, indices }
}

fn bit_depth(colors: usize) -> png::BitDepth {
    match colors {
        0..=2 => png::BitDepth::One,
        3..=4 => png::BitDepth::Two,
        5..=16 => png::BitDepth::Four,
        _ => png::BitDepth::Eight,
    }
}

/// Packs one index per pixel into rows of `depth` bit samples.
fn pack(indices: &[u8], width: usize, depth: png::BitDepth) -> Vec<u8> {
    let bits = depth as usize;

    if bits == 8 {
        return indices.to_vec();
    }

    let per_byte = 8 / bits;

    indices
        .chunks(width)
        .flat_map(|row| {
            row.chunks(per_byte).map(|samples| {
                samples.iter().enumerate().fold(0_u8, |byte, (i, sample)| {
                    byte | (sample << (8 - bits * (i + 1)))
                })
            })
        })
        .collect()
}

pub fn encode_png256(image: &RgbaImage) -> Result<Vec<u8>, png::EncodingError> {
    let Indexed { palette, indices } =
        exact_palette(image).unwrap_or_else(|| quantized_palette(image));

    let rgb: Vec<u8> = palette.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();

    // trailing opaque entries can be left out of tRNS
    let opaque_tail = palette.iter().rev().take_while(|c| c[3] == 0xFF).count();

    let trns: Vec<u8> = palette[..palette.len() - opaque_tail]
        .iter()
        .map(|c| c[3])
        .collect();

    let depth = bit_depth(palette.len());

    let data = pack(&indices, image.width() as usize, depth);

    let mut buffer = Vec::new();

    {
        let mut encoder = png::Encoder::new(&mut buffer, image.width(), image.height());

        encoder.set_color(png::ColorType::Indexed);

        encoder.set_depth(depth);

        encoder.set_compression(png::Compression::Best);

        encoder.set_palette(rgb);

        if !trns.is_empty() {
            encoder.set_trns(trns);
        }

        let mut writer = encoder.write_header()?;

        writer.write_image_data(&data)?;

        writer.finish()?;
    }

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};

    fn decode(bytes: &[u8]) -> RgbaImage {
        image::load_from_memory_with_format(bytes, ImageFormat::Png)
            .unwrap()
            .to_rgba8()
    }

    #[test]
    fn few_colors_round_trip_exactly() {
        let mut image = RgbaImage::from_pixel(256, 256, Rgba([0, 0, 0, 0]));

        for x in 0..128 {
            image.put_pixel(x, 10, Rgba([200, 10, 10, 255]));
            image.put_pixel(x, 20, Rgba([10, 200, 10, 128]));
        }

        let bytes = encode_png256(&image).unwrap();

        assert_eq!(&bytes[1..4], b"PNG");

        assert_eq!(decode(&bytes), image);
    }

    #[test]
    fn writes_indexed_color_type() {
        let image = RgbaImage::from_pixel(256, 256, Rgba([1, 2, 3, 255]));

        let bytes = encode_png256(&image).unwrap();

        let decoder = png::Decoder::new(bytes.as_slice());

        let reader = decoder.read_info().unwrap();

        assert_eq!(reader.info().color_type, png::ColorType::Indexed);
        assert_eq!(reader.info().bit_depth, png::BitDepth::One);
    }

    #[test]
    fn packs_sub_byte_samples() {
        assert_eq!(
            pack(&[1, 0, 1, 1, 0, 0, 0, 1, 1], 9, png::BitDepth::One),
            vec![0b1011_0001, 0b1000_0000]
        );
        assert_eq!(
            pack(&[3, 2, 1, 0, 3], 5, png::BitDepth::Two),
            vec![0b1110_0100, 0b1100_0000]
        );
        assert_eq!(pack(&[15, 1, 2], 3, png::BitDepth::Four), vec![0xF1, 0x20]);
        assert_eq!(pack(&[1, 2, 3, 4], 2, png::BitDepth::Four), vec![0x12, 0x34]);
    }

    #[test]
    fn sixteen_colors_use_four_bits() {
        let image =
            RgbaImage::from_fn(256, 256, |x, _| Rgba([(x / 16) as u8 * 16, 0, 0, 255]));

        let bytes = encode_png256(&image).unwrap();

        let reader = png::Decoder::new(bytes.as_slice()).read_info().unwrap();

        assert_eq!(reader.info().bit_depth, png::BitDepth::Four);

        assert_eq!(decode(&bytes), image);
    }

    #[test]
    fn many_colors_are_quantized() {
        let image = RgbaImage::from_fn(256, 256, |x, y| Rgba([x as u8, y as u8, 128, 255]));

        let bytes = encode_png256(&image).unwrap();

        let decoded = decode(&bytes);

        assert_eq!(decoded.dimensions(), (256, 256));

        let distinct: std::collections::HashSet<_> = decoded.pixels().map(|p| p.0).collect();

        assert!(distinct.len() <= 256);

        let pixel = decoded.get_pixel(200, 40).0;

        assert!((pixel[0] as i32 - 200).abs() < 40);
        assert!((pixel[1] as i32 - 40).abs() < 40);
    }

    #[test]
    fn blank_tile_is_small() {
        let image = RgbaImage::from_pixel(256, 256, Rgba([0, 0, 0, 0]));

        assert!(encode_png256(&image).unwrap().len() < 200);
    }
}
