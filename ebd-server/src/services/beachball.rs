//! Focal mechanism ("beachball") rendering
//!
//! Lower hemisphere, equal-area projection of the radiation pattern of a
//! moment tensor. Compressional quadrants are painted in the face colour,
//! dilatational ones white, the outside of the sphere stays transparent.

use crate::formats::quakeml::MomentTensor;
use anyhow::{bail, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use std::io::Cursor;

pub const DEFAULT_WIDTH: u32 = 150;
pub const DEFAULT_COLOR: &str = "red";
/// Largest accepted image width
pub const MAX_WIDTH: u32 = 2000;
/// Smaller images are rendered at this size and scaled down
pub const MIN_RENDER_WIDTH: u32 = 100;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const OUTLINE: Rgba<u8> = Rgba([0, 0, 0, 255]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Parse a colour name or `#rrggbb`
pub fn parse_color(value: &str) -> Option<Rgba<u8>> {
    let value = value.trim().to_ascii_lowercase();
    if let Some(hex) = value.strip_prefix('#') {
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        return Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255]));
    }

    let rgb = match value.as_str() {
        "red" => [255, 0, 0],
        "green" => [0, 128, 0],
        "blue" => [0, 0, 255],
        "black" => [0, 0, 0],
        "white" => [255, 255, 255],
        "gray" | "grey" => [128, 128, 128],
        "yellow" => [255, 255, 0],
        "orange" => [255, 165, 0],
        "purple" => [128, 0, 128],
        "cyan" => [0, 255, 255],
        "magenta" => [255, 0, 255],
        "brown" => [165, 42, 42],
        "pink" => [255, 192, 203],
        "navy" => [0, 0, 128],
        _ => return None,
    };
    Some(Rgba([rgb[0], rgb[1], rgb[2], 255]))
}

/// Moment tensor rotated from up-south-east into north-east-down
fn ned_matrix(mt: &MomentTensor) -> [[f64; 3]; 3] {
    let (nn, ee, dd) = (mt.mtt, mt.mpp, mt.mrr);
    let (ne, nd, ed) = (-mt.mtp, mt.mrt, -mt.mrp);
    [[nn, ne, nd], [ne, ee, ed], [nd, ed, dd]]
}

/// Render the beachball into an RGBA image of `width` x `width` pixels
pub fn render(mt: &MomentTensor, width: u32, face: Rgba<u8>) -> RgbaImage {
    let size = width.max(MIN_RENDER_WIDTH);
    let m = ned_matrix(mt);

    let center = f64::from(size) / 2.0;
    let line = (f64::from(size) / 60.0).max(1.5);
    let radius = center - line;

    let image = RgbaImage::from_fn(size, size, |x, y| {
        // East to the right, north up
        let east = (f64::from(x) + 0.5 - center) / radius;
        let north = (center - (f64::from(y) + 0.5)) / radius;
        let rho = (east * east + north * north).sqrt();

        if rho > 1.0 + line / radius {
            return TRANSPARENT;
        }
        if rho > 1.0 {
            return OUTLINE;
        }

        let incidence = 2.0 * (rho / std::f64::consts::SQRT_2).asin();
        let azimuth = east.atan2(north);
        let v = [
            incidence.sin() * azimuth.cos(),
            incidence.sin() * azimuth.sin(),
            incidence.cos(),
        ];
        let mut amplitude = 0.0;
        for (i, row) in m.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                amplitude += v[i] * value * v[j];
            }
        }
        if amplitude > 0.0 {
            face
        } else {
            WHITE
        }
    });

    if size == width {
        image
    } else {
        image::imageops::resize(&image, width, width, FilterType::Lanczos3)
    }
}

/// Render and encode as PNG
pub fn render_png(mt: &MomentTensor, width: u32, face: Rgba<u8>) -> Result<Vec<u8>> {
    if width == 0 || width > MAX_WIDTH {
        bail!("beachball width {} outside 1..={}", width, MAX_WIDTH);
    }
    let image = render(mt, width, face);
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image).write_to(&mut buffer, ImageOutputFormat::Png)?;
    Ok(buffer.into_inner())
}
