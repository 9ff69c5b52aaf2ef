//! Adaptive enhancement driven by quality metrics.
//!
//! Mirrors a radiography touch-up chain: global contrast stretch and a
//! mild gamma lift always run; brightness, linear contrast, unsharp
//! masking, and median denoising only fire when the corresponding
//! metric of the ORIGINAL image crosses its threshold; CLAHE runs last
//! for local contrast. Each step works on 8-bit RGB so the output can
//! be returned to any client as a plain PNG.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageOutputFormat, Rgb, RgbImage};
use tracing::debug;

use super::quality::QualityMetrics;
use super::ImagingError;

/// Mild gamma lift applied to every image.
const GAMMA: f32 = 1.2;

/// Metric thresholds for the conditional steps.
const BRIGHTNESS_BOOST_BELOW: f32 = 0.4;
const LINEAR_CONTRAST_BELOW: f32 = 0.5;
const SHARPEN_BELOW: f32 = 50.0;
const SHARPEN_HARD_BELOW: f32 = 25.0;
const DENOISE_ABOVE: f32 = 20.0;
const CLAHE_STRONG_BELOW: f32 = 0.3;

/// CLAHE tile edge in pixels.
const CLAHE_TILE: u32 = 128;

/// Run the full enhancement chain.
pub fn enhance(img: &DynamicImage, metrics: &QualityMetrics) -> RgbImage {
    let mut rgb = img.to_rgb8();

    rgb = contrast_stretch(&rgb);
    rgb = apply_gamma(&rgb, GAMMA);

    if metrics.brightness < BRIGHTNESS_BOOST_BELOW {
        rgb = scale_brightness(&rgb, 1.2);
    }
    if metrics.contrast < LINEAR_CONTRAST_BELOW {
        rgb = linear_adjust(&rgb, 1.2, -0.1);
    }
    if metrics.sharpness < SHARPEN_BELOW {
        let sigma = if metrics.sharpness < SHARPEN_HARD_BELOW {
            2.0
        } else {
            1.0
        };
        rgb = image::imageops::unsharpen(&rgb, sigma, 2);
    }
    if metrics.noise > DENOISE_ABOVE {
        rgb = median3(&rgb);
    }

    let max_slope = if metrics.contrast < CLAHE_STRONG_BELOW {
        3.0
    } else {
        2.0
    };
    rgb = apply_clahe(&rgb, CLAHE_TILE, max_slope);

    debug!(
        width = rgb.width(),
        height = rgb.height(),
        brightness = metrics.brightness,
        contrast = metrics.contrast,
        sharpness = metrics.sharpness,
        noise = metrics.noise,
        "Enhancement chain complete"
    );

    rgb
}

/// Encode an RGB image as PNG bytes.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, ImagingError> {
    let dynamic = DynamicImage::ImageRgb8(img.clone());
    let mut cursor = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ImagingError::Encode(e.to_string()))?;
    Ok(cursor.into_inner())
}

/// Stretch the global intensity range to 0..255.
/// Uses one min/max across all channels so hue does not shift.
pub fn contrast_stretch(rgb: &RgbImage) -> RgbImage {
    let mut min = 255u8;
    let mut max = 0u8;
    for pixel in rgb.pixels() {
        for &v in &pixel.0 {
            min = min.min(v);
            max = max.max(v);
        }
    }
    if max <= min {
        return rgb.clone();
    }

    let range = (max - min) as f32;
    map_channels(rgb, |v| ((v as f32 - min as f32) / range * 255.0).round())
}

/// Gamma lift via a 256-entry lookup table. `gamma > 1` brightens.
pub fn apply_gamma(rgb: &RgbImage, gamma: f32) -> RgbImage {
    let inv = 1.0 / gamma;
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        *slot = ((i as f32 / 255.0).powf(inv) * 255.0).round() as u8;
    }
    let mut out = rgb.clone();
    for pixel in out.pixels_mut() {
        for v in pixel.0.iter_mut() {
            *v = lut[*v as usize];
        }
    }
    out
}

/// Multiply every channel by `factor`, saturating at 255.
pub fn scale_brightness(rgb: &RgbImage, factor: f32) -> RgbImage {
    map_channels(rgb, |v| (v as f32 * factor).round())
}

/// Linear transform `out = a*in + b` with `b` in 0..1 intensity units.
pub fn linear_adjust(rgb: &RgbImage, a: f32, b: f32) -> RgbImage {
    let offset = b * 255.0;
    map_channels(rgb, |v| (v as f32 * a + offset).round())
}

/// 3x3 median filter per channel. Border pixels pass through.
pub fn median3(rgb: &RgbImage) -> RgbImage {
    let (w, h) = (rgb.width(), rgb.height());
    let mut out = rgb.clone();
    if w < 3 || h < 3 {
        return out;
    }

    let mut window = [0u8; 9];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut channels = [0u8; 3];
            for (c, slot) in channels.iter_mut().enumerate() {
                let mut i = 0;
                for dy in 0..3u32 {
                    for dx in 0..3u32 {
                        window[i] = rgb.get_pixel(x + dx - 1, y + dy - 1).0[c];
                        i += 1;
                    }
                }
                window.sort_unstable();
                *slot = window[4];
            }
            out.put_pixel(x, y, Rgb(channels));
        }
    }
    out
}

fn map_channels(rgb: &RgbImage, f: impl Fn(u8) -> f32) -> RgbImage {
    let mut out = rgb.clone();
    for pixel in out.pixels_mut() {
        for v in pixel.0.iter_mut() {
            *v = f(*v).clamp(0.0, 255.0) as u8;
        }
    }
    out
}

// ── CLAHE ─────────────────────────────────────────────────

/// Contrast-limited adaptive histogram equalization on luminance,
/// with the RGB channels rescaled by the luminance ratio so color
/// content survives.
pub fn apply_clahe(rgb: &RgbImage, tile_size: u32, max_slope: f32) -> RgbImage {
    let gray = luminance(rgb);
    let equalized = clahe_luma(&gray, tile_size, max_slope);

    let mut out = rgb.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let old = gray.get_pixel(x, y).0[0] as f32;
        let new = equalized.get_pixel(x, y).0[0] as f32;
        let scale = if old < 1.0 { new } else { new / old };
        if old < 1.0 {
            // Black pixel: set all channels to the equalized value.
            pixel.0 = [scale.clamp(0.0, 255.0) as u8; 3];
        } else {
            for v in pixel.0.iter_mut() {
                *v = (*v as f32 * scale).clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

/// CLAHE core on a grayscale image.
///
/// Per tile: histogram → clip at `max_slope` times the uniform bin
/// height → redistribute the excess evenly → CDF mapping. Each pixel is
/// remapped by bilinear interpolation between the mappings of the four
/// nearest tile centers, which removes the blocky seams plain tiled
/// equalization produces.
pub fn clahe_luma(gray: &GrayImage, tile_size: u32, max_slope: f32) -> GrayImage {
    let (w, h) = (gray.width(), gray.height());
    if w == 0 || h == 0 {
        return gray.clone();
    }
    let tile = tile_size.max(8);
    let tiles_x = w.div_ceil(tile).max(1);
    let tiles_y = h.div_ceil(tile).max(1);

    // Build one 256-entry mapping per tile.
    let mut mappings: Vec<[u8; 256]> = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile;
            let y0 = ty * tile;
            let x1 = (x0 + tile).min(w);
            let y1 = (y0 + tile).min(h);
            mappings.push(tile_mapping(gray, x0, y0, x1, y1, max_slope));
        }
    }

    let mapping_at = |tx: u32, ty: u32| -> &[u8; 256] {
        &mappings[(ty * tiles_x + tx) as usize]
    };

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        // Position in tile-center coordinates.
        let fy = (y as f32 + 0.5) / tile as f32 - 0.5;
        let ty0 = fy.floor().max(0.0) as u32;
        let ty0 = ty0.min(tiles_y - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let wy = (fy - ty0 as f32).clamp(0.0, 1.0);

        for x in 0..w {
            let fx = (x as f32 + 0.5) / tile as f32 - 0.5;
            let tx0 = fx.floor().max(0.0) as u32;
            let tx0 = tx0.min(tiles_x - 1);
            let tx1 = (tx0 + 1).min(tiles_x - 1);
            let wx = (fx - tx0 as f32).clamp(0.0, 1.0);

            let v = gray.get_pixel(x, y).0[0] as usize;
            let m00 = mapping_at(tx0, ty0)[v] as f32;
            let m10 = mapping_at(tx1, ty0)[v] as f32;
            let m01 = mapping_at(tx0, ty1)[v] as f32;
            let m11 = mapping_at(tx1, ty1)[v] as f32;

            let top = m00 * (1.0 - wx) + m10 * wx;
            let bottom = m01 * (1.0 - wx) + m11 * wx;
            let value = top * (1.0 - wy) + bottom * wy;
            out.put_pixel(x, y, image::Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

/// Clipped-histogram CDF mapping for one tile region.
fn tile_mapping(
    gray: &GrayImage,
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
    max_slope: f32,
) -> [u8; 256] {
    let mut hist = [0u32; 256];
    let mut count = 0u32;
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y).0[0] as usize] += 1;
            count += 1;
        }
    }
    if count == 0 {
        let mut identity = [0u8; 256];
        for (i, slot) in identity.iter_mut().enumerate() {
            *slot = i as u8;
        }
        return identity;
    }

    // Clip limit: max_slope times the uniform bin height.
    let clip = ((max_slope * count as f32 / 256.0).max(1.0)) as u32;
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }
    // Redistribute the clipped mass evenly.
    let bonus = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += bonus + u32::from(i < remainder);
    }

    let mut mapping = [0u8; 256];
    let mut cdf = 0u64;
    for i in 0..256 {
        cdf += hist[i] as u64;
        mapping[i] = ((cdf * 255) / count as u64).min(255) as u8;
    }
    mapping
}

/// ITU-R BT.601 luminance.
fn luminance(rgb: &RgbImage) -> GrayImage {
    let mut gray = GrayImage::new(rgb.width(), rgb.height());
    for (x, y, p) in rgb.enumerate_pixels() {
        let luma =
            0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32;
        gray.put_pixel(x, y, image::Luma([luma.round().clamp(0.0, 255.0) as u8]));
    }
    gray
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::quality::analyze_quality;
    use image::Luma;

    fn flat(w: u32, h: u32, v: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([v, v, v]))
    }

    #[test]
    fn contrast_stretch_fills_range() {
        let mut img = flat(4, 4, 100);
        img.put_pixel(0, 0, Rgb([50, 50, 50]));
        let out = contrast_stretch(&img);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(1, 1).0, [255, 255, 255]);
    }

    #[test]
    fn contrast_stretch_flat_image_unchanged() {
        let img = flat(4, 4, 77);
        let out = contrast_stretch(&img);
        assert_eq!(out.get_pixel(2, 2).0, [77, 77, 77]);
    }

    #[test]
    fn gamma_above_one_brightens_midtones() {
        let img = flat(4, 4, 128);
        let out = apply_gamma(&img, 1.2);
        assert!(out.get_pixel(0, 0).0[0] > 128);
        // Endpoints stay fixed.
        assert_eq!(apply_gamma(&flat(2, 2, 0), 1.2).get_pixel(0, 0).0[0], 0);
        assert_eq!(apply_gamma(&flat(2, 2, 255), 1.2).get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn brightness_scale_saturates() {
        let out = scale_brightness(&flat(2, 2, 240), 1.2);
        assert_eq!(out.get_pixel(0, 0).0, [255, 255, 255]);
        let out = scale_brightness(&flat(2, 2, 100), 1.2);
        assert_eq!(out.get_pixel(0, 0).0, [120, 120, 120]);
    }

    #[test]
    fn linear_adjust_matches_formula() {
        // 1.2 * 100 - 25.5 = 94.5 → 95 after rounding
        let out = linear_adjust(&flat(2, 2, 100), 1.2, -0.1);
        assert_eq!(out.get_pixel(0, 0).0[0], 95);
        // Clamps at zero for dark input.
        let out = linear_adjust(&flat(2, 2, 10), 1.2, -0.1);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn median_removes_single_speck() {
        let mut img = flat(5, 5, 100);
        img.put_pixel(2, 2, Rgb([255, 255, 255]));
        let out = median3(&img);
        assert_eq!(out.get_pixel(2, 2).0, [100, 100, 100]);
    }

    #[test]
    fn median_passes_borders_through() {
        let mut img = flat(5, 5, 100);
        img.put_pixel(0, 0, Rgb([200, 200, 200]));
        let out = median3(&img);
        assert_eq!(out.get_pixel(0, 0).0, [200, 200, 200]);
    }

    #[test]
    fn clahe_raises_contrast_of_flat_gradient() {
        // A narrow-range horizontal gradient: CLAHE should widen it.
        let mut gray = GrayImage::new(64, 64);
        for (x, _y, p) in gray.enumerate_pixels_mut() {
            p.0[0] = 110 + (x / 8) as u8; // 110..117
        }
        let before = analyze_quality(&DynamicImage::ImageLuma8(gray.clone()));
        let out = clahe_luma(&gray, 32, 3.0);
        let after = analyze_quality(&DynamicImage::ImageLuma8(out));
        assert!(
            after.contrast > before.contrast,
            "contrast {} -> {}",
            before.contrast,
            after.contrast
        );
    }

    #[test]
    fn clahe_flat_image_does_not_explode() {
        let gray = GrayImage::from_pixel(32, 32, Luma([128]));
        let out = clahe_luma(&gray, 16, 2.0);
        // All pixels map identically; no seams, no panic.
        let first = out.get_pixel(0, 0).0[0];
        assert!(out.pixels().all(|p| p.0[0] == first));
    }

    #[test]
    fn enhance_brightens_a_dark_flat_scan() {
        let img = DynamicImage::ImageRgb8(flat(64, 64, 40));
        let metrics = analyze_quality(&img);
        let out = enhance(&img, &metrics);
        let after = analyze_quality(&DynamicImage::ImageRgb8(out));
        assert!(after.brightness >= metrics.brightness);
    }

    #[test]
    fn enhance_preserves_dimensions_and_encodes() {
        let img = DynamicImage::ImageRgb8(flat(33, 17, 90));
        let metrics = analyze_quality(&img);
        let out = enhance(&img, &metrics);
        assert_eq!((out.width(), out.height()), (33, 17));

        let png = encode_png(&out).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (33, 17));
    }
}
