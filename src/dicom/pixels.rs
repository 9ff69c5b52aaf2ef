//! Pixel data extraction and window/level rendering.
//!
//! Produces an 8-bit grayscale frame from uncompressed MONOCHROME pixel
//! data. 16-bit samples are mapped through the data set's window
//! center/width when present, otherwise min-max normalized.

use image::GrayImage;

use super::metadata::DicomMetadata;
use super::parse::{DataSet, Tag};
use super::DicomError;

/// Render the first frame of the pixel data as an 8-bit grayscale image.
pub fn extract_frame(ds: &DataSet, meta: &DicomMetadata) -> Result<GrayImage, DicomError> {
    let pixel_data = ds
        .get(Tag::PIXEL_DATA)
        .ok_or(DicomError::MissingPixelData)?;

    let width = meta.columns as u32;
    let height = meta.rows as u32;
    let pixel_count = (width as usize) * (height as usize);
    if pixel_count == 0 {
        return Err(DicomError::UnsupportedPixelFormat("zero-sized frame".into()));
    }

    let bits = meta.bits_allocated.unwrap_or(8);
    let bytes = match bits {
        8 => frame_u8(&pixel_data.value, pixel_count)?,
        16 => frame_u16(&pixel_data.value, pixel_count, meta)?,
        other => {
            return Err(DicomError::UnsupportedPixelFormat(format!(
                "{other} bits allocated"
            )))
        }
    };

    GrayImage::from_raw(width, height, bytes)
        .ok_or_else(|| DicomError::UnsupportedPixelFormat("frame buffer mismatch".into()))
}

fn frame_u8(value: &[u8], pixel_count: usize) -> Result<Vec<u8>, DicomError> {
    if value.len() < pixel_count {
        return Err(DicomError::Truncated(format!(
            "pixel data holds {} bytes, frame needs {pixel_count}",
            value.len()
        )));
    }
    Ok(value[..pixel_count].to_vec())
}

fn frame_u16(
    value: &[u8],
    pixel_count: usize,
    meta: &DicomMetadata,
) -> Result<Vec<u8>, DicomError> {
    if value.len() < pixel_count * 2 {
        return Err(DicomError::Truncated(format!(
            "pixel data holds {} bytes, frame needs {}",
            value.len(),
            pixel_count * 2
        )));
    }

    let samples: Vec<u16> = value[..pixel_count * 2]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    let mapped = match (meta.window_center, meta.window_width) {
        (Some(center), Some(width)) if width >= 1.0 => window_level(&samples, center, width),
        _ => min_max_normalize(&samples),
    };

    Ok(mapped)
}

/// DICOM linear VOI transform (PS3.3 C.11.2.1.2).
fn window_level(samples: &[u16], center: f32, width: f32) -> Vec<u8> {
    let lower = center - 0.5 - (width - 1.0) / 2.0;
    let range = (width - 1.0).max(1.0);
    samples
        .iter()
        .map(|&v| {
            let t = ((v as f32 - lower) / range).clamp(0.0, 1.0);
            (t * 255.0).round() as u8
        })
        .collect()
}

fn min_max_normalize(samples: &[u16]) -> Vec<u8> {
    let min = samples.iter().copied().min().unwrap_or(0);
    let max = samples.iter().copied().max().unwrap_or(0);
    if max == min {
        return vec![0u8; samples.len()];
    }
    let range = (max - min) as f32;
    samples
        .iter()
        .map(|&v| (((v - min) as f32 / range) * 255.0).round() as u8)
        .collect()
}
