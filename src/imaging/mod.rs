//! Image quality scoring and adaptive enhancement.
//!
//! Pure image-to-image transforms: no I/O, no model calls, fully
//! testable. The quality pass is read-only; the enhancement pass is
//! driven by the metrics of the ORIGINAL image so later steps do not
//! react to earlier ones.

pub mod enhance;
pub mod orient;
pub mod quality;

pub use enhance::{enhance, encode_png};
pub use orient::correct_orientation;
pub use quality::{analyze_quality, derive_issues, QualityIssue, QualityMetrics};

use thiserror::Error;

/// Maximum input image size (in bytes) before rejecting.
/// Prevents OOM on corrupt/adversarial files.
pub const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

/// Minimum valid image size in bytes (smallest valid PNG is ~67 bytes).
pub const MIN_IMAGE_BYTES: usize = 67;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("Image data too small to be valid")]
    InputTooSmall,

    #[error("Image data exceeds {}MB limit", MAX_IMAGE_BYTES / (1024 * 1024))]
    InputTooLarge,

    #[error("Unsupported file type; expected JPEG, PNG, GIF, or DICOM")]
    UnsupportedFormat,

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

/// Validate image bytes before decoding.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), ImagingError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(ImagingError::InputTooSmall);
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ImagingError::InputTooLarge);
    }
    Ok(())
}

/// Gate plain-image uploads on their magic bytes. DICOM is detected
/// separately upstream, so only JPEG, PNG, and GIF pass here.
pub fn check_supported_format(bytes: &[u8]) -> Result<(), ImagingError> {
    let supported = bytes.starts_with(&[0xFF, 0xD8, 0xFF])
        || bytes.starts_with(b"\x89PNG\r\n\x1a\n")
        || bytes.starts_with(b"GIF87a")
        || bytes.starts_with(b"GIF89a");
    if supported {
        Ok(())
    } else {
        Err(ImagingError::UnsupportedFormat)
    }
}

/// Decode raw upload bytes into an image, with size validation.
pub fn decode_image(bytes: &[u8]) -> Result<image::DynamicImage, ImagingError> {
    validate_image_bytes(bytes)?;
    image::load_from_memory(bytes).map_err(|e| ImagingError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_input_rejected() {
        assert!(matches!(
            decode_image(&[0x89, 0x50]),
            Err(ImagingError::InputTooSmall)
        ));
    }

    #[test]
    fn garbage_input_is_decode_error() {
        let garbage = [0xDE, 0xAD, 0xBE, 0xEF].repeat(25);
        assert!(matches!(
            decode_image(&garbage),
            Err(ImagingError::Decode(_))
        ));
    }

    #[test]
    fn accepted_formats_pass_the_gate() {
        assert!(check_supported_format(&[0xFF, 0xD8, 0xFF, 0xE0]).is_ok());
        assert!(check_supported_format(b"\x89PNG\r\n\x1a\n....").is_ok());
        assert!(check_supported_format(b"GIF89a......").is_ok());
    }

    #[test]
    fn other_formats_are_rejected() {
        // TIFF (little-endian) and BMP magics.
        assert!(matches!(
            check_supported_format(b"II*\x00rest-of-file"),
            Err(ImagingError::UnsupportedFormat)
        ));
        assert!(matches!(
            check_supported_format(b"BMxxxxxx"),
            Err(ImagingError::UnsupportedFormat)
        ));
    }
}
