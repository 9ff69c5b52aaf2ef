//! EXIF-based orientation correction for phone photos.
//!
//! Reads EXIF tag 0x0112 (Orientation) from the raw upload bytes and
//! applies the matching rotation/flip so the analysis sees the image
//! the way the camera did. DICOM frames skip this path entirely.

use std::io::Cursor;

use image::DynamicImage;

/// Correct image orientation based on EXIF metadata.
/// No-op if there is no EXIF data or the orientation is already normal.
pub fn correct_orientation(raw_bytes: &[u8], image: DynamicImage) -> DynamicImage {
    apply_orientation(image, read_exif_orientation(raw_bytes))
}

/// Read the EXIF orientation tag. Returns 1 (normal) when absent.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply an EXIF orientation transform.
///
/// 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        1 => img,
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}
