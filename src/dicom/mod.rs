//! Minimal DICOM reader for single-frame medical images.
//!
//! Supports explicit-VR little-endian data sets: preamble + DICM magic,
//! a linear element walk, and typed accessors for the handful of tags
//! the analysis pipeline needs. Encapsulated (compressed) pixel data and
//! implicit-VR transfer syntaxes are rejected as unsupported.

pub mod metadata;
pub mod parse;
pub mod pixels;

pub use metadata::{extract_metadata, DicomMetadata};
pub use parse::{is_dicom, parse_data_set, DataSet, Element, Tag};
pub use pixels::extract_frame;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DicomError {
    #[error("DICOM file too small")]
    TooSmall,

    #[error("Missing DICM magic after preamble")]
    MissingMagic,

    #[error("DICOM truncated: {0}")]
    Truncated(String),

    #[error("Invalid first tag (0x0000,0x0000)")]
    InvalidFirstTag,

    #[error("Unsupported transfer syntax (implicit VR or corrupt element at offset {0})")]
    UnsupportedTransferSyntax(usize),

    #[error("No pixel data found in DICOM file")]
    MissingPixelData,

    #[error("Unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),
}
