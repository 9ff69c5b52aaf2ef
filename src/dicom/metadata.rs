//! Study and image metadata pulled from a parsed data set.

use serde::{Deserialize, Serialize};

use super::parse::{DataSet, Tag};

/// Default frame dimension when Rows/Columns are absent.
const DEFAULT_DIMENSION: u16 = 512;

/// Metadata surfaced in the analysis response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DicomMetadata {
    pub patient_name: Option<String>,
    pub patient_id: Option<String>,
    pub study_date: Option<String>,
    pub modality: Option<String>,
    pub manufacturer: Option<String>,
    pub rows: u16,
    pub columns: u16,
    pub bits_allocated: Option<u16>,
    pub bits_stored: Option<u16>,
    pub window_center: Option<f32>,
    pub window_width: Option<f32>,
}

/// Read the tags the pipeline cares about. Absent tags stay `None`,
/// except Rows/Columns which fall back to 512.
pub fn extract_metadata(ds: &DataSet) -> DicomMetadata {
    DicomMetadata {
        patient_name: ds.string(Tag::PATIENT_NAME),
        patient_id: ds.string(Tag::PATIENT_ID),
        study_date: ds.string(Tag::STUDY_DATE),
        modality: ds.string(Tag::MODALITY),
        manufacturer: ds.string(Tag::MANUFACTURER),
        rows: ds.ushort(Tag::ROWS).unwrap_or(DEFAULT_DIMENSION),
        columns: ds.ushort(Tag::COLUMNS).unwrap_or(DEFAULT_DIMENSION),
        bits_allocated: ds.ushort(Tag::BITS_ALLOCATED),
        bits_stored: ds.ushort(Tag::BITS_STORED),
        window_center: ds.decimal(Tag::WINDOW_CENTER),
        window_width: ds.decimal(Tag::WINDOW_WIDTH),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicom::parse::test_support::{file_header, put_short};
    use crate::dicom::parse_data_set;

    #[test]
    fn extracts_study_fields() {
        let mut buf = file_header();
        put_short(&mut buf, Tag::PATIENT_NAME, b"PN", b"DOE^JANE");
        put_short(&mut buf, Tag::PATIENT_ID, b"LO", b"P-0042");
        put_short(&mut buf, Tag::STUDY_DATE, b"DA", b"20240115");
        put_short(&mut buf, Tag::MODALITY, b"CS", b"CR");
        put_short(&mut buf, Tag::MANUFACTURER, b"LO", b"ACME IMAGING");
        put_short(&mut buf, Tag::ROWS, b"US", &64u16.to_le_bytes());
        put_short(&mut buf, Tag::COLUMNS, b"US", &32u16.to_le_bytes());
        put_short(&mut buf, Tag::BITS_ALLOCATED, b"US", &16u16.to_le_bytes());
        put_short(&mut buf, Tag::BITS_STORED, b"US", &12u16.to_le_bytes());
        put_short(&mut buf, Tag::WINDOW_CENTER, b"DS", b"2048");
        put_short(&mut buf, Tag::WINDOW_WIDTH, b"DS", b"4096");

        let ds = parse_data_set(&buf).unwrap();
        let meta = extract_metadata(&ds);

        assert_eq!(meta.patient_name.as_deref(), Some("DOE^JANE"));
        assert_eq!(meta.patient_id.as_deref(), Some("P-0042"));
        assert_eq!(meta.study_date.as_deref(), Some("20240115"));
        assert_eq!(meta.modality.as_deref(), Some("CR"));
        assert_eq!(meta.manufacturer.as_deref(), Some("ACME IMAGING"));
        assert_eq!(meta.rows, 64);
        assert_eq!(meta.columns, 32);
        assert_eq!(meta.bits_allocated, Some(16));
        assert_eq!(meta.bits_stored, Some(12));
        assert_eq!(meta.window_center, Some(2048.0));
        assert_eq!(meta.window_width, Some(4096.0));
    }

    #[test]
    fn missing_dimensions_default_to_512() {
        let mut buf = file_header();
        put_short(&mut buf, Tag::MODALITY, b"CS", b"MR");
        let ds = parse_data_set(&buf).unwrap();
        let meta = extract_metadata(&ds);
        assert_eq!(meta.rows, 512);
        assert_eq!(meta.columns, 512);
        assert!(meta.patient_name.is_none());
    }
}
