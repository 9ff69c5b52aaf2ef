//! Explicit-VR little-endian data set walker.

use super::DicomError;

/// DICOM tag as (group, element).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag(pub u16, pub u16);

impl Tag {
    pub const PATIENT_NAME: Tag = Tag(0x0010, 0x0010);
    pub const PATIENT_ID: Tag = Tag(0x0010, 0x0020);
    pub const STUDY_DATE: Tag = Tag(0x0008, 0x0020);
    pub const MODALITY: Tag = Tag(0x0008, 0x0060);
    pub const MANUFACTURER: Tag = Tag(0x0008, 0x0070);
    pub const ROWS: Tag = Tag(0x0028, 0x0010);
    pub const COLUMNS: Tag = Tag(0x0028, 0x0011);
    pub const BITS_ALLOCATED: Tag = Tag(0x0028, 0x0100);
    pub const BITS_STORED: Tag = Tag(0x0028, 0x0101);
    pub const WINDOW_CENTER: Tag = Tag(0x0028, 0x1050);
    pub const WINDOW_WIDTH: Tag = Tag(0x0028, 0x1051);
    pub const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);
}

/// One parsed data element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: Tag,
    pub vr: [u8; 2],
    pub value: Vec<u8>,
}

/// Parsed data set with typed tag accessors.
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    elements: Vec<Element>,
}

impl DataSet {
    pub fn get(&self, tag: Tag) -> Option<&Element> {
        self.elements.iter().find(|e| e.tag == tag)
    }

    /// String value, trimmed of trailing padding (space or NUL).
    pub fn string(&self, tag: Tag) -> Option<String> {
        let el = self.get(tag)?;
        let s = String::from_utf8_lossy(&el.value);
        let trimmed = s.trim_end_matches(['\0', ' ']).trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Unsigned short (US) value, little-endian.
    pub fn ushort(&self, tag: Tag) -> Option<u16> {
        let el = self.get(tag)?;
        if el.value.len() < 2 {
            return None;
        }
        Some(u16::from_le_bytes([el.value[0], el.value[1]]))
    }

    /// Decimal string (DS) value. Multi-valued fields use the first component.
    pub fn decimal(&self, tag: Tag) -> Option<f32> {
        let s = self.string(tag)?;
        let first = s.split('\\').next()?.trim();
        first.parse::<f32>().ok()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Check for the 128-byte preamble followed by the DICM magic.
pub fn is_dicom(bytes: &[u8]) -> bool {
    bytes.len() >= 132 && &bytes[128..132] == b"DICM"
}

/// VRs that carry 2 reserved bytes and a 4-byte length field.
fn has_long_length(vr: &[u8; 2]) -> bool {
    matches!(
        vr,
        b"OB" | b"OD" | b"OF" | b"OL" | b"OW" | b"SQ" | b"UC" | b"UN" | b"UR" | b"UT"
    )
}

/// Walk an explicit-VR little-endian data set.
///
/// Stops cleanly when the remaining bytes cannot hold another element
/// header; a syntactically broken element mid-file is an error rather
/// than silent truncation, so corrupt uploads fail loudly.
pub fn parse_data_set(bytes: &[u8]) -> Result<DataSet, DicomError> {
    if bytes.len() < 132 {
        return Err(DicomError::TooSmall);
    }
    if !is_dicom(bytes) {
        return Err(DicomError::MissingMagic);
    }
    if bytes.len() < 140 {
        return Err(DicomError::Truncated("no elements after preamble".into()));
    }

    let mut elements = Vec::new();
    let mut pos = 132usize;

    while pos + 8 <= bytes.len() {
        let group = u16::from_le_bytes([bytes[pos], bytes[pos + 1]]);
        let element = u16::from_le_bytes([bytes[pos + 2], bytes[pos + 3]]);

        if group == 0 && element == 0 && pos == 132 {
            return Err(DicomError::InvalidFirstTag);
        }

        let vr = [bytes[pos + 4], bytes[pos + 5]];
        if !(vr[0].is_ascii_uppercase() && vr[1].is_ascii_uppercase()) {
            if pos == 132 {
                // First element already malformed: likely implicit VR.
                return Err(DicomError::UnsupportedTransferSyntax(pos));
            }
            // Trailing garbage after the last well-formed element.
            break;
        }

        let (value_length, header_len) = if has_long_length(&vr) {
            if pos + 12 > bytes.len() {
                break;
            }
            let len = u32::from_le_bytes([
                bytes[pos + 8],
                bytes[pos + 9],
                bytes[pos + 10],
                bytes[pos + 11],
            ]);
            if len == 0xFFFF_FFFF {
                // Undefined length marks encapsulated (compressed) content.
                return Err(DicomError::UnsupportedPixelFormat(
                    "encapsulated pixel data".into(),
                ));
            }
            (len as usize, 12usize)
        } else {
            let len = u16::from_le_bytes([bytes[pos + 6], bytes[pos + 7]]) as usize;
            (len, 8usize)
        };

        let value_start = pos + header_len;
        let value_end = value_start
            .checked_add(value_length)
            .ok_or_else(|| DicomError::Truncated("element length overflow".into()))?;
        if value_end > bytes.len() {
            return Err(DicomError::Truncated(format!(
                "element ({group:04X},{element:04X}) runs past end of file"
            )));
        }

        elements.push(Element {
            tag: Tag(group, element),
            vr,
            value: bytes[value_start..value_end].to_vec(),
        });

        pos = value_end;
    }

    Ok(DataSet { elements })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Build a short-length explicit-VR element.
    pub fn put_short(buf: &mut Vec<u8>, tag: Tag, vr: &[u8; 2], value: &[u8]) {
        buf.extend_from_slice(&tag.0.to_le_bytes());
        buf.extend_from_slice(&tag.1.to_le_bytes());
        buf.extend_from_slice(vr);
        buf.extend_from_slice(&(value.len() as u16).to_le_bytes());
        buf.extend_from_slice(value);
    }

    /// Build a long-length explicit-VR element (OB/OW style).
    pub fn put_long(buf: &mut Vec<u8>, tag: Tag, vr: &[u8; 2], value: &[u8]) {
        buf.extend_from_slice(&tag.0.to_le_bytes());
        buf.extend_from_slice(&tag.1.to_le_bytes());
        buf.extend_from_slice(vr);
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        buf.extend_from_slice(value);
    }

    /// Minimal file: preamble + magic, caller appends elements.
    pub fn file_header() -> Vec<u8> {
        let mut buf = vec![0u8; 128];
        buf.extend_from_slice(b"DICM");
        buf
    }
}
