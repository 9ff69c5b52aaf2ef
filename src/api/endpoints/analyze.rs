//! POST /api/analyze-image
//!
//! The full pipeline for one upload: decode (image or DICOM frame),
//! score quality, enhance, detect text and labels, generate the
//! narrative report, and persist the result with a fresh conversation
//! for follow-up questions.

use std::time::Instant;

use axum::extract::{Multipart, State};
use axum::Json;
use base64::Engine;
use image::DynamicImage;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::types::ApiContext;
use crate::api::ApiError;
use crate::chat::ConversationManager;
use crate::db::repository;
use crate::dicom;
use crate::imaging;
use crate::imaging::{QualityIssue, QualityMetrics};
use crate::models::{AnalysisRecord, UploadKind};
use crate::report::{generate_report, ReportInput};
use crate::vision::ImageAnnotations;

#[derive(Serialize)]
pub struct AnalyzeResponse {
    pub analysis_id: Uuid,
    pub conversation_id: Uuid,
    /// Enhanced frame as base64-encoded PNG.
    pub enhanced_image: String,
    pub original_quality: QualityMetrics,
    pub quality_issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub annotations: ImageAnnotations,
    pub dicom_metadata: Option<dicom::DicomMetadata>,
    pub report: String,
}

pub async fn analyze(
    State(ctx): State<ApiContext>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let started = Instant::now();

    let upload = read_image_field(&mut multipart).await?;
    imaging::validate_image_bytes(&upload.bytes)?;

    // Decode. DICOM uploads go through the frame extractor; everything
    // else is a regular image that may carry an EXIF orientation.
    let (image, metadata, upload_kind) = if looks_like_dicom(&upload) {
        let ds = dicom::parse_data_set(&upload.bytes)?;
        let meta = dicom::extract_metadata(&ds);
        let frame = dicom::extract_frame(&ds, &meta)?;
        (
            DynamicImage::ImageLuma8(frame),
            Some(meta),
            UploadKind::Dicom,
        )
    } else {
        imaging::check_supported_format(&upload.bytes)?;
        let decoded = imaging::decode_image(&upload.bytes)?;
        let oriented = imaging::correct_orientation(&upload.bytes, decoded);
        (oriented, None, UploadKind::Image)
    };

    let metrics = imaging::analyze_quality(&image);
    let issues = imaging::derive_issues(&metrics);

    let enhanced = imaging::enhance(&image, &metrics);
    let png_bytes = match imaging::encode_png(&enhanced) {
        Ok(bytes) => bytes,
        Err(e) => {
            // Ship the unenhanced frame rather than failing the analysis.
            warn!(error = %e, "Enhanced frame encoding failed, falling back to original");
            imaging::encode_png(&image.to_rgb8())?
        }
    };

    let annotations = match ctx.annotator.annotate(&png_bytes).await {
        Ok(a) => a,
        Err(e) => {
            warn!(error = %e, "Vision annotation failed, continuing without text detection");
            ImageAnnotations {
                text: String::new(),
                labels: Vec::new(),
                confidence: 0.0,
            }
        }
    };

    let report = generate_report(
        ctx.generator.as_ref(),
        &ReportInput {
            metadata: metadata.as_ref(),
            metrics: &metrics,
            issues: &issues,
            annotations: &annotations,
        },
    )
    .await;

    let issue_labels: Vec<String> = issues.iter().map(|i| i.label().to_string()).collect();
    let recommendations: Vec<String> = issues
        .iter()
        .map(QualityIssue::recommendation)
        .map(str::to_string)
        .collect();

    let metadata_json = metadata
        .as_ref()
        .and_then(|m| serde_json::to_string(m).ok());

    let record = AnalysisRecord::new(
        upload_kind,
        metrics,
        issue_labels.clone(),
        annotations.text.clone(),
        annotations.labels.clone(),
        annotations.confidence,
        report.clone(),
        metadata_json,
    );

    let conversation_id = {
        let conn = ctx.lock_db()?;
        repository::insert_analysis(&conn, &record)?;
        let title = conversation_title(&upload, metadata.as_ref());
        ConversationManager::new(&conn).start(Some(record.id), title.as_deref())?
    };

    info!(
        analysis_id = %record.id,
        kind = upload_kind.as_str(),
        issues = issue_labels.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Image analysis complete"
    );

    Ok(Json(AnalyzeResponse {
        analysis_id: record.id,
        conversation_id,
        enhanced_image: base64::engine::general_purpose::STANDARD.encode(&png_bytes),
        original_quality: metrics,
        quality_issues: issue_labels,
        recommendations,
        annotations,
        dicom_metadata: metadata,
        report,
    }))
}

struct Upload {
    bytes: Vec<u8>,
    filename: Option<String>,
    content_type: Option<String>,
}

/// Pull the image field out of the multipart body. Accepts `image` or
/// `file` as the field name.
async fn read_image_field(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default();
        if name != "image" && name != "file" {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?
            .to_vec();

        return Ok(Upload {
            bytes,
            filename,
            content_type,
        });
    }

    Err(ApiError::BadRequest(
        "Missing multipart field 'image'".into(),
    ))
}

fn looks_like_dicom(upload: &Upload) -> bool {
    if dicom::is_dicom(&upload.bytes) {
        return true;
    }
    if let Some(ct) = &upload.content_type {
        if ct == "application/dicom" {
            return true;
        }
    }
    if let Some(name) = &upload.filename {
        let lower = name.to_lowercase();
        if lower.ends_with(".dcm") || lower.ends_with(".dicom") {
            return true;
        }
    }
    false
}

fn conversation_title(
    upload: &Upload,
    metadata: Option<&dicom::DicomMetadata>,
) -> Option<String> {
    if let Some(meta) = metadata {
        if let Some(modality) = &meta.modality {
            return Some(format!("{modality} analysis"));
        }
    }
    upload.filename.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(bytes: &[u8], filename: Option<&str>, content_type: Option<&str>) -> Upload {
        Upload {
            bytes: bytes.to_vec(),
            filename: filename.map(str::to_string),
            content_type: content_type.map(str::to_string),
        }
    }

    #[test]
    fn dicom_detection_by_magic() {
        let mut buf = vec![0u8; 128];
        buf.extend_from_slice(b"DICM");
        assert!(looks_like_dicom(&upload(&buf, None, None)));
    }

    #[test]
    fn dicom_detection_by_extension_and_content_type() {
        assert!(looks_like_dicom(&upload(b"xx", Some("scan.DCM"), None)));
        assert!(looks_like_dicom(&upload(b"xx", None, Some("application/dicom"))));
        assert!(!looks_like_dicom(&upload(b"xx", Some("photo.jpg"), Some("image/jpeg"))));
    }

    #[test]
    fn title_prefers_modality() {
        let meta = dicom::DicomMetadata {
            modality: Some("CR".into()),
            ..Default::default()
        };
        let u = upload(b"", Some("scan.dcm"), None);
        assert_eq!(conversation_title(&u, Some(&meta)).as_deref(), Some("CR analysis"));
        assert_eq!(conversation_title(&u, None).as_deref(), Some("scan.dcm"));
    }
}
