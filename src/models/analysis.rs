use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::UploadKind;
use crate::imaging::QualityMetrics;

/// One completed image analysis, persisted so follow-up chat can
/// ground its answers in what the pipeline actually found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub created_at: NaiveDateTime,
    pub upload_kind: UploadKind,
    pub metrics: QualityMetrics,
    /// Issue labels as shown to the user.
    pub issues: Vec<String>,
    pub detected_text: String,
    pub labels: Vec<String>,
    pub confidence: f32,
    pub report: String,
    /// Serialized DICOM metadata, present for DICOM uploads.
    pub metadata_json: Option<String>,
}

impl AnalysisRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        upload_kind: UploadKind,
        metrics: QualityMetrics,
        issues: Vec<String>,
        detected_text: String,
        labels: Vec<String>,
        confidence: f32,
        report: String,
        metadata_json: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: chrono::Local::now().naive_local(),
            upload_kind,
            metrics,
            issues,
            detected_text,
            labels,
            confidence,
            report,
            metadata_json,
        }
    }
}
