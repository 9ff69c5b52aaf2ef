//! Narrative report generation.
//!
//! Assembles everything the pipeline learned about an upload — DICOM
//! metadata, quality metrics and issues, detected text and labels —
//! into a structured prompt and asks the text model for a patient-facing
//! narrative. The model is framed as assistive, never diagnostic, and
//! every report ends with the same disclaimer. If the model is
//! unreachable the caller gets a fixed fallback paragraph instead of an
//! error so the analysis response still succeeds.

use tracing::warn;

use crate::dicom::DicomMetadata;
use crate::imaging::{QualityIssue, QualityMetrics};
use crate::vision::{ImageAnnotations, TextGenerator};

pub const REPORT_SYSTEM_PROMPT: &str = r#"You are a medical imaging assistant. You describe what an automated analysis found in an uploaded medical image. You are NOT a radiologist and you do NOT diagnose.

ABSOLUTE RULES — NO EXCEPTIONS:
1. Describe only what the provided analysis data supports.
2. NEVER diagnose, stage, or rule out any condition.
3. NEVER recommend treatments or medications.
4. If image quality issues are listed, explain how they may affect interpretation.
5. If text was detected in the image, summarize what it says.
6. Use plain language a patient can follow. Explain technical terms.
7. Keep the report to 3-5 short paragraphs.
8. Close by reminding the reader that a qualified clinician must review the image."#;

pub const REPORT_DISCLAIMER: &str = "This automated summary is for informational \
purposes only and is not a medical diagnosis. A qualified healthcare professional \
must review the original images.";

/// Fixed text returned when the model cannot produce a report.
pub const FALLBACK_REPORT: &str = "An automated narrative could not be generated \
for this image because the analysis model was unavailable. The quality metrics, \
detected text, and content labels above were still computed and are reliable. \
Please retry later for a narrative summary, and consult a qualified healthcare \
professional for any interpretation of the image itself.";

/// Everything the report prompt is built from.
pub struct ReportInput<'a> {
    pub metadata: Option<&'a DicomMetadata>,
    pub metrics: &'a QualityMetrics,
    pub issues: &'a [QualityIssue],
    pub annotations: &'a ImageAnnotations,
}

/// Build the structured analysis prompt for the text model.
pub fn build_report_prompt(input: &ReportInput<'_>) -> String {
    let mut prompt = String::new();

    if let Some(meta) = input.metadata {
        prompt.push_str("<DICOM_METADATA>\n");
        if let Some(modality) = &meta.modality {
            prompt.push_str(&format!("Modality: {modality}\n"));
        }
        if let Some(study_date) = &meta.study_date {
            prompt.push_str(&format!("Study date: {study_date}\n"));
        }
        if let Some(manufacturer) = &meta.manufacturer {
            prompt.push_str(&format!("Equipment: {manufacturer}\n"));
        }
        prompt.push_str(&format!(
            "Dimensions: {}x{} pixels\n",
            meta.columns, meta.rows
        ));
        prompt.push_str("</DICOM_METADATA>\n\n");
    }

    prompt.push_str("<QUALITY_METRICS>\n");
    prompt.push_str(&format!(
        "Brightness: {:.2}\nContrast: {:.2}\nSharpness: {:.1}\nNoise: {:.1}\n",
        input.metrics.brightness, input.metrics.contrast, input.metrics.sharpness, input.metrics.noise
    ));
    prompt.push_str("</QUALITY_METRICS>\n\n");

    if !input.issues.is_empty() {
        prompt.push_str("<QUALITY_ISSUES>\n");
        for issue in input.issues {
            prompt.push_str(&format!("- {}\n", issue.label()));
        }
        prompt.push_str("</QUALITY_ISSUES>\n\n");
    }

    if !input.annotations.text.is_empty() {
        prompt.push_str("<DETECTED_TEXT>\n");
        prompt.push_str(&input.annotations.text);
        prompt.push_str("\n</DETECTED_TEXT>\n\n");
    }

    if !input.annotations.labels.is_empty() {
        prompt.push_str("<CONTENT_LABELS>\n");
        prompt.push_str(&input.annotations.labels.join("; "));
        prompt.push_str("\n</CONTENT_LABELS>\n\n");
    }

    prompt.push_str(
        "Write the narrative report based ONLY on the analysis data above.",
    );

    prompt
}

/// Generate the narrative report, falling back to fixed text on failure.
///
/// The disclaimer is appended server-side so a model that forgets rule 8
/// still ships it.
pub async fn generate_report(
    generator: &dyn TextGenerator,
    input: &ReportInput<'_>,
) -> String {
    let prompt = build_report_prompt(input);

    let body = match generator.generate(REPORT_SYSTEM_PROMPT, &prompt).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!(error = %e, "Report generation failed, using fallback text");
            FALLBACK_REPORT.to_string()
        }
    };

    format!("{body}\n\n{REPORT_DISCLAIMER}")
}
