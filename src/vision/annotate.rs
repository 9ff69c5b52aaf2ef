//! Vision-model text and label detection.
//!
//! Sends the enhanced frame to an Ollama vision model and asks for two
//! things in one pass: a transcription of any visible text (markers,
//! annotations, burned-in overlays) and a short list of content labels.
//! The model closes its answer with a `LABELS:` line that we parse out.

use async_trait::async_trait;
use base64::Engine;

use super::{ImageAnnotations, OllamaClient, VisionAnnotator, VisionError};

const SYSTEM_PROMPT: &str = "You are an assistant that inspects medical images. \
You transcribe visible text exactly as written and identify what the image shows. \
You never guess at a diagnosis.";

const USER_PROMPT: &str = "Look at this image carefully.\n\n\
1. Transcribe ALL visible text: side markers (L/R), patient annotations, \
technique overlays, timestamps, device labels. If there is no text, write nothing.\n\
2. On the final line, write LABELS: followed by 3-8 short content labels \
separated by semicolons (e.g. LABELS: chest x-ray; ribs; radiograph).\n\n\
Output only the transcription and the LABELS line.";

/// `VisionAnnotator` backed by an Ollama vision model.
pub struct OllamaVisionAnnotator {
    client: OllamaClient,
    model: String,
}

impl OllamaVisionAnnotator {
    pub fn new(client: OllamaClient, model: String) -> Self {
        Self { client, model }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl VisionAnnotator for OllamaVisionAnnotator {
    async fn annotate(&self, png_bytes: &[u8]) -> Result<ImageAnnotations, VisionError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png_bytes);

        let raw = self
            .client
            .chat_with_images(&self.model, USER_PROMPT, &[encoded], Some(SYSTEM_PROMPT))
            .await?;

        let (text, labels) = split_response(&raw);
        let confidence = annotation_confidence(&text, &labels);

        Ok(ImageAnnotations {
            text,
            labels,
            confidence,
        })
    }

    async fn is_available(&self) -> bool {
        self.client
            .is_model_available(&self.model)
            .await
            .unwrap_or(false)
    }
}

/// Split the model output into transcribed text and the LABELS line.
fn split_response(raw: &str) -> (String, Vec<String>) {
    let mut text_lines = Vec::new();
    let mut labels = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(rest) = strip_labels_prefix(trimmed) {
            labels = parse_labels(rest);
        } else {
            text_lines.push(line);
        }
    }

    (text_lines.join("\n").trim().to_string(), labels)
}

fn strip_labels_prefix(line: &str) -> Option<&str> {
    let upper = line.to_uppercase();
    if upper.starts_with("LABELS:") {
        Some(line["LABELS:".len()..].trim())
    } else {
        None
    }
}

/// Semicolon-separated labels, trimmed, empties dropped, capped at 8.
fn parse_labels(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(|s| s.trim().trim_end_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .take(8)
        .collect()
}

/// Length-tiered confidence with bonuses for structure.
///
/// Long transcriptions indicate a legible capture; a populated label
/// list means the model recognized the content. Capped below 1.0 since
/// this is a heuristic, not a calibrated probability.
fn annotation_confidence(text: &str, labels: &[String]) -> f32 {
    let len = text.len();
    let mut confidence: f32 = if len == 0 {
        0.2
    } else if len < 20 {
        0.4
    } else if len < 100 {
        0.6
    } else {
        0.8
    };

    if !labels.is_empty() {
        confidence += 0.1;
    }
    if text.lines().count() > 1 {
        confidence += 0.05;
    }

    confidence.min(0.95)
}

/// Mock annotator for tests — returns canned annotations or a forced error.
pub struct MockVisionAnnotator {
    annotations: ImageAnnotations,
    fail: bool,
}

impl MockVisionAnnotator {
    pub fn new(text: &str, labels: &[&str]) -> Self {
        Self {
            annotations: ImageAnnotations {
                text: text.to_string(),
                labels: labels.iter().map(|s| s.to_string()).collect(),
                confidence: 0.8,
            },
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            annotations: ImageAnnotations {
                text: String::new(),
                labels: Vec::new(),
                confidence: 0.0,
            },
            fail: true,
        }
    }
}

#[async_trait]
impl VisionAnnotator for MockVisionAnnotator {
    async fn annotate(&self, _png_bytes: &[u8]) -> Result<ImageAnnotations, VisionError> {
        if self.fail {
            return Err(VisionError::Connection("mock".into()));
        }
        Ok(self.annotations.clone())
    }

    async fn is_available(&self) -> bool {
        !self.fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_text_and_labels() {
        let raw = "R marker, upper left\nAP VIEW\nLABELS: chest x-ray; ribs; radiograph";
        let (text, labels) = split_response(raw);
        assert_eq!(text, "R marker, upper left\nAP VIEW");
        assert_eq!(labels, vec!["chest x-ray", "ribs", "radiograph"]);
    }

    #[test]
    fn labels_line_is_case_insensitive() {
        let (_, labels) = split_response("Labels: bone; joint");
        assert_eq!(labels, vec!["bone", "joint"]);
    }

    #[test]
    fn no_labels_line_yields_empty_labels() {
        let (text, labels) = split_response("just text\nmore text");
        assert_eq!(text, "just text\nmore text");
        assert!(labels.is_empty());
    }

    #[test]
    fn parse_labels_trims_and_caps() {
        let labels = parse_labels(" A ; b.;  ; C; d; e; f; g; h; i; j");
        assert_eq!(labels.len(), 8);
        assert_eq!(labels[0], "a");
        assert_eq!(labels[1], "b");
    }

    #[test]
    fn confidence_tiers() {
        assert_eq!(annotation_confidence("", &[]), 0.2);
        assert_eq!(annotation_confidence("short", &[]), 0.4);
        let medium = "x".repeat(50);
        assert_eq!(annotation_confidence(&medium, &[]), 0.6);
        let long = "x".repeat(200);
        assert_eq!(annotation_confidence(&long, &[]), 0.8);
    }

    #[test]
    fn confidence_bonuses_and_cap() {
        let long = format!("{}\n{}", "x".repeat(100), "y".repeat(100));
        let labels = vec!["chest x-ray".to_string()];
        // 0.8 base + 0.1 labels + 0.05 multiline, capped at 0.95.
        assert!((annotation_confidence(&long, &labels) - 0.95).abs() < 1e-6);
    }

    #[tokio::test]
    async fn mock_annotator_round_trip() {
        let mock = MockVisionAnnotator::new("R marker", &["radiograph"]);
        let out = mock.annotate(b"png").await.unwrap();
        assert_eq!(out.text, "R marker");
        assert_eq!(out.labels, vec!["radiograph"]);
    }

    #[tokio::test]
    async fn mock_annotator_failure() {
        let mock = MockVisionAnnotator::failing();
        assert!(mock.annotate(b"png").await.is_err());
    }
}
