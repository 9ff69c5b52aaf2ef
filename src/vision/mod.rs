//! Model-backed image understanding.
//!
//! Everything the analysis pipeline needs from a generative model sits
//! behind two seams: `VisionAnnotator` (image → detected text + labels)
//! and `TextGenerator` (prompt → prose). The production implementations
//! talk to a local Ollama instance; tests swap in mocks.

pub mod annotate;
pub mod ollama;

pub use annotate::{MockVisionAnnotator, OllamaVisionAnnotator};
pub use ollama::{MockTextGenerator, OllamaClient, OllamaTextGenerator};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Cannot reach model server at {0}")]
    Connection(String),

    #[error("Model request timed out after {0}s")]
    Timeout(u64),

    #[error("Model server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("No vision model available")]
    NoModel,
}

/// Text and labels detected in an image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageAnnotations {
    /// Visible text transcribed from the image (may be empty).
    pub text: String,
    /// Content labels, most salient first.
    pub labels: Vec<String>,
    /// Heuristic confidence in the annotation quality, 0..0.95.
    pub confidence: f32,
}

/// Detects text and content labels in an image.
#[async_trait]
pub trait VisionAnnotator: Send + Sync {
    async fn annotate(&self, png_bytes: &[u8]) -> Result<ImageAnnotations, VisionError>;

    /// Whether the backing model can be reached right now.
    async fn is_available(&self) -> bool {
        true
    }
}

/// Generates prose from a system prompt plus user prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, VisionError>;

    /// Whether the backing model can be reached right now.
    async fn is_available(&self) -> bool {
        true
    }
}
