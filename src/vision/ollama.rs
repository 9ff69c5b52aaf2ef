//! Async Ollama HTTP client.
//!
//! Covers the three endpoints the service uses: `/api/generate` for
//! prose, `/api/chat` with attached images for vision, and `/api/tags`
//! for the health probe. Connection, timeout, and HTTP-status failures
//! map to distinct `VisionError` variants so callers can tell "Ollama
//! is down" apart from "the model rejected the request".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{TextGenerator, VisionError};

/// Ollama HTTP client for local model inference.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        }
    }

    /// Default Ollama instance at localhost:11434 with a 5-minute timeout.
    pub fn default_local() -> Self {
        Self::new("http://localhost:11434", 300)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> VisionError {
        if e.is_connect() {
            VisionError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            VisionError::Timeout(self.timeout_secs)
        } else {
            VisionError::HttpClient(e.to_string())
        }
    }

    /// One-shot generation via `/api/generate`.
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
    ) -> Result<String, VisionError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model,
            prompt,
            system,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VisionError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| VisionError::ResponseParsing(e.to_string()))?;

        Ok(parsed.response)
    }

    /// Vision chat via `/api/chat` with base64-encoded images attached
    /// to the user message (the Ollama convention for vision models).
    pub async fn chat_with_images(
        &self,
        model: &str,
        prompt: &str,
        images: &[String],
        system: Option<&str>,
    ) -> Result<String, VisionError> {
        let url = format!("{}/api/chat", self.base_url);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system.to_string(),
                images: None,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt.to_string(),
            images: Some(images.to_vec()),
        });

        let body = ChatRequest {
            model,
            messages,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VisionError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| VisionError::ResponseParsing(e.to_string()))?;

        Ok(parsed.message.content)
    }

    /// List installed model names via `/api/tags`.
    pub async fn list_models(&self) -> Result<Vec<String>, VisionError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VisionError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TagsResponse = response
            .json()
            .await
            .map_err(|e| VisionError::ResponseParsing(e.to_string()))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    /// Prefix match so `medgemma` finds `medgemma:4b` etc.
    pub async fn is_model_available(&self, model: &str) -> Result<bool, VisionError> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| m.starts_with(model)))
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// `TextGenerator` backed by Ollama with a fixed model name.
pub struct OllamaTextGenerator {
    client: OllamaClient,
    model: String,
}

impl OllamaTextGenerator {
    pub fn new(client: OllamaClient, model: String) -> Self {
        Self { client, model }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for OllamaTextGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, VisionError> {
        self.client.generate(&self.model, prompt, system).await
    }

    async fn is_available(&self) -> bool {
        self.client
            .is_model_available(&self.model)
            .await
            .unwrap_or(false)
    }
}

/// Mock text generator for tests — canned response or forced failure.
pub struct MockTextGenerator {
    response: String,
    fail: bool,
}

impl MockTextGenerator {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            response: String::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, VisionError> {
        if self.fail {
            return Err(VisionError::Connection("mock".into()));
        }
        Ok(self.response.clone())
    }

    async fn is_available(&self) -> bool {
        !self.fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", 60);
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn default_local_uses_standard_port() {
        let client = OllamaClient::default_local();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[tokio::test]
    async fn mock_generator_returns_configured_response() {
        let gen = MockTextGenerator::new("a report");
        assert_eq!(gen.generate("sys", "prompt").await.unwrap(), "a report");
    }

    #[tokio::test]
    async fn mock_generator_failure_is_connection_error() {
        let gen = MockTextGenerator::failing();
        assert!(matches!(
            gen.generate("sys", "prompt").await,
            Err(VisionError::Connection(_))
        ));
    }

    #[test]
    fn chat_request_serializes_images_on_user_message() {
        let body = ChatRequest {
            model: "medgemma",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "sys".into(),
                    images: None,
                },
                ChatMessage {
                    role: "user",
                    content: "look".into(),
                    images: Some(vec!["QUJD".into()]),
                },
            ],
            stream: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json["messages"][0].get("images").is_none());
        assert_eq!(json["messages"][1]["images"][0], "QUJD");
        assert_eq!(json["stream"], false);
    }
}
