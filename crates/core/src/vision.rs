use crate::protocol::ImagePayload;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Prompt sent alongside every image shared during a session.
pub const ARTWORK_ANALYSIS_PROMPT: &str = "Analyze this artwork. Describe the style, techniques used, possible period, and artistic elements you observe.";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("request to model failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("model blocked the request: {0}")]
    Blocked(String),
    #[error("model returned no text")]
    Empty,
}

/// Which capability failed, for picking the apology shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisKind {
    Text,
    Image,
}

impl ModelError {
    /// Generic text shown to the user in place of a model reply.
    pub fn user_message(&self, kind: AnalysisKind) -> &'static str {
        let refused = matches!(self, ModelError::Blocked(_) | ModelError::Empty);
        match (kind, refused) {
            (AnalysisKind::Text, true) => {
                "Sorry, I couldn't process that request due to content restrictions."
            }
            (AnalysisKind::Text, false) => {
                "Sorry, there was an error communicating with the analysis service."
            }
            (AnalysisKind::Image, true) => {
                "Sorry, I couldn't analyze the image due to content restrictions or other issues."
            }
            (AnalysisKind::Image, false) => {
                "Sorry, there was an error communicating with the image analysis service."
            }
        }
    }
}

/// Text generation and image understanding. Implemented over HTTP by
/// [`GeminiClient`] and mocked in tests.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait VisionModel: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String, ModelError>;

    async fn analyze_image(&self, image: &ImagePayload, prompt: &str)
    -> Result<String, ModelError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String, ModelError> {
        let candidate = self.candidates.into_iter().next();
        let text: String = candidate
            .as_ref()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect()
            })
            .unwrap_or_default();
        if !text.trim().is_empty() {
            return Ok(text);
        }

        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ModelError::Blocked(reason));
        }
        match candidate.and_then(|c| c.finish_reason) {
            Some(reason) if reason == "SAFETY" || reason == "PROHIBITED_CONTENT" => {
                Err(ModelError::Blocked(reason))
            }
            _ => Err(ModelError::Empty),
        }
    }
}

pub struct GeminiClient {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, parts: Vec<Part<'_>>) -> Result<String, ModelError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateRequest {
            contents: vec![Content { parts }],
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status { status, body });
        }

        let response: GenerateResponse = response.json().await?;
        response.into_text()
    }
}

#[async_trait]
impl VisionModel for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> Result<String, ModelError> {
        tracing::debug!(model = %self.model, "generating text for {} byte prompt", prompt.len());
        self.generate(vec![Part::Text { text: prompt }]).await
    }

    async fn analyze_image(
        &self,
        image: &ImagePayload,
        prompt: &str,
    ) -> Result<String, ModelError> {
        tracing::debug!(
            model = %self.model,
            mime_type = image.mime_type(),
            "analyzing {} byte image",
            image.data().len()
        );
        self.generate(vec![
            Part::Text { text: prompt },
            Part::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type(),
                    data: image.to_base64(),
                },
            },
        ])
        .await
    }
}
