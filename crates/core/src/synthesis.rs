use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_VOICE_ID: &str = "1SM7GgM6IMuvQlz2BwM3";
pub const DEFAULT_MODEL: &str = "eleven_multilingual_v2";
const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
const API_KEY_HEADER: &str = "xi-api-key";

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("request to speech service failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("speech service returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("no text to synthesize")]
    EmptyText,
    #[error("speech service returned no audio")]
    EmptyAudio,
}

#[async_trait]
#[cfg_attr(test, automock)]
pub trait SpeechSynthesizer: Send + Sync {
    /// Encoded audio for `text`, ready to hand to the client.
    async fn synthesize(&self, text: &str) -> Result<Bytes, SynthesisError>;
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

pub struct ElevenLabsClient {
    client: Client,
    api_key: SecretString,
    voice_id: String,
    model: String,
    base_url: String,
}

impl ElevenLabsClient {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            api_key,
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_voice_id(mut self, voice_id: &str) -> Self {
        self.voice_id = voice_id.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str) -> Result<Bytes, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        tracing::debug!(voice = %self.voice_id, "synthesizing {} chars", text.len());

        let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id);
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&SynthesisRequest {
                text,
                model_id: &self.model,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Status { status, body });
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }
        Ok(audio)
    }
}
