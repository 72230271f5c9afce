//! JSON messages exchanged with the browser client over the session socket.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("not a data url")]
    NotADataUrl,
    #[error("invalid data url: {0}")]
    InvalidDataUrl(&'static str),
    #[error("invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl ProtocolError {
    /// Reply shown to the user when a shared image cannot be decoded.
    pub fn user_message(&self) -> String {
        match self {
            ProtocolError::NotADataUrl => "Invalid data URL format.".to_string(),
            other => format!("Sorry, there was an error analyzing the image: {other}"),
        }
    }
}

/// Control messages sent by the client as text frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientControl {
    AnalyzeImage {
        #[serde(rename = "dataUrl")]
        data_url: String,
    },
}

impl ClientControl {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        match value.get("type").and_then(|t| t.as_str()) {
            Some("analyze_image") => Ok(serde_json::from_value(value)?),
            Some(other) => Err(ProtocolError::UnknownType(other.to_string())),
            None => Err(ProtocolError::UnknownType(String::new())),
        }
    }
}

/// Events sent to the client as text frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Live caption of what the user is saying, partial or final.
    Transcription { text: String },
    AiResponse { text: String },
    AiAudio { audio_base64: String },
    Error { text: String },
}

impl ServerMessage {
    pub fn audio(audio: &[u8]) -> Self {
        ServerMessage::AiAudio {
            audio_base64: BASE64.encode(audio),
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Decoded image bytes and their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    mime_type: String,
    data: Bytes,
}

impl ImagePayload {
    pub fn new(mime_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Parses `data:<mime>;base64,<data>`. The MIME type is passed through
    /// as given; the model decides what it can read.
    pub fn from_data_url(url: &str) -> Result<Self, ProtocolError> {
        let rest = url
            .strip_prefix("data:")
            .ok_or(ProtocolError::NotADataUrl)?;
        let (header, body) = rest
            .split_once(',')
            .ok_or(ProtocolError::InvalidDataUrl("missing comma"))?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or(ProtocolError::InvalidDataUrl("only base64 data urls are supported"))?;
        if mime_type.is_empty() {
            return Err(ProtocolError::InvalidDataUrl("missing mime type"));
        }
        let data = BASE64.decode(body.trim())?;
        if data.is_empty() {
            return Err(ProtocolError::InvalidDataUrl("empty image"));
        }
        Ok(Self::new(mime_type, Bytes::from(data)))
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }
}
