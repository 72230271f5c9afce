//! Messages exchanged with the Deepgram live transcription socket.

use serde::{Deserialize, Serialize};

/// Control messages sent as JSON text frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Flush buffered audio and close the stream after final results are sent.
    CloseStream,
    /// Keep an idle connection open without sending audio.
    KeepAlive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alternative {
    pub transcript: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub alternatives: Vec<Alternative>,
}

/// `Results` event: one incremental or final transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsEvent {
    pub channel: Channel,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub speech_final: bool,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
}

impl ResultsEvent {
    /// Transcript of the top alternative, empty when the provider sent none.
    pub fn transcript(&self) -> &str {
        self.channel
            .alternatives
            .first()
            .map(|alt| alt.transcript.as_str())
            .unwrap_or("")
    }
}

/// `Metadata` event sent once the request is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataEvent {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub channels: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechStartedEvent {
    #[serde(default)]
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtteranceEndEvent {
    #[serde(default)]
    pub last_word_end: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
}

impl ErrorEvent {
    pub fn summary(&self) -> String {
        self.description
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "unknown provider error".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Synthesized locally when the socket closes or fails; never sent by the server.
    #[serde(rename = "close")]
    Close { reason: Option<String> },
    #[serde(rename = "Results")]
    Results(ResultsEvent),
    #[serde(rename = "Metadata")]
    Metadata(MetadataEvent),
    #[serde(rename = "SpeechStarted")]
    SpeechStarted(SpeechStartedEvent),
    #[serde(rename = "UtteranceEnd")]
    UtteranceEnd(UtteranceEndEvent),
    #[serde(rename = "Error")]
    Error(ErrorEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_results_event() {
        let raw = r#"{
            "type": "Results",
            "channel_index": [0, 1],
            "duration": 1.02,
            "start": 0.0,
            "is_final": true,
            "speech_final": false,
            "channel": {"alternatives": [{"transcript": "What style is this?", "confidence": 0.98, "words": []}]}
        }"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        match event {
            ServerEvent::Results(results) => {
                assert_eq!(results.transcript(), "What style is this?");
                assert!(results.is_final);
                assert!(!results.speech_final);
            }
            other => panic!("expected Results, got {other:?}"),
        }
    }

    #[test]
    fn results_without_alternatives_has_empty_transcript() {
        let raw = r#"{"type": "Results", "channel": {"alternatives": []}}"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        let ServerEvent::Results(results) = event else {
            panic!("expected Results");
        };
        assert_eq!(results.transcript(), "");
    }

    #[test]
    fn parses_lifecycle_events() {
        let started: ServerEvent =
            serde_json::from_str(r#"{"type": "SpeechStarted", "channel": [0], "timestamp": 9.5}"#)
                .unwrap();
        assert!(matches!(started, ServerEvent::SpeechStarted(e) if e.timestamp == 9.5));

        let ended: ServerEvent =
            serde_json::from_str(r#"{"type": "UtteranceEnd", "channel": [0], "last_word_end": 2.3}"#)
                .unwrap();
        assert!(matches!(ended, ServerEvent::UtteranceEnd(_)));

        let metadata: ServerEvent = serde_json::from_str(
            r#"{"type": "Metadata", "request_id": "abc", "duration": 3.0, "channels": 1}"#,
        )
        .unwrap();
        assert!(matches!(metadata, ServerEvent::Metadata(m) if m.request_id == "abc"));
    }

    #[test]
    fn error_summary_prefers_description() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type": "Error", "description": "bad audio", "message": "other"}"#,
        )
        .unwrap();
        let ServerEvent::Error(err) = event else {
            panic!("expected Error");
        };
        assert_eq!(err.summary(), "bad audio");
    }

    #[test]
    fn close_stream_serializes_as_typed_message() {
        let json = serde_json::to_string(&ClientMessage::CloseStream).unwrap();
        assert_eq!(json, r#"{"type":"CloseStream"}"#);
    }
}
