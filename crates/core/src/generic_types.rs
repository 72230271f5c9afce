/// One incremental result from a speech-to-text provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
}

impl TranscriptEvent {
    pub fn new(text: impl Into<String>, is_final: bool) -> Self {
        Self {
            text: text.into(),
            is_final,
        }
    }
}

/// Provider lifecycle and transcript events, normalised across speech-to-text
/// backends and delivered on a single channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SttEvent {
    Opened,
    Transcript(TranscriptEvent),
    Metadata(String),
    SpeechStarted,
    UtteranceEnd,
    Error(String),
    Closed,
}
