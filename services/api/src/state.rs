use crate::config::Config;
use artsensei_core::context::MAX_RETAINED_TURNS;
use artsensei_core::{
    ElevenLabsClient, GeminiClient, SessionSettings, SpeechSynthesizer, VisionModel,
};
use secrecy::ExposeSecret;
use std::sync::Arc;

/// Shared by every route and session.
pub struct AppState {
    pub model: Arc<dyn VisionModel>,
    pub synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    /// Used to fetch images for `/analyze-image`.
    pub http: reqwest::Client,
    pub stt_config: deepgram_realtime::Config,
    pub settings: SessionSettings,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        let model = GeminiClient::new(config.google_api_key.clone(), config.gemini_model.clone());

        let synthesizer = config.elevenlabs_api_key.clone().map(|key| {
            Arc::new(
                ElevenLabsClient::new(key)
                    .with_voice_id(&config.elevenlabs_voice_id)
                    .with_model(&config.elevenlabs_model),
            ) as Arc<dyn SpeechSynthesizer>
        });
        if synthesizer.is_none() {
            tracing::warn!("ELEVENLABS_API_KEY is not set, replies will be captions only.");
        }

        let stt_config = deepgram_realtime::Config::builder()
            .with_api_key(config.deepgram_api_key.expose_secret())
            .with_model(&config.deepgram_model)
            .with_language(&config.deepgram_language)
            .build();

        Self {
            model: Arc::new(model),
            synthesizer,
            http: reqwest::Client::new(),
            stt_config,
            settings: SessionSettings {
                history_turns: config.history_turns,
                retained_turns: MAX_RETAINED_TURNS,
                transcription_grace: config.transcription_grace,
                keep_alive: config.keep_alive,
            },
        }
    }
}
