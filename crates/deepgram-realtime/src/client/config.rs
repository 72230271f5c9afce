use crate::client::consts::{
    BASE_URL, DEEPGRAM_API_KEY, DEFAULT_LANGUAGE, DEFAULT_MODEL, DEFAULT_UTTERANCE_END_MS,
};
use secrecy::SecretString;

/// Connection options for the Deepgram live transcription endpoint.
#[derive(Clone)]
pub struct Config {
    base_url: String,
    api_key: SecretString,
    model: String,
    language: String,
    interim_results: bool,
    smart_format: bool,
    vad_events: bool,
    utterance_end_ms: Option<u32>,
    encoding: Option<String>,
    sample_rate: Option<u32>,
    channels: Option<u16>,
}

pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.api_key = SecretString::from(api_key.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.config.model = model.to_string();
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.config.language = language.to_string();
        self
    }

    pub fn with_interim_results(mut self, enabled: bool) -> Self {
        self.config.interim_results = enabled;
        self
    }

    pub fn with_smart_format(mut self, enabled: bool) -> Self {
        self.config.smart_format = enabled;
        self
    }

    pub fn with_vad_events(mut self, enabled: bool) -> Self {
        self.config.vad_events = enabled;
        self
    }

    pub fn with_utterance_end_ms(mut self, ms: Option<u32>) -> Self {
        self.config.utterance_end_ms = ms;
        self
    }

    /// Raw audio encoding. Leave unset for containerized audio (webm, ogg) so
    /// the provider sniffs the format itself.
    pub fn with_encoding(mut self, encoding: &str) -> Self {
        self.config.encoding = Some(encoding.to_string());
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.config.channels = Some(channels);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            api_key: std::env::var(DEEPGRAM_API_KEY)
                .unwrap_or_else(|_| "".to_string())
                .into(),
            model: DEFAULT_MODEL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            interim_results: true,
            smart_format: true,
            vad_events: true,
            utterance_end_ms: Some(DEFAULT_UTTERANCE_END_MS),
            encoding: None,
            sample_rate: None,
            channels: None,
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn interim_results(&self) -> bool {
        self.interim_results
    }

    pub fn smart_format(&self) -> bool {
        self.smart_format
    }

    pub fn vad_events(&self) -> bool {
        self.vad_events
    }

    pub fn utterance_end_ms(&self) -> Option<u32> {
        self.utterance_end_ms
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    pub fn channels(&self) -> Option<u16> {
        self.channels
    }
}
