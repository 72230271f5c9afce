use secrecy::SecretString;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
pub struct Config {
    pub bind_address: SocketAddr,
    pub google_api_key: SecretString,
    pub deepgram_api_key: SecretString,
    /// Without a key the server sends captions only.
    pub elevenlabs_api_key: Option<SecretString>,
    pub gemini_model: String,
    pub deepgram_model: String,
    pub deepgram_language: String,
    pub elevenlabs_voice_id: String,
    pub elevenlabs_model: String,
    pub history_turns: usize,
    pub transcription_grace: Duration,
    pub keep_alive: Duration,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// This function will look for a `.env` file in the current directory
    /// and load the following variables:
    ///
    /// *   `BIND_ADDRESS`: The address and port to bind the server to. Defaults to "0.0.0.0:8000".
    /// *   `GOOGLE_API_KEY`: Key for the Gemini API. Required.
    /// *   `DEEPGRAM_API_KEY`: Key for Deepgram live transcription. Required.
    /// *   `ELEVENLABS_API_KEY`: (Optional) Key for ElevenLabs speech synthesis.
    /// *   `GEMINI_MODEL`: (Optional) Defaults to "gemini-1.5-flash-latest".
    /// *   `DEEPGRAM_MODEL` / `DEEPGRAM_LANGUAGE`: (Optional) Default to "nova-2" / "en-US".
    /// *   `ELEVENLABS_VOICE_ID` / `ELEVENLABS_MODEL`: (Optional) Voice and model for synthesis.
    /// *   `HISTORY_TURNS`: (Optional) Turns of history sent with each prompt. Defaults to 10.
    /// *   `TRANSCRIPTION_GRACE_MS`: (Optional) Wait for the transcription stream to open. Defaults to 500.
    /// *   `TRANSCRIPTION_KEEP_ALIVE_MS`: (Optional) Idle time before the transcription stream is pinged. Defaults to 5000.
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let or_default = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());
        let required = |name: &str| {
            var(name)
                .map(SecretString::from)
                .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
        };

        let bind_address = parse(&or_default("BIND_ADDRESS", "0.0.0.0:8000"), "BIND_ADDRESS")?;
        let google_api_key = required("GOOGLE_API_KEY")?;
        let deepgram_api_key = required("DEEPGRAM_API_KEY")?;
        let elevenlabs_api_key = var("ELEVENLABS_API_KEY").map(SecretString::from);

        let history_turns: usize = parse(&or_default("HISTORY_TURNS", "10"), "HISTORY_TURNS")?;
        if history_turns == 0 {
            return Err(ConfigError::InvalidValue(
                "HISTORY_TURNS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let grace_ms: u64 = parse(
            &or_default("TRANSCRIPTION_GRACE_MS", "500"),
            "TRANSCRIPTION_GRACE_MS",
        )?;
        let keep_alive_ms: u64 = parse(
            &or_default("TRANSCRIPTION_KEEP_ALIVE_MS", "5000"),
            "TRANSCRIPTION_KEEP_ALIVE_MS",
        )?;
        if keep_alive_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "TRANSCRIPTION_KEEP_ALIVE_MS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let log_level_str = or_default("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            google_api_key,
            deepgram_api_key,
            elevenlabs_api_key,
            gemini_model: or_default("GEMINI_MODEL", artsensei_core::vision::DEFAULT_MODEL),
            deepgram_model: or_default("DEEPGRAM_MODEL", "nova-2"),
            deepgram_language: or_default("DEEPGRAM_LANGUAGE", "en-US"),
            elevenlabs_voice_id: or_default(
                "ELEVENLABS_VOICE_ID",
                artsensei_core::synthesis::DEFAULT_VOICE_ID,
            ),
            elevenlabs_model: or_default(
                "ELEVENLABS_MODEL",
                artsensei_core::synthesis::DEFAULT_MODEL,
            ),
            history_turns,
            transcription_grace: Duration::from_millis(grace_ms),
            keep_alive: Duration::from_millis(keep_alive_ms),
            log_level,
        })
    }
}

fn parse<T>(value: &str, name: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}
