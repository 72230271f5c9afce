pub const DEEPGRAM_API_KEY: &str = "DEEPGRAM_API_KEY";

pub const BASE_URL: &str = "wss://api.deepgram.com/v1";
pub const DEFAULT_MODEL: &str = "nova-2";
pub const DEFAULT_LANGUAGE: &str = "en-US";
pub const DEFAULT_UTTERANCE_END_MS: u32 = 1000;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
