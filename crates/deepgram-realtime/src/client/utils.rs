use crate::client::config::Config;
use crate::client::consts::AUTHORIZATION_HEADER;
use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

/// Renders the `/listen` URL with every option from `config` as a query parameter.
pub fn listen_url(config: &Config) -> String {
    let mut params = vec![
        format!("model={}", config.model()),
        format!("language={}", config.language()),
        format!("interim_results={}", config.interim_results()),
        format!("smart_format={}", config.smart_format()),
        format!("vad_events={}", config.vad_events()),
    ];
    if let Some(ms) = config.utterance_end_ms() {
        params.push(format!("utterance_end_ms={ms}"));
    }
    if let Some(encoding) = config.encoding() {
        params.push(format!("encoding={encoding}"));
    }
    if let Some(rate) = config.sample_rate() {
        params.push(format!("sample_rate={rate}"));
    }
    if let Some(channels) = config.channels() {
        params.push(format!("channels={channels}"));
    }
    format!("{}/listen?{}", config.base_url(), params.join("&"))
}

pub fn build_request(config: &Config) -> tokio_tungstenite::tungstenite::Result<Request> {
    let mut request = listen_url(config).into_client_request()?;
    request.headers_mut().insert(
        AUTHORIZATION_HEADER,
        format!("Token {}", config.api_key().expose_secret())
            .as_str()
            .parse()?,
    );
    Ok(request)
}
