use artsensei_core::{SpeechToText, SttError, SttEvent, TranscriptEvent};
use async_trait::async_trait;
use bytes::Bytes;
use deepgram_realtime::types::ServerEvent;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const CLIENT_CAPACITY: usize = 1024;
const EVENT_CAPACITY: usize = 128;

/// An adapter that implements the core `SpeechToText` trait for the
/// `deepgram_realtime::Client`. Each `open` starts a fresh socket.
pub struct DeepgramAdapter {
    config: deepgram_realtime::Config,
    client: Option<deepgram_realtime::Client>,
    translator: Option<JoinHandle<()>>,
}

impl DeepgramAdapter {
    pub fn new(config: deepgram_realtime::Config) -> Self {
        Self {
            config,
            client: None,
            translator: None,
        }
    }
}

/// Maps a Deepgram socket event onto the provider-neutral event set.
pub fn translate(event: ServerEvent) -> SttEvent {
    match event {
        ServerEvent::Results(results) => SttEvent::Transcript(TranscriptEvent::new(
            results.transcript(),
            results.is_final,
        )),
        ServerEvent::Metadata(metadata) => SttEvent::Metadata(metadata.request_id),
        ServerEvent::SpeechStarted(_) => SttEvent::SpeechStarted,
        ServerEvent::UtteranceEnd(_) => SttEvent::UtteranceEnd,
        ServerEvent::Error(error) => SttEvent::Error(error.summary()),
        ServerEvent::Close { reason } => {
            tracing::info!("Deepgram connection closed: {:?}", reason);
            SttEvent::Closed
        }
    }
}

#[async_trait]
impl SpeechToText for DeepgramAdapter {
    async fn open(&mut self) -> Result<mpsc::Receiver<SttEvent>, SttError> {
        self.close().await?;

        let mut client = deepgram_realtime::connect_with_config(CLIENT_CAPACITY, self.config.clone())
            .await
            .map_err(|e| SttError::Connect(format!("{e:#}")))?;
        let mut deepgram_rx = client
            .server_events()
            .map_err(|e| SttError::Connect(format!("{e:#}")))?;

        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        // The socket handshake has completed, so the stream is usable now.
        let _ = tx.send(SttEvent::Opened).await;

        let translator = tokio::spawn(async move {
            loop {
                match deepgram_rx.recv().await {
                    Ok(event) => {
                        let event = translate(event);
                        let closed = event == SttEvent::Closed;
                        if tx.send(event).await.is_err() || closed {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Deepgram event stream lagged by {} messages.", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = tx.send(SttEvent::Closed).await;
                        break;
                    }
                }
            }
            tracing::debug!("Deepgram event translation stopped.");
        });

        self.client = Some(client);
        self.translator = Some(translator);
        Ok(rx)
    }

    async fn send(&mut self, chunk: Bytes) -> Result<(), SttError> {
        match self.client {
            Some(ref mut client) => client
                .send_audio(chunk)
                .await
                .map_err(|e| SttError::Send(format!("{e:#}"))),
            None => Err(SttError::NotConnected),
        }
    }

    async fn keep_alive(&mut self) -> Result<(), SttError> {
        match self.client {
            Some(ref mut client) => client
                .keep_alive()
                .await
                .map_err(|e| SttError::Send(format!("{e:#}"))),
            None => Err(SttError::NotConnected),
        }
    }

    async fn close(&mut self) -> Result<(), SttError> {
        if let Some(translator) = self.translator.take() {
            translator.abort();
        }
        if let Some(mut client) = self.client.take() {
            client
                .finish()
                .await
                .map_err(|e| SttError::Provider(format!("{e:#}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepgram_realtime::types::{ErrorEvent, UtteranceEndEvent};
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    fn config(url: &str) -> deepgram_realtime::Config {
        deepgram_realtime::Config::builder()
            .with_base_url(url)
            .with_api_key("test-key")
            .build()
    }

    #[test]
    fn translates_results_into_transcripts() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"Results","is_final":true,"channel":{"alternatives":[{"transcript":"Who painted this?"}]}}"#,
        )
        .unwrap();
        assert_eq!(
            translate(event),
            SttEvent::Transcript(TranscriptEvent::new("Who painted this?", true))
        );
    }

    #[test]
    fn translates_lifecycle_events() {
        assert_eq!(
            translate(ServerEvent::UtteranceEnd(UtteranceEndEvent { last_word_end: 1.0 })),
            SttEvent::UtteranceEnd
        );
        assert_eq!(
            translate(ServerEvent::Error(ErrorEvent {
                description: Some("bad audio".to_string()),
                message: None,
                variant: None,
            })),
            SttEvent::Error("bad audio".to_string())
        );
        assert_eq!(
            translate(ServerEvent::Close { reason: None }),
            SttEvent::Closed
        );
    }

    #[tokio::test]
    async fn open_fails_when_provider_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut adapter = DeepgramAdapter::new(config(&format!("ws://{addr}/v1")));
        let err = adapter.open().await.unwrap_err();
        assert!(matches!(err, SttError::Connect(_)));
        assert!(matches!(
            adapter.send(Bytes::from_static(b"pcm")).await,
            Err(SttError::NotConnected)
        ));
        assert!(matches!(
            adapter.keep_alive().await,
            Err(SttError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn keep_alive_is_sent_as_control_message() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, mut seen_rx) = mpsc::channel::<String>(4);
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Text(text) = message {
                    let _ = seen_tx.send(text).await;
                }
            }
        });

        let mut adapter = DeepgramAdapter::new(config(&format!("ws://{addr}/v1")));
        let _events = adapter.open().await.unwrap();
        adapter.keep_alive().await.unwrap();

        let text = tokio::time::timeout(std::time::Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "KeepAlive");
    }

    #[tokio::test]
    async fn open_streams_translated_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(message)) = ws.next().await {
                if matches!(message, Message::Binary(_)) {
                    let reply = r#"{"type":"Results","is_final":false,"channel":{"alternatives":[{"transcript":"sunflowers"}]}}"#;
                    ws.send(Message::Text(reply.to_string())).await.unwrap();
                }
            }
        });

        let mut adapter = DeepgramAdapter::new(config(&format!("ws://{addr}/v1")));
        let mut events = adapter.open().await.unwrap();
        assert_eq!(events.recv().await, Some(SttEvent::Opened));

        adapter.send(Bytes::from_static(b"pcm")).await.unwrap();
        let event = tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
            .await
            .unwrap();
        assert_eq!(
            event,
            Some(SttEvent::Transcript(TranscriptEvent::new("sunflowers", false)))
        );

        adapter.close().await.unwrap();
        adapter.close().await.unwrap();
    }
}
