use crate::generic_types::{SttEvent, TranscriptEvent};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const TRANSCRIPT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum SttError {
    #[error("failed to open transcription stream: {0}")]
    Connect(String),
    #[error("failed to send audio: {0}")]
    Send(String),
    #[error("transcription stream is not connected")]
    NotConnected,
    #[error("provider error: {0}")]
    Provider(String),
}

/// A streaming speech-to-text connection. Implementations translate their
/// provider's callbacks or socket messages into [`SttEvent`]s.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Opens a new stream. Provider events arrive on the returned receiver,
    /// starting with [`SttEvent::Opened`] once the provider is ready.
    async fn open(&mut self) -> Result<mpsc::Receiver<SttEvent>, SttError>;

    async fn send(&mut self, chunk: Bytes) -> Result<(), SttError>;

    /// Keeps an idle stream from being closed by the provider.
    async fn keep_alive(&mut self) -> Result<(), SttError>;

    /// Gracefully closes the current stream, if any.
    async fn close(&mut self) -> Result<(), SttError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Connected,
}

/// Owns one provider connection and forwards every non-empty transcript to
/// the receiver handed out by [`TranscriptionStream::new`].
pub struct TranscriptionStream<P: SpeechToText> {
    provider: P,
    state: Arc<watch::Sender<StreamState>>,
    transcript_tx: mpsc::Sender<TranscriptEvent>,
    pump: Option<JoinHandle<()>>,
    opened: bool,
    finished: bool,
    grace: Duration,
    last_activity: Instant,
}

impl<P: SpeechToText> TranscriptionStream<P> {
    /// `grace` is how long to wait for the provider to report it is open
    /// after a reconnect.
    pub fn new(provider: P, grace: Duration) -> (Self, mpsc::Receiver<TranscriptEvent>) {
        let (transcript_tx, transcript_rx) = mpsc::channel(TRANSCRIPT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(StreamState::Disconnected);
        let stream = Self {
            provider,
            state: Arc::new(state),
            transcript_tx,
            pump: None,
            opened: false,
            finished: false,
            grace,
            last_activity: Instant::now(),
        };
        (stream, transcript_rx)
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == StreamState::Connected
    }

    /// Opens the provider stream. Failures are logged and leave the stream
    /// disconnected; callers check [`Self::is_connected`].
    pub async fn connect(&mut self) {
        self.finished = false;
        self.state.send_replace(StreamState::Connecting);
        info!("opening transcription stream");

        let events = match self.provider.open().await {
            Ok(events) => events,
            Err(e) => {
                error!("transcription stream failed to open: {}", e);
                self.state.send_replace(StreamState::Disconnected);
                return;
            }
        };
        self.opened = true;
        self.last_activity = Instant::now();
        self.pump = Some(tokio::spawn(pump_events(
            events,
            self.state.clone(),
            self.transcript_tx.clone(),
        )));
    }

    /// Waits up to `timeout` for a pending open to settle.
    pub async fn wait_until_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.state.subscribe();
        let settle = async {
            loop {
                let state = *rx.borrow_and_update();
                if state != StreamState::Connecting {
                    break;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        };
        let _ = tokio::time::timeout(timeout, settle).await;
        self.is_connected()
    }

    /// Forwards one audio chunk. A disconnected stream gets one reconnect
    /// attempt first. Returns `false` when the chunk was not delivered.
    pub async fn send_audio(&mut self, chunk: Bytes) -> bool {
        if self.finished {
            debug!("dropping audio after finish");
            return false;
        }
        if !self.is_connected() {
            warn!("transcription stream not connected, attempting reconnect");
            self.reconnect().await;
            if !self.is_connected() {
                warn!("reconnect failed, dropping {} bytes of audio", chunk.len());
                return false;
            }
        }
        match self.provider.send(chunk).await {
            Ok(()) => {
                self.last_activity = Instant::now();
                true
            }
            Err(e) => {
                error!("failed to send audio to transcription provider: {}", e);
                self.state.send_replace(StreamState::Disconnected);
                false
            }
        }
    }

    /// Sends a keep-alive when the stream is connected and nothing has been
    /// sent for at least `idle`. Returns `true` when one went out.
    pub async fn keep_alive_if_idle(&mut self, idle: Duration) -> bool {
        if self.finished || !self.is_connected() || self.last_activity.elapsed() < idle {
            return false;
        }
        match self.provider.keep_alive().await {
            Ok(()) => {
                debug!("sent transcription keep-alive");
                self.last_activity = Instant::now();
                true
            }
            Err(e) => {
                warn!("transcription keep-alive failed: {}", e);
                false
            }
        }
    }

    async fn reconnect(&mut self) {
        self.teardown().await;
        self.connect().await;
        self.wait_until_connected(self.grace).await;
    }

    async fn teardown(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if self.opened {
            self.opened = false;
            if let Err(e) = self.provider.close().await {
                warn!("error while closing transcription stream: {}", e);
            }
        }
        self.state.send_replace(StreamState::Disconnected);
    }

    /// Gracefully closes the provider stream. Safe to call repeatedly or
    /// without ever connecting.
    pub async fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.teardown().await;
        info!("transcription stream finished");
    }
}

impl<P: SpeechToText> Drop for TranscriptionStream<P> {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

async fn pump_events(
    mut events: mpsc::Receiver<SttEvent>,
    state: Arc<watch::Sender<StreamState>>,
    transcript_tx: mpsc::Sender<TranscriptEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SttEvent::Opened => {
                info!("transcription stream connected");
                state.send_replace(StreamState::Connected);
            }
            SttEvent::Transcript(transcript) => {
                if transcript.text.trim().is_empty() {
                    continue;
                }
                debug!(is_final = transcript.is_final, "transcript: {}", transcript.text);
                if transcript_tx.send(transcript).await.is_err() {
                    debug!("transcript receiver dropped");
                    break;
                }
            }
            SttEvent::Metadata(metadata) => debug!("transcription metadata: {}", metadata),
            SttEvent::SpeechStarted => debug!("speech started"),
            SttEvent::UtteranceEnd => debug!("utterance end"),
            SttEvent::Error(e) => {
                error!("transcription provider error: {}", e);
                state.send_replace(StreamState::Disconnected);
            }
            SttEvent::Closed => {
                info!("transcription stream closed by provider");
                break;
            }
        }
    }
    state.send_replace(StreamState::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStt;

    const GRACE: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn connect_and_forward_transcripts() {
        let provider = FakeStt::new();
        let (mut stream, mut transcripts) = TranscriptionStream::new(provider.clone(), GRACE);

        stream.connect().await;
        assert!(stream.wait_until_connected(GRACE).await);

        provider
            .emit(SttEvent::Transcript(TranscriptEvent::new("   ", false)))
            .await;
        provider
            .emit(SttEvent::Transcript(TranscriptEvent::new("what is", false)))
            .await;
        provider.emit(SttEvent::UtteranceEnd).await;
        provider
            .emit(SttEvent::Transcript(TranscriptEvent::new("What is this?", true)))
            .await;

        // The blank transcript never arrives.
        let first = transcripts.recv().await.unwrap();
        assert_eq!(first, TranscriptEvent::new("what is", false));
        let second = transcripts.recv().await.unwrap();
        assert_eq!(second, TranscriptEvent::new("What is this?", true));

        assert!(stream.send_audio(Bytes::from_static(b"pcm")).await);
        assert_eq!(provider.sent(), vec![Bytes::from_static(b"pcm")]);
    }

    #[tokio::test]
    async fn open_failure_leaves_stream_disconnected() {
        let provider = FakeStt::failing_opens(2);
        let (mut stream, _transcripts) = TranscriptionStream::new(provider.clone(), GRACE);

        stream.connect().await;
        assert_eq!(stream.state(), StreamState::Disconnected);
        assert!(!stream.wait_until_connected(GRACE).await);

        // One reconnect attempt, which also fails.
        assert!(!stream.send_audio(Bytes::from_static(b"pcm")).await);
        assert_eq!(provider.opens(), 2);
        assert!(provider.sent().is_empty());
    }

    #[tokio::test]
    async fn send_reconnects_once_after_failed_open() {
        let provider = FakeStt::failing_opens(1);
        let (mut stream, _transcripts) = TranscriptionStream::new(provider.clone(), GRACE);

        stream.connect().await;
        assert!(!stream.is_connected());

        assert!(stream.send_audio(Bytes::from_static(b"pcm")).await);
        assert_eq!(provider.opens(), 2);
        assert_eq!(provider.sent().len(), 1);
    }

    #[tokio::test]
    async fn provider_error_triggers_reconnect_on_next_send() {
        let provider = FakeStt::new();
        let (mut stream, _transcripts) = TranscriptionStream::new(provider.clone(), GRACE);
        stream.connect().await;
        assert!(stream.wait_until_connected(GRACE).await);

        provider.emit(SttEvent::Error("socket reset".to_string())).await;
        let mut state = stream.state.subscribe();
        let _ = tokio::time::timeout(
            GRACE,
            state.wait_for(|s| *s == StreamState::Disconnected),
        )
        .await;
        assert!(!stream.is_connected());

        assert!(stream.send_audio(Bytes::from_static(b"pcm")).await);
        assert_eq!(provider.opens(), 2);
        assert_eq!(provider.closes(), 1);
    }

    #[tokio::test]
    async fn failed_send_reports_false_and_disconnects() {
        let provider = FakeStt::new();
        let (mut stream, _transcripts) = TranscriptionStream::new(provider.clone(), GRACE);
        stream.connect().await;
        assert!(stream.wait_until_connected(GRACE).await);

        provider.set_fail_sends(true);
        assert!(!stream.send_audio(Bytes::from_static(b"pcm")).await);
        assert_eq!(stream.state(), StreamState::Disconnected);
    }

    #[tokio::test]
    async fn silent_provider_times_out() {
        let provider = FakeStt::silent();
        let (mut stream, _transcripts) = TranscriptionStream::new(provider, GRACE);
        stream.connect().await;
        assert_eq!(stream.state(), StreamState::Connecting);
        assert!(!stream.wait_until_connected(Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn finish_is_idempotent() {
        let provider = FakeStt::new();
        let (mut stream, _transcripts) = TranscriptionStream::new(provider.clone(), GRACE);
        stream.connect().await;

        stream.finish().await;
        stream.finish().await;
        assert_eq!(provider.closes(), 1);
        assert_eq!(stream.state(), StreamState::Disconnected);
        assert!(!stream.send_audio(Bytes::from_static(b"pcm")).await);
        assert_eq!(provider.opens(), 1);
    }

    #[tokio::test]
    async fn keep_alive_only_when_idle_and_connected() {
        let provider = FakeStt::silent();
        let (mut stream, _transcripts) = TranscriptionStream::new(provider.clone(), GRACE);
        stream.connect().await;
        assert!(!stream.keep_alive_if_idle(Duration::ZERO).await);

        let provider = FakeStt::new();
        let (mut stream, _transcripts) = TranscriptionStream::new(provider.clone(), GRACE);
        stream.connect().await;
        assert!(stream.wait_until_connected(GRACE).await);
        assert!(stream.send_audio(Bytes::from_static(b"pcm")).await);

        assert!(!stream.keep_alive_if_idle(Duration::from_secs(60)).await);
        assert!(stream.keep_alive_if_idle(Duration::ZERO).await);
        assert_eq!(provider.keep_alives(), 1);

        stream.finish().await;
        assert!(!stream.keep_alive_if_idle(Duration::ZERO).await);
        assert_eq!(provider.keep_alives(), 1);
    }

    #[tokio::test]
    async fn finish_without_connect_is_noop() {
        let provider = FakeStt::new();
        let (mut stream, _transcripts) = TranscriptionStream::new(provider.clone(), GRACE);
        stream.finish().await;
        assert_eq!(provider.closes(), 0);
    }
}
