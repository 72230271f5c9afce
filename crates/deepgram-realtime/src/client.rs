use crate::types::{ClientMessage, ServerEvent};
use anyhow::{Context, Result};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_tungstenite::tungstenite::Message;

mod config;
mod consts;
mod utils;

pub use config::{Config, ConfigBuilder};

type ServerTx = tokio::sync::broadcast::Sender<ServerEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<ServerEvent>;

/// Frames queued for the writer task.
#[derive(Debug)]
enum Outbound {
    Audio(Bytes),
    Control(ClientMessage),
}

/// Live transcription client. Audio goes out through a writer task, provider
/// events come back on a broadcast channel fed by a reader task.
pub struct Client {
    capacity: usize,
    config: Config,
    c_tx: Option<tokio::sync::mpsc::Sender<Outbound>>,
    s_tx: Option<ServerTx>,
    // First receiver is created before the reader task starts so no early event is lost.
    initial_rx: Option<ServerRx>,
    connected: Arc<AtomicBool>,
}

impl Client {
    fn new(capacity: usize, config: Config) -> Self {
        Self {
            capacity,
            config,
            c_tx: None,
            s_tx: None,
            initial_rx: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn connect(&mut self) -> Result<()> {
        if self.c_tx.is_some() {
            return Err(anyhow::anyhow!("already connected"));
        }

        let request = utils::build_request(&self.config)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .context("Failed to connect to Deepgram WebSocket")?;
        tracing::info!("connected to deepgram live transcription");

        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel::<Outbound>(self.capacity);
        let (s_tx, s_rx) = tokio::sync::broadcast::channel(self.capacity);

        self.c_tx = Some(c_tx);
        self.s_tx = Some(s_tx.clone());
        self.initial_rx = Some(s_rx);
        self.connected.store(true, Ordering::Release);

        // Writer: drains queued frames until every sender is gone, then closes the stream.
        let connected = self.connected.clone();
        let writer_events = s_tx.clone();
        tokio::spawn(async move {
            while let Some(outbound) = c_rx.recv().await {
                let message = match outbound {
                    Outbound::Audio(chunk) => Message::Binary(chunk.to_vec()),
                    Outbound::Control(control) => match serde_json::to_string(&control) {
                        Ok(text) => Message::Text(text),
                        Err(e) => {
                            tracing::error!("failed to serialize control message: {}", e);
                            continue;
                        }
                    },
                };
                if let Err(e) = write.send(message).await {
                    tracing::error!("failed to send message: {}", e);
                    connected.store(false, Ordering::Release);
                    let _ = writer_events.send(ServerEvent::Close {
                        reason: Some(e.to_string()),
                    });
                    return;
                }
            }

            if connected.swap(false, Ordering::AcqRel) {
                if let Ok(text) = serde_json::to_string(&ClientMessage::CloseStream) {
                    let _ = write.send(Message::Text(text)).await;
                }
                let _ = write.send(Message::Close(None)).await;
                tracing::debug!("deepgram stream closed by client");
            }
        });

        // Reader: decodes provider messages and broadcasts them.
        let connected = self.connected.clone();
        tokio::spawn(async move {
            let mut close_reason = None;
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        close_reason = Some(e.to_string());
                        break;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if s_tx.send(event).is_err() {
                                tracing::debug!("no subscribers for deepgram event");
                            }
                        }
                        Err(e) => {
                            tracing::warn!("failed to deserialize event: {}, text=> {:?}", e, text);
                        }
                    },
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message of {} bytes", bin.len());
                    }
                    Message::Close(frame) => {
                        tracing::info!("connection closed: {:?}", frame);
                        close_reason = frame.map(|f| format!("{} {}", u16::from(f.code), f.reason));
                        break;
                    }
                    _ => {}
                }
            }
            connected.store(false, Ordering::Release);
            let _ = s_tx.send(ServerEvent::Close {
                reason: close_reason,
            });
        });

        Ok(())
    }

    /// Subscribes to provider events. The first call also receives events that
    /// arrived between connecting and subscribing.
    pub fn server_events(&mut self) -> Result<ServerRx> {
        if let Some(rx) = self.initial_rx.take() {
            return Ok(rx);
        }
        match self.s_tx {
            Some(ref tx) => Ok(tx.subscribe()),
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.c_tx.is_some() && self.connected.load(Ordering::Acquire)
    }

    async fn send_outbound(&mut self, outbound: Outbound) -> Result<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(anyhow::anyhow!("connection is closed"));
        }
        match self.c_tx {
            Some(ref tx) => {
                tx.send(outbound)
                    .await
                    .map_err(|_| anyhow::anyhow!("writer task has stopped"))?;
                Ok(())
            }
            None => Err(anyhow::anyhow!("not connected yet")),
        }
    }

    /// Queues one chunk of raw or containerized audio.
    pub async fn send_audio(&mut self, chunk: Bytes) -> Result<()> {
        self.send_outbound(Outbound::Audio(chunk)).await
    }

    pub async fn keep_alive(&mut self) -> Result<()> {
        self.send_outbound(Outbound::Control(ClientMessage::KeepAlive))
            .await
    }

    /// Asks the provider to close the stream. Safe to call more than once.
    pub async fn finish(&mut self) -> Result<()> {
        // Dropping the last sender makes the writer send CloseStream and a close frame.
        self.c_tx.take();
        self.initial_rx.take();
        Ok(())
    }
}

pub async fn connect_with_config(capacity: usize, config: Config) -> Result<Client> {
    let mut client = Client::new(capacity, config);
    client.connect().await?;
    Ok(client)
}

pub async fn connect() -> Result<Client> {
    let config = Config::new();
    connect_with_config(1024, config).await
}
