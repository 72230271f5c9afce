use crate::context::{ConversationContext, DEFAULT_HISTORY_TURNS, MAX_RETAINED_TURNS};
use crate::gate;
use crate::generic_types::TranscriptEvent;
use crate::pipeline::{ClientGone, ResponsePipeline};
use crate::protocol::{ClientControl, ServerMessage};
use crate::synthesis::SpeechSynthesizer;
use crate::transcription::{SpeechToText, TranscriptionStream};
use crate::vision::VisionModel;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, warn};

const WORK_QUEUE_CAPACITY: usize = 32;

/// A frame received from the client socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Audio(Bytes),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientDisconnected,
    TranscriptionUnavailable,
    Fault,
}

impl CloseReason {
    /// WebSocket close code sent to the client.
    pub fn code(&self) -> u16 {
        match self {
            CloseReason::ClientDisconnected => 1000,
            CloseReason::TranscriptionUnavailable => 1013,
            CloseReason::Fault => 1011,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CloseReason::ClientDisconnected => "session ended",
            CloseReason::TranscriptionUnavailable => "Failed to connect to transcription service",
            CloseReason::Fault => "Internal server error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub history_turns: usize,
    pub retained_turns: usize,
    /// How long the transcription provider has to report that it is open.
    pub transcription_grace: Duration,
    /// Idle time after which the transcription stream is sent a keep-alive.
    pub keep_alive: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            history_turns: DEFAULT_HISTORY_TURNS,
            retained_turns: MAX_RETAINED_TURNS,
            transcription_grace: Duration::from_millis(500),
            keep_alive: Duration::from_secs(5),
        }
    }
}

/// A reply still to be produced by the session's reply worker.
#[derive(Debug)]
enum Work {
    Utterance(String),
    Image { data_url: String },
}

/// Per-connection orchestrator. Audio goes to the transcription stream and
/// transcripts are captioned as they arrive. Accepted transcripts and shared
/// images are queued for a reply worker, so audio keeps flowing while a
/// reply is being generated.
pub struct SessionController<P: SpeechToText> {
    state: SessionState,
    context: ConversationContext,
    stream: TranscriptionStream<P>,
    transcripts: mpsc::Receiver<TranscriptEvent>,
    pipeline: Arc<ResponsePipeline>,
    last_accepted_transcript: String,
    grace: Duration,
    keep_alive: Duration,
}

impl<P: SpeechToText> SessionController<P> {
    pub fn new(
        provider: P,
        model: Arc<dyn VisionModel>,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        outbound: mpsc::Sender<ServerMessage>,
        settings: SessionSettings,
    ) -> Self {
        let (stream, transcripts) =
            TranscriptionStream::new(provider, settings.transcription_grace);
        Self {
            state: SessionState::Connecting,
            context: ConversationContext::with_limits(
                settings.history_turns,
                settings.retained_turns,
            ),
            stream,
            transcripts,
            pipeline: Arc::new(ResponsePipeline::new(model, synthesizer, outbound)),
            last_accepted_transcript: String::new(),
            grace: settings.transcription_grace,
            // A zero period would make the keep-alive timer panic.
            keep_alive: settings.keep_alive.max(Duration::from_millis(1)),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The conversation so far. While the session runs the reply worker owns
    /// the history, so this is only complete once `run` has returned.
    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn last_accepted_transcript(&self) -> &str {
        &self.last_accepted_transcript
    }

    /// Runs the session until the client goes away or transcription cannot
    /// be started. The transcription stream is finished on every exit, then
    /// replies already queued are completed.
    pub async fn run(&mut self, inbound: mpsc::Receiver<ClientMessage>) -> CloseReason {
        let (work_tx, work_rx) = mpsc::channel(WORK_QUEUE_CAPACITY);
        let context = std::mem::take(&mut self.context);
        let worker = tokio::spawn(
            reply_worker(self.pipeline.clone(), context, work_rx).in_current_span(),
        );

        let mut reason = self.drive(inbound, work_tx).await;
        self.state = SessionState::Closing;
        self.stream.finish().await;

        match worker.await {
            Ok(context) => self.context = context,
            Err(e) => {
                error!("reply worker failed: {}", e);
                reason = CloseReason::Fault;
            }
        }
        info!(reason = ?reason, "session closed");
        self.state = SessionState::Closed;
        reason
    }

    async fn drive(
        &mut self,
        mut inbound: mpsc::Receiver<ClientMessage>,
        work: mpsc::Sender<Work>,
    ) -> CloseReason {
        self.state = SessionState::Connecting;
        self.stream.connect().await;
        if !self.stream.wait_until_connected(self.grace).await {
            warn!("transcription stream did not open within {:?}", self.grace);
            return CloseReason::TranscriptionUnavailable;
        }
        self.state = SessionState::Active;
        info!("session active");

        let mut keep_alive = tokio::time::interval(self.keep_alive);
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let handled = tokio::select! {
                message = inbound.recv() => match message {
                    Some(message) => self.handle_client_message(message, &work).await,
                    None => {
                        info!("client disconnected");
                        return CloseReason::ClientDisconnected;
                    }
                },
                Some(transcript) = self.transcripts.recv() => {
                    self.handle_transcript(transcript, &work).await
                }
                _ = keep_alive.tick() => {
                    self.stream.keep_alive_if_idle(self.keep_alive).await;
                    Ok(())
                }
            };
            if let Err(ClientGone) = handled {
                info!("client stopped receiving");
                return CloseReason::ClientDisconnected;
            }
        }
    }

    async fn handle_client_message(
        &mut self,
        message: ClientMessage,
        work: &mpsc::Sender<Work>,
    ) -> Result<(), ClientGone> {
        match message {
            ClientMessage::Audio(chunk) => {
                let len = chunk.len();
                if !self.stream.send_audio(chunk).await {
                    debug!("dropped {} byte audio chunk", len);
                }
                Ok(())
            }
            ClientMessage::Text(text) => match ClientControl::parse(&text) {
                Ok(ClientControl::AnalyzeImage { data_url }) => {
                    info!("received image analysis request");
                    enqueue(work, Work::Image { data_url }).await
                }
                Err(e) => {
                    warn!("dropping control message: {}", e);
                    Ok(())
                }
            },
        }
    }

    async fn handle_transcript(
        &mut self,
        transcript: TranscriptEvent,
        work: &mpsc::Sender<Work>,
    ) -> Result<(), ClientGone> {
        self.pipeline
            .send(ServerMessage::Transcription {
                text: transcript.text.clone(),
            })
            .await?;

        let decision = gate::decide(&transcript.text, &self.last_accepted_transcript);
        if !decision.accept {
            debug!(reason = ?decision.reason, "not acting on transcript: {}", transcript.text);
            return Ok(());
        }

        info!("accepted utterance: {}", transcript.text);
        self.last_accepted_transcript = transcript.text.clone();
        enqueue(work, Work::Utterance(transcript.text)).await
    }
}

async fn enqueue(work: &mpsc::Sender<Work>, item: Work) -> Result<(), ClientGone> {
    work.send(item).await.map_err(|_| ClientGone)
}

/// Produces replies one at a time in arrival order, so the caption and audio
/// of one reply never interleave with the next. Hands the history back once
/// the queue closes or the client goes away.
async fn reply_worker(
    pipeline: Arc<ResponsePipeline>,
    mut context: ConversationContext,
    mut queue: mpsc::Receiver<Work>,
) -> ConversationContext {
    while let Some(work) = queue.recv().await {
        let handled = match work {
            Work::Utterance(text) => pipeline.handle_text_utterance(&mut context, &text).await,
            Work::Image { data_url } => {
                pipeline.handle_image_data_url(&mut context, &data_url).await
            }
        };
        if let Err(ClientGone) = handled {
            info!("client stopped receiving, dropping queued replies");
            break;
        }
    }
    context
}
