use crate::context::ConversationContext;
use crate::protocol::{ImagePayload, ServerMessage};
use crate::synthesis::SpeechSynthesizer;
use crate::vision::{ARTWORK_ANALYSIS_PROMPT, AnalysisKind, VisionModel};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// The outbound channel to the client is closed.
#[derive(Debug, Error)]
#[error("client connection closed")]
pub struct ClientGone;

/// Turns an accepted utterance or a shared image into a reply: a caption
/// first, then synthesized audio when synthesis succeeds.
pub struct ResponsePipeline {
    model: Arc<dyn VisionModel>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    outbound: mpsc::Sender<ServerMessage>,
}

impl ResponsePipeline {
    /// Without a synthesizer only captions are sent.
    pub fn new(
        model: Arc<dyn VisionModel>,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            model,
            synthesizer,
            outbound,
        }
    }

    pub async fn send(&self, message: ServerMessage) -> Result<(), ClientGone> {
        self.outbound.send(message).await.map_err(|_| ClientGone)
    }

    pub async fn handle_text_utterance(
        &self,
        context: &mut ConversationContext,
        text: &str,
    ) -> Result<(), ClientGone> {
        let prompt = context.build_grounded_prompt(text);
        let result = self.model.generate_text(&prompt).await;
        context.add_user_message(text);

        let reply = match result {
            Ok(reply) => {
                context.add_ai_response(reply.as_str());
                reply
            }
            Err(e) => {
                warn!("text generation failed: {}", e);
                let apology = e.user_message(AnalysisKind::Text);
                context.add_ai_response(apology);
                apology.to_string()
            }
        };
        info!("replying to utterance with {} chars", reply.len());
        self.reply(reply).await
    }

    /// Analyzes `image` with `prompt`, or the standard artwork prompt when
    /// none is given.
    pub async fn handle_image(
        &self,
        context: &mut ConversationContext,
        image: Arc<ImagePayload>,
        prompt: Option<&str>,
    ) -> Result<(), ClientGone> {
        context.add_image_message(image.clone());
        let prompt = prompt.unwrap_or(ARTWORK_ANALYSIS_PROMPT);

        let reply = match self.model.analyze_image(&image, prompt).await {
            Ok(reply) => {
                context.add_ai_response(reply.as_str());
                reply
            }
            Err(e) => {
                warn!("image analysis failed: {}", e);
                let apology = e.user_message(AnalysisKind::Image);
                context.add_ai_response(apology);
                apology.to_string()
            }
        };
        info!("replying to image with {} chars", reply.len());
        self.reply(reply).await
    }

    /// Decodes a `data:` URL shared by the client and analyzes it. A URL that
    /// cannot be decoded is still recorded as a shared image and answered
    /// with an apology.
    pub async fn handle_image_data_url(
        &self,
        context: &mut ConversationContext,
        data_url: &str,
    ) -> Result<(), ClientGone> {
        match ImagePayload::from_data_url(data_url) {
            Ok(image) => self.handle_image(context, Arc::new(image), None).await,
            Err(e) => {
                warn!("could not decode shared image: {}", e);
                context.add_unreadable_image_message();
                let apology = e.user_message();
                context.add_ai_response(apology.as_str());
                self.reply(apology).await
            }
        }
    }

    async fn reply(&self, text: String) -> Result<(), ClientGone> {
        self.send(ServerMessage::AiResponse { text: text.clone() })
            .await?;

        let Some(ref synthesizer) = self.synthesizer else {
            return Ok(());
        };
        match synthesizer.synthesize(&text).await {
            Ok(audio) => self.send(ServerMessage::audio(&audio)).await,
            Err(e) => {
                warn!("speech synthesis failed, sending caption only: {}", e);
                Ok(())
            }
        }
    }
}
