pub mod context;
pub mod gate;
pub mod generic_types;
pub mod pipeline;
pub mod protocol;
pub mod session;
pub mod synthesis;
pub mod transcription;
pub mod vision;

#[cfg(test)]
mod testing;

pub use context::{ConversationContext, GROUNDED_PROMPT_VERSION, Role, Turn};
pub use gate::{DecisionReason, UtteranceDecision, decide};
pub use generic_types::{SttEvent, TranscriptEvent};
pub use pipeline::{ClientGone, ResponsePipeline};
pub use protocol::{ClientControl, ImagePayload, ProtocolError, ServerMessage};
pub use session::{ClientMessage, CloseReason, SessionController, SessionSettings, SessionState};
pub use synthesis::{ElevenLabsClient, SpeechSynthesizer, SynthesisError};
pub use transcription::{SpeechToText, StreamState, SttError, TranscriptionStream};
pub use vision::{AnalysisKind, GeminiClient, ModelError, VisionModel};
