use crate::deepgram_adapter::DeepgramAdapter;
use crate::state::AppState;
use artsensei_core::{ClientMessage, CloseReason, ServerMessage, SessionController};
use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, warn};

const INBOUND_CAPACITY: usize = 256;
const OUTBOUND_CAPACITY: usize = 64;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| {
        let id = uuid::Uuid::new_v4();
        handle_socket(socket, state).instrument(tracing::info_span!("session", id = %id))
    })
}

/// Bridges one client socket to a `SessionController`. The socket reader
/// feeds the session, the session's outbound channel is written back here,
/// and the socket is closed with the session's close reason.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("client connected");
    let (mut sender, mut receiver) = socket.split();
    let (inbound_tx, inbound_rx) = mpsc::channel::<ClientMessage>(INBOUND_CAPACITY);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_CAPACITY);

    let reader = tokio::spawn(
        async move {
            while let Some(message) = receiver.next().await {
                let message = match message {
                    Ok(Message::Binary(chunk)) => ClientMessage::Audio(chunk),
                    Ok(Message::Text(text)) => ClientMessage::Text(text.as_str().to_owned()),
                    Ok(Message::Close(frame)) => {
                        debug!("client sent close: {:?}", frame);
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("client socket error: {}", e);
                        break;
                    }
                };
                if inbound_tx.send(message).await.is_err() {
                    break;
                }
            }
        }
        .in_current_span(),
    );

    let provider = DeepgramAdapter::new(state.stt_config.clone());
    let mut controller = SessionController::new(
        provider,
        state.model.clone(),
        state.synthesizer.clone(),
        outbound_tx,
        state.settings,
    );
    let session = tokio::spawn(async move { controller.run(inbound_rx).await }.in_current_span());

    // Ends once the session drops its sender.
    while let Some(message) = outbound_rx.recv().await {
        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("failed to serialize server message: {}", e);
                continue;
            }
        };
        if let Err(e) = sender.send(Message::Text(json.into())).await {
            warn!("failed to write to client: {}", e);
            break;
        }
    }
    drop(outbound_rx);

    let reason = session.await.unwrap_or_else(|e| {
        error!("session task failed: {}", e);
        CloseReason::Fault
    });
    reader.abort();

    if reason == CloseReason::Fault {
        let error = ServerMessage::Error {
            text: reason.description().to_string(),
        };
        match error.to_json() {
            Ok(json) => {
                if let Err(e) = sender.send(Message::Text(json.into())).await {
                    debug!("error event not delivered: {}", e);
                }
            }
            Err(e) => error!("failed to serialize server message: {}", e),
        }
    }

    let frame = CloseFrame {
        code: reason.code(),
        reason: Utf8Bytes::from_static(reason.description()),
    };
    if let Err(e) = sender.send(Message::Close(Some(frame))).await {
        debug!("close frame not delivered: {}", e);
    }
    info!(code = reason.code(), "client disconnected");
}
