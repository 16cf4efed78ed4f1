//! WebSocket session transport
//!
//! Clients stream audio chunks, then send `stop` to run the pipeline on
//! everything buffered since the previous utterance.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::ApiState;
use super::session::Session;
use crate::metrics::{RunRecord, Stage};
use crate::pipeline::{PipelineState, Turn};
use crate::services::StageOutcome;
use crate::{Error, Result};

/// Incoming WebSocket message from client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsIncoming {
    /// Base64-encoded audio bytes to append to the current utterance
    AudioChunk { data: String },
    /// End of utterance; run the pipeline
    Stop,
    /// Ping to keep connection alive
    Ping,
}

/// Outgoing WebSocket message to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutgoing {
    /// Connection established
    Connected { session_id: String },
    /// What the recognizer heard
    Transcript { text: String },
    /// Generated reply
    Response { text: String },
    /// Error occurred
    Error { code: String, message: String },
    /// Pong response
    Pong,
}

impl WsOutgoing {
    fn from_error(e: &Error) -> Self {
        let code = match e {
            Error::Session(_) => "session_error",
            Error::StageFailed { .. } => "stage_failed",
            _ => "internal_error",
        };
        Self::Error {
            code: code.to_string(),
            message: e.to_string(),
        }
    }
}

/// Build WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new().route("/ws", get(ws_upgrade)).with_state(state)
}

async fn ws_upgrade(State(state): State<Arc<ApiState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut session = state.sessions.open().await;
    let session_id = session.id();

    let connected = WsOutgoing::Connected {
        session_id: session_id.to_string(),
    };
    if let Ok(msg) = serde_json::to_string(&connected) {
        if sender.send(Message::Text(msg.into())).await.is_err() {
            state.sessions.close(session_id).await;
            return;
        }
    }

    tracing::info!(session_id = %session_id, "WebSocket connected");

    let (tx, mut rx) = mpsc::channel::<WsOutgoing>(32);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    let state_for_recv = Arc::clone(&state);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if !handle_frame(msg, &state_for_recv, &mut session, &tx).await {
                break;
            }
        }
    });

    // Never abort the receive side; it may be mid-utterance
    tokio::select! {
        _ = &mut send_task => {
            if let Err(e) = recv_task.await {
                tracing::warn!(session_id = %session_id, error = %e, "session task failed");
            }
        }
        _ = &mut recv_task => send_task.abort(),
    }

    state.sessions.close(session_id).await;
    tracing::info!(session_id = %session_id, "WebSocket disconnected");
}

/// Handle one frame from the client
///
/// Failures are reported to the client as `error` messages. Returns `false`
/// once the session should end.
async fn handle_frame(
    msg: Message,
    state: &ApiState,
    session: &mut Session,
    tx: &mpsc::Sender<WsOutgoing>,
) -> bool {
    let result = match msg {
        Message::Text(text) => handle_message(&text, state, session, tx).await,
        Message::Binary(data) => session.push_chunk(&data),
        Message::Close(_) => {
            tracing::info!(session_id = %session.id(), "WebSocket closed by client");
            return false;
        }
        _ => Ok(()),
    };

    if let Err(e) = result {
        tracing::warn!(session_id = %session.id(), error = %e, "session message failed");
        if tx.send(WsOutgoing::from_error(&e)).await.is_err() {
            return false;
        }
    }
    true
}

/// Handle a single text message
async fn handle_message(
    text: &str,
    state: &ApiState,
    session: &mut Session,
    tx: &mpsc::Sender<WsOutgoing>,
) -> Result<()> {
    let incoming: WsIncoming = serde_json::from_str(text)
        .map_err(|e| Error::Session(format!("invalid message: {e}")))?;

    match incoming {
        WsIncoming::AudioChunk { data } => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(data.as_bytes())
                .map_err(|e| Error::Session(format!("invalid audio chunk: {e}")))?;
            session.push_chunk(&bytes)?;
        }
        WsIncoming::Stop => {
            run_utterance(state, session, tx).await?;
        }
        WsIncoming::Ping => {
            send(tx, WsOutgoing::Pong).await?;
        }
    }

    Ok(())
}

/// Run the pipeline over the session's buffered utterance
///
/// The transcript and reply are sent on `tx`; sending them is timed as the
/// speak stage. The buffer is empty afterwards whether or not the run
/// succeeded, and the temporary audio file is removed.
///
/// # Errors
///
/// Returns error if nothing was buffered, the audio cannot be staged, or a
/// stage degrades under the fail-loud policy. A client that has gone away
/// degrades the speak stage; the run is still logged.
pub async fn run_utterance(
    state: &ApiState,
    session: &mut Session,
    tx: &mpsc::Sender<WsOutgoing>,
) -> Result<(Turn, RunRecord)> {
    let result = run_utterance_inner(state, session, tx).await;
    if result.is_err() {
        session.reset();
    }
    result
}

async fn run_utterance_inner(
    state: &ApiState,
    session: &mut Session,
    tx: &mpsc::Sender<WsOutgoing>,
) -> Result<(Turn, RunRecord)> {
    let audio = session.take_utterance()?;
    tracing::debug!(session_id = %session.id(), bytes = audio.len(), "utterance received");

    let file = tempfile::Builder::new()
        .prefix(&format!("mic_{}_", session.id()))
        .suffix(".wav")
        .tempfile_in(&state.work_dir)?;
    tokio::fs::write(file.path(), &audio).await?;

    let turn = state
        .pipeline
        .respond(session.interaction_mut(), file.path())
        .await;
    drop(file);
    let turn = turn?;

    let interaction = session.interaction_mut();
    interaction.advance(PipelineState::Speaking)?;
    let delivered = interaction
        .timer_mut()
        .time_async(Stage::Speak, deliver(tx, &turn))
        .await;
    state
        .pipeline
        .enforce(interaction, Stage::Speak, &delivered)
        .await?;

    let record = state.pipeline.finish(interaction).await;
    state.sessions.record_utterance(session.id()).await;

    Ok((turn, record))
}

/// Send the transcript and reply, degrading if the client has gone away
async fn deliver(tx: &mpsc::Sender<WsOutgoing>, turn: &Turn) -> StageOutcome<()> {
    let transcript = WsOutgoing::Transcript {
        text: turn.transcript.value().clone(),
    };
    let response = WsOutgoing::Response {
        text: turn.reply.value().clone(),
    };

    let sent = match send(tx, transcript).await {
        Ok(()) => send(tx, response).await,
        Err(e) => Err(e),
    };
    match sent {
        Ok(()) => StageOutcome::Ok(()),
        Err(e) => StageOutcome::Degraded {
            value: (),
            reason: e.to_string(),
        },
    }
}

async fn send(tx: &mpsc::Sender<WsOutgoing>, msg: WsOutgoing) -> Result<()> {
    tx.send(msg)
        .await
        .map_err(|_| Error::Session("channel closed".to_string()))
}
