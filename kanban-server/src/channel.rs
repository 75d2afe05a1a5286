//! Push channel: WebSocket sessions joined under a user.
//!
//! The first frame must be `join`. After the `joined` acknowledgment the
//! client may emit intents; each one is applied through [`AppState`], which
//! broadcasts the resulting change to every channel of the user (this one
//! included). A failed intent is answered with `error` on this channel only.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use kanban_proto::api::UpdateTaskRequest;
use kanban_proto::channel::{self, ClientMessage, ServerMessage};
use tokio::sync::mpsc;

use crate::server::AppState;

/// axum handler that upgrades an HTTP request to a WebSocket connection.
pub async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles an upgraded WebSocket connection.
///
/// The connection lifecycle:
/// 1. Wait for a `join` message.
/// 2. Join the user's channel group and send `joined` back.
/// 3. Apply intents until the socket closes.
/// 4. Leave the channel group.
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some(user_id) = wait_for_join(&mut ws_receiver).await else {
        tracing::warn!("connection closed before join");
        return;
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let ack = ServerMessage::Joined {
        user_id: user_id.clone(),
    };
    if let Err(e) = send_server_msg(&mut ws_sender, &ack).await {
        tracing::error!(user_id = %user_id, error = %e, "failed to send joined ack");
        return;
    }
    let subscription = state.join(&user_id, tx.clone()).await;
    tracing::info!(user_id = %user_id, subscription, "channel joined");

    let writer_user = user_id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(user_id = %writer_user, "WebSocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let reader_user = user_id.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_text_message(&reader_user, text.as_str(), &reader_state, &tx).await;
                }
                Message::Close(_) => {
                    tracing::info!(user_id = %reader_user, "received close frame");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.leave(&user_id, subscription).await;
    tracing::info!(user_id = %user_id, "channel left");
}

/// Waits for the first message, expecting `join`.
///
/// Returns the user id, or `None` if the connection closes or another
/// message arrives first.
async fn wait_for_join(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<String> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match channel::decode::<ClientMessage>(text.as_str()) {
                Ok(ClientMessage::Join { user_id }) if !user_id.is_empty() => {
                    return Some(user_id);
                }
                Ok(other) => {
                    tracing::warn!(event = other.event(), "expected join");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to decode join message");
                    return None;
                }
            },
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

/// Applies one intent from a joined channel.
///
/// The joined user overrides any `userId` carried by the intent.
async fn handle_text_message(
    user_id: &str,
    text: &str,
    state: &Arc<AppState>,
    reply: &mpsc::UnboundedSender<Message>,
) {
    let msg = match channel::decode::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "failed to decode intent");
            send_error(reply, None, format!("malformed message: {e}"));
            return;
        }
    };
    let event = msg.event();
    tracing::debug!(user_id, event, "intent received");

    let result = match msg {
        ClientMessage::Join { .. } => {
            tracing::warn!(user_id, "duplicate join ignored");
            Ok(())
        }
        ClientMessage::TaskCreate(mut request) => {
            request.user_id = user_id.to_string();
            state.create_task(request).await.map(drop)
        }
        ClientMessage::TaskReorder { tasks, .. } => state.reorder_tasks(user_id, tasks).await,
        ClientMessage::TaskUpdate {
            id,
            title,
            description,
            category,
            order,
        } => state
            .update_task(
                &id,
                UpdateTaskRequest {
                    title,
                    description,
                    category,
                    order,
                },
            )
            .await
            .map(drop),
        ClientMessage::TaskDelete { id } => state.delete_task(&id).await,
    };

    if let Err(e) = result {
        tracing::warn!(user_id, event, error = %e, "intent rejected");
        send_error(reply, Some(event), e.to_string());
    }
}

fn send_error(reply: &mpsc::UnboundedSender<Message>, event: Option<&str>, reason: String) {
    let msg = ServerMessage::Error {
        reason,
        event: event.map(str::to_string),
    };
    match channel::encode(&msg) {
        Ok(text) => {
            let _ = reply.send(Message::Text(text.into()));
        }
        Err(e) => tracing::error!(error = %e, "failed to encode error message"),
    }
}

/// Encodes and sends a server message directly on a WebSocket sender.
async fn send_server_msg(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &ServerMessage,
) -> Result<(), String> {
    let text = channel::encode(msg).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}
