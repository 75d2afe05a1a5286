//! Push-channel sync client over WebSocket.
//!
//! Mutations are emitted as fire-and-forget intents and resolve to
//! [`Delivery::Dispatched`] once the frame is written. The server answers
//! every successful mutation with a `taskChange` notification (to this and
//! every other channel joined under the same user), which the background
//! reader forwards as [`SyncEvent::Change`].
//!
//! A channel lost without [`ChannelSyncClient::close`] is rejoined in the
//! background with exponential backoff (see [`ReconnectPolicy`]). Progress
//! is reported as connection events on the same notification stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use kanban_proto::api::{CreateTaskRequest, UpdateTaskRequest};
use kanban_proto::change::ReorderEntry;
use kanban_proto::channel::{self, ClientMessage, ServerMessage};
use kanban_proto::task::{Task, TaskId};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{
    ConnectionEvent, Delivery, NotificationSource, SyncClient, SyncError, SyncEvent, SyncMode,
};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Backoff for rejoining a lost channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait before the first attempt.
    pub initial_delay: Duration,
    /// Upper bound on the wait between attempts.
    pub max_delay: Duration,
    /// Attempts before giving up. Zero disables reconnecting.
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Never reconnect.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_attempts: 0,
        }
    }

    /// Wait before attempt number `attempt` (starting at 1).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

/// Timeouts, buffer size and reconnect policy for
/// [`ChannelSyncClient::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Limit on the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Limit on waiting for the `joined` acknowledgment.
    pub join_timeout: Duration,
    /// Capacity of the inbound notification buffer.
    pub capacity: usize,
    /// How a lost channel is rejoined.
    pub reconnect: ReconnectPolicy,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            join_timeout: Duration::from_secs(5),
            capacity: 256,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// State shared between the client and its supervisor task.
struct Link {
    /// Write half of the current connection; `None` while it is down.
    sender: Mutex<Option<WsSender>>,
    /// Whether the channel is open and joined.
    connected: AtomicBool,
    /// Set by [`ChannelSyncClient::close`]; stops reconnecting.
    closing: AtomicBool,
}

/// Where and as whom to (re)join.
#[derive(Clone)]
struct JoinTarget {
    url: String,
    user_id: String,
    options: ChannelOptions,
}

/// WebSocket push-channel client.
///
/// Created via [`ChannelSyncClient::connect`], which opens the socket,
/// joins the user's session and spawns a background task that reads
/// notifications and rejoins the channel when it drops.
pub struct ChannelSyncClient {
    target: JoinTarget,
    link: Arc<Link>,
    /// Events forwarded by the background task.
    incoming: Mutex<mpsc::Receiver<SyncEvent>>,
    _supervisor: tokio::task::JoinHandle<()>,
}

impl ChannelSyncClient {
    /// Connect to the push channel and join `user_id`'s session.
    ///
    /// The first event delivered by [`NotificationSource::next_event`] is
    /// always `Connection(Connected)`.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Timeout`] if the handshake or join times out.
    /// - [`SyncError::Transport`] if the server cannot be reached or closes
    ///   the channel during the join.
    /// - [`SyncError::Conflict`] if the server refuses the join.
    pub async fn connect(
        url: &str,
        user_id: &str,
        options: ChannelOptions,
    ) -> Result<Self, SyncError> {
        let target = JoinTarget {
            url: url.to_string(),
            user_id: user_id.to_string(),
            options,
        };
        let (ws_sender, ws_reader) = open_and_join(&target).await?;

        let (tx, rx) = mpsc::channel(options.capacity.max(1));
        let _ = tx.try_send(SyncEvent::Connection(ConnectionEvent::Connected));
        let link = Arc::new(Link {
            sender: Mutex::new(Some(ws_sender)),
            connected: AtomicBool::new(true),
            closing: AtomicBool::new(false),
        });
        let supervisor = tokio::spawn(supervise(
            ws_reader,
            tx,
            Arc::clone(&link),
            target.clone(),
        ));

        Ok(Self {
            target,
            link,
            incoming: Mutex::new(rx),
            _supervisor: supervisor,
        })
    }

    /// The channel URL.
    pub fn url(&self) -> &str {
        &self.target.url
    }

    /// The user this channel joined as.
    pub fn user_id(&self) -> &str {
        &self.target.user_id
    }

    /// Close the channel for good. The reader reports `Disconnected` once
    /// the server acknowledges; no reconnect follows.
    pub async fn close(&self) {
        self.link.closing.store(true, Ordering::Relaxed);
        self.link.connected.store(false, Ordering::Relaxed);
        let mut slot = self.link.sender.lock().await;
        if let Some(sender) = slot.as_mut() {
            if let Err(e) = sender.close().await {
                tracing::debug!(err = %e, "push channel close failed");
            }
        }
    }

    /// Write one intent to the socket.
    async fn emit(&self, msg: &ClientMessage) -> Result<(), SyncError> {
        if !self.link.connected.load(Ordering::Relaxed) {
            return Err(SyncError::NotConnected);
        }

        let text = channel::encode(msg)?;
        let mut guard = self.link.sender.lock().await;
        let sender = guard.as_mut().ok_or(SyncError::NotConnected)?;
        sender.send(Message::text(text)).await.map_err(|e| {
            tracing::warn!(event = msg.event(), err = %e, "push channel send failed");
            self.link.connected.store(false, Ordering::Relaxed);
            SyncError::NotConnected
        })?;
        tracing::debug!(event = msg.event(), "intent emitted");
        Ok(())
    }
}

impl SyncClient for ChannelSyncClient {
    async fn create(&self, request: CreateTaskRequest) -> Result<Delivery<Task>, SyncError> {
        self.emit(&ClientMessage::TaskCreate(request)).await?;
        Ok(Delivery::Dispatched)
    }

    async fn update(
        &self,
        id: &TaskId,
        request: UpdateTaskRequest,
    ) -> Result<Delivery<Task>, SyncError> {
        self.emit(&ClientMessage::TaskUpdate {
            id: id.clone(),
            title: request.title,
            description: request.description,
            category: request.category,
            order: request.order,
        })
        .await?;
        Ok(Delivery::Dispatched)
    }

    async fn delete(&self, id: &TaskId) -> Result<Delivery<()>, SyncError> {
        self.emit(&ClientMessage::TaskDelete { id: id.clone() }).await?;
        Ok(Delivery::Dispatched)
    }

    async fn reorder(
        &self,
        user_id: &str,
        tasks: &[ReorderEntry],
    ) -> Result<Delivery<()>, SyncError> {
        self.emit(&ClientMessage::TaskReorder {
            user_id: user_id.to_string(),
            tasks: tasks.to_vec(),
        })
        .await?;
        Ok(Delivery::Dispatched)
    }

    fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::Relaxed)
    }

    fn mode(&self) -> SyncMode {
        SyncMode::Push
    }
}

impl NotificationSource for ChannelSyncClient {
    async fn next_event(&self) -> Option<SyncEvent> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await
    }
}

/// Open the socket, send `join` and wait for `joined`.
async fn open_and_join(target: &JoinTarget) -> Result<(WsSender, WsReader), SyncError> {
    let url = target.url.as_str();
    let (ws_stream, _response) =
        tokio::time::timeout(target.options.connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                tracing::warn!(url, "push channel connect timed out");
                SyncError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url, err = %e, "push channel connect failed");
                map_ws_connect_error(e)
            })?;

    let (mut ws_sender, mut ws_reader) = ws_stream.split();

    let join = channel::encode(&ClientMessage::Join {
        user_id: target.user_id.clone(),
    })?;
    ws_sender
        .send(Message::text(join))
        .await
        .map_err(|e| SyncError::Transport(format!("failed to send join: {e}")))?;

    let ack = tokio::time::timeout(target.options.join_timeout, ws_reader.next())
        .await
        .map_err(|_| {
            tracing::warn!(url, "join acknowledgment timed out");
            SyncError::Timeout
        })?;

    match ack {
        Some(Ok(Message::Text(text))) => match channel::decode::<ServerMessage>(text.as_str()) {
            Ok(ServerMessage::Joined { user_id: joined }) => {
                tracing::info!(user_id = %joined, url, "joined push channel");
                Ok((ws_sender, ws_reader))
            }
            Ok(ServerMessage::Error { reason, .. }) => {
                tracing::warn!(reason = %reason, "join rejected");
                Err(SyncError::Conflict(format!("join rejected: {reason}")))
            }
            Ok(other) => {
                tracing::warn!(?other, "unexpected message during join");
                Err(SyncError::Malformed(
                    "unexpected message during join".to_string(),
                ))
            }
            Err(e) => Err(SyncError::Malformed(e.to_string())),
        },
        Some(Ok(Message::Close(_))) | None => {
            tracing::warn!("push channel closed during join");
            Err(SyncError::Transport(
                "channel closed during join".to_string(),
            ))
        }
        Some(Ok(_)) => Err(SyncError::Malformed(
            "unexpected non-text frame during join".to_string(),
        )),
        Some(Err(e)) => Err(SyncError::Transport(format!(
            "WebSocket error during join: {e}"
        ))),
    }
}

/// Background task: forward notifications, and rejoin when the socket
/// drops unless the client closed it.
async fn supervise(
    mut ws_reader: WsReader,
    tx: mpsc::Sender<SyncEvent>,
    link: Arc<Link>,
    target: JoinTarget,
) {
    loop {
        let Some(last) = read_until_closed(ws_reader, &tx).await else {
            // Receiver dropped with the client.
            link.connected.store(false, Ordering::Relaxed);
            return;
        };

        link.connected.store(false, Ordering::Relaxed);
        link.sender.lock().await.take();
        if tx.send(SyncEvent::Connection(last)).await.is_err() {
            return;
        }
        if link.closing.load(Ordering::Relaxed) || target.options.reconnect.max_attempts == 0 {
            break;
        }

        match reconnect(&target, &tx, &link).await {
            Some(reader) => ws_reader = reader,
            None => break,
        }
    }
    tracing::info!("push channel supervisor exiting");
}

/// Read notifications until the socket closes or fails.
///
/// Malformed frames are logged and skipped. Returns the connection event
/// describing how the socket ended, or `None` if the receiver is gone.
async fn read_until_closed(
    mut ws_reader: WsReader,
    tx: &mpsc::Sender<SyncEvent>,
) -> Option<ConnectionEvent> {
    while let Some(msg_result) = ws_reader.next().await {
        let event = match msg_result {
            Ok(Message::Text(text)) => match channel::decode::<ServerMessage>(text.as_str()) {
                Ok(ServerMessage::TaskChange(change)) => {
                    tracing::trace!(kind = change.kind(), "notification received");
                    SyncEvent::Change(change)
                }
                Ok(ServerMessage::Error { reason, event }) => {
                    tracing::warn!(reason = %reason, event = ?event, "server rejected intent");
                    SyncEvent::Rejected { event, reason }
                }
                Ok(ServerMessage::Joined { .. }) => continue,
                Err(e) => {
                    tracing::warn!(err = %e, "malformed channel frame, skipping");
                    continue;
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("push channel closed by server");
                return Some(ConnectionEvent::Disconnected);
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(err = %e, "push channel read error");
                return Some(ConnectionEvent::ConnectionError(e.to_string()));
            }
        };

        if tx.send(event).await.is_err() {
            return None;
        }
    }
    Some(ConnectionEvent::Disconnected)
}

/// Rejoin with exponential backoff.
///
/// Returns the new read half once joined, or `None` after the last failed
/// attempt, on a local close, or when the receiver is gone.
async fn reconnect(
    target: &JoinTarget,
    tx: &mpsc::Sender<SyncEvent>,
    link: &Link,
) -> Option<WsReader> {
    let policy = target.options.reconnect;
    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.delay_for(attempt)).await;
        if link.closing.load(Ordering::Relaxed) {
            return None;
        }
        let reconnecting = ConnectionEvent::Reconnecting {
            attempt,
            max_attempts: policy.max_attempts,
        };
        tx.send(SyncEvent::Connection(reconnecting)).await.ok()?;

        match open_and_join(target).await {
            Ok((sender, reader)) => {
                let mut slot = link.sender.lock().await;
                if link.closing.load(Ordering::Relaxed) {
                    return None;
                }
                *slot = Some(sender);
                link.connected.store(true, Ordering::Relaxed);
                drop(slot);
                tracing::info!(attempt, url = %target.url, "push channel rejoined");
                tx.send(SyncEvent::Connection(ConnectionEvent::Connected))
                    .await
                    .ok()?;
                return Some(reader);
            }
            Err(e) => {
                tracing::warn!(attempt, max_attempts = policy.max_attempts, err = %e, "reconnect attempt failed");
            }
        }
    }
    tracing::warn!(attempts = policy.max_attempts, "giving up on push channel");
    let _ = tx
        .send(SyncEvent::Connection(ConnectionEvent::ReconnectFailed))
        .await;
    None
}

/// Map a `tokio_tungstenite` connection error to a [`SyncError`].
fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error) -> SyncError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Http(response) => SyncError::Status {
            status: response.status().as_u16(),
            message: "push channel upgrade refused".to_string(),
        },
        WsError::Url(e) => SyncError::Transport(format!("invalid channel url: {e}")),
        other => SyncError::Transport(other.to_string()),
    }
}
