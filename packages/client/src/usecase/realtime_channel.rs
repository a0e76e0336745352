//! UseCase: ルームのリアルタイムチャンネル
//!
//! ルームごとに 1 つのブローカー接続（STOMP over WebSocket）を管理します。
//!
//! ## 状態遷移
//!
//! ```text
//! Idle → Connecting → Connected → (Disconnected → Connecting)*
//!   ↑________________ teardown ______________________|
//! ```
//!
//! - 接続完了 (`CONNECTED`) でトピックを購読し、キュー内のアクションを FIFO で送信する
//! - 切断時は一定間隔で無期限に再接続する（バックオフは伸ばさない）
//! - 送信アクションは常にキューを経由し、トランスポートが書き込みを完了したものだけがキューから外れる
//!   （少なくとも 1 回の配信。重複排除 ID は付与しない）
//! - 受信したスナップショットは全置換で `on_update` に渡す（Tombstone はここでは適用しない）

use std::{collections::VecDeque, sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, Notify, watch},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    domain::{
        BrokerTransport, ConnectionState, OutboundAction, PlaceCandidate, RoomCode,
        TransportLink, UserId,
    },
    infrastructure::{
        dto::{broker::ActionMessageDto, parse_snapshot},
        stomp::{StompCommand, StompFrame},
    },
};

use super::error::ChannelError;

/// Receives every normalized snapshot of the room.
pub type SnapshotCallback = Arc<dyn Fn(Vec<PlaceCandidate>) + Send + Sync>;

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1500);
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Topic carrying the room's candidate snapshots.
pub fn snapshot_topic(room: &RoomCode) -> String {
    format!("/topic/candidate.{}", room)
}

/// Destination receiving the room's actions.
pub fn action_destination(room: &RoomCode) -> String {
    format!("/ws/candidate.{}", room)
}

/// Tunables of the channel.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Constant delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Maximum wait for `CONNECTED` after the transport opened.
    pub handshake_timeout: Duration,
    /// `host` header of the `CONNECT` frame.
    pub host: String,
    /// Bearer token sent with `CONNECT`.
    pub access_token: Option<String>,
    /// User whose votes are flagged in snapshots.
    pub current_user: Option<UserId>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            host: "/".to_string(),
            access_token: None,
            current_user: None,
        }
    }
}

/// State shared between the client and a room's connection task.
struct ChannelShared {
    room: RoomCode,
    settings: ChannelSettings,
    queue: Mutex<VecDeque<OutboundAction>>,
    wake: Notify,
    state: Arc<watch::Sender<ConnectionState>>,
    on_update: SnapshotCallback,
}

impl ChannelShared {
    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::info!("Room {} channel: {:?} -> {:?}", self.room, previous, next);
        }
    }
}

/// A live room channel: its shared state and its connection task.
struct RoomChannel {
    shared: Arc<ChannelShared>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RoomChannel {
    fn spawn(
        room: RoomCode,
        transport: Arc<dyn BrokerTransport>,
        settings: ChannelSettings,
        state: Arc<watch::Sender<ConnectionState>>,
        on_update: SnapshotCallback,
    ) -> Self {
        let shared = Arc::new(ChannelShared {
            room,
            settings,
            queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            state,
            on_update,
        });
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_channel(shared.clone(), transport, shutdown_rx));
        Self {
            shared,
            shutdown,
            task,
        }
    }

    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the task (unsubscribing when connected) and drop queued actions.
    async fn close(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("Room {} channel task ended abnormally: {}", self.shared.room, e);
        }
        let dropped = {
            let mut queue = self.shared.queue.lock().await;
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        if dropped > 0 {
            tracing::info!(
                "Dropped {} unsent actions for room {}",
                dropped,
                self.shared.room
            );
        }
    }
}

/// Connection manager for the room channel.
///
/// At most one room channel is live at a time; initializing another room tears the
/// current one down first.
pub struct RealtimeChannelClient {
    transport: Arc<dyn BrokerTransport>,
    settings: ChannelSettings,
    state: Arc<watch::Sender<ConnectionState>>,
    active: Mutex<Option<RoomChannel>>,
}

impl RealtimeChannelClient {
    pub fn new(transport: Arc<dyn BrokerTransport>, settings: ChannelSettings) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            transport,
            settings,
            state: Arc::new(state),
            active: Mutex::new(None),
        }
    }

    /// Open the channel for `room`.
    ///
    /// Calling again with the same room while its channel is live is a no-op; the first
    /// callback stays registered.
    pub async fn init(&self, room: RoomCode, on_update: SnapshotCallback) {
        let mut active = self.active.lock().await;
        if let Some(channel) = active.as_ref()
            && channel.shared.room == room
            && channel.is_live()
        {
            tracing::debug!("Room {} channel already initialized", room);
            return;
        }
        if let Some(previous) = active.take() {
            tracing::info!(
                "Switching channel from room {} to {}",
                previous.shared.room,
                room
            );
            previous.close().await;
        }
        *active = Some(RoomChannel::spawn(
            room,
            self.transport.clone(),
            self.settings.clone(),
            self.state.clone(),
            on_update,
        ));
    }

    /// Queue an action for the current room and wake the connection task.
    ///
    /// Actions are published in the order they were queued, once connected.
    pub async fn send_action(&self, action: OutboundAction) -> Result<(), ChannelError> {
        let active = self.active.lock().await;
        let channel = active.as_ref().ok_or(ChannelError::NotInitialized)?;
        channel.shared.queue.lock().await.push_back(action);
        channel.shared.wake.notify_one();
        tracing::debug!(
            "Queued {} for place {} in room {}",
            action.action_type.as_str(),
            action.place_id,
            channel.shared.room
        );
        Ok(())
    }

    /// Close the current channel: cancel reconnects, unsubscribe, clear the queue.
    pub async fn teardown(&self) {
        let channel = self.active.lock().await.take();
        if let Some(channel) = channel {
            channel.close().await;
        }
        self.state.send_replace(ConnectionState::Idle);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Room of the current channel.
    pub async fn room(&self) -> Option<RoomCode> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|channel| channel.shared.room.clone())
    }

    /// Number of actions waiting to be published.
    pub async fn pending_actions(&self) -> usize {
        match self.active.lock().await.as_ref() {
            Some(channel) => channel.shared.queue.lock().await.len(),
            None => 0,
        }
    }
}

/// Why a session ended.
enum SessionEnd {
    Shutdown,
    Lost(String),
}

async fn run_channel(
    shared: Arc<ChannelShared>,
    transport: Arc<dyn BrokerTransport>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        shared.set_state(ConnectionState::Connecting);
        match run_session(&shared, transport.as_ref(), &mut shutdown).await {
            SessionEnd::Shutdown => break,
            SessionEnd::Lost(reason) => {
                tracing::warn!(
                    "Room {} channel lost: {}; reconnecting in {:?}",
                    shared.room,
                    reason,
                    shared.settings.reconnect_delay
                );
            }
        }
        shared.set_state(ConnectionState::Disconnected);

        tokio::select! {
            _ = tokio::time::sleep(shared.settings.reconnect_delay) => {}
            // A newly queued action triggers an immediate attempt.
            _ = shared.wake.notified() => {}
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }
}

async fn run_session(
    shared: &ChannelShared,
    transport: &dyn BrokerTransport,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let mut link = tokio::select! {
        opened = transport.open() => match opened {
            Ok(link) => link,
            Err(e) => return SessionEnd::Lost(e.to_string()),
        },
        _ = wait_for_shutdown(shutdown) => return SessionEnd::Shutdown,
    };

    let connect = StompFrame::connect(
        &shared.settings.host,
        shared.settings.access_token.as_deref(),
    );
    if link.post(connect.encode()).is_err() {
        return SessionEnd::Lost("link closed before CONNECT".to_string());
    }
    let handshake = tokio::time::timeout(
        shared.settings.handshake_timeout,
        await_connected(&mut link),
    );
    tokio::select! {
        result = handshake => match result {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return SessionEnd::Lost(reason),
            Err(_) => return SessionEnd::Lost("timed out waiting for CONNECTED".to_string()),
        },
        _ = wait_for_shutdown(shutdown) => return SessionEnd::Shutdown,
    }

    let subscription_id = format!("sub-{}", Uuid::new_v4());
    let subscribe = StompFrame::subscribe(&subscription_id, &snapshot_topic(&shared.room));
    if link.post(subscribe.encode()).is_err() {
        return SessionEnd::Lost("link closed before SUBSCRIBE".to_string());
    }
    shared.set_state(ConnectionState::Connected);

    if let Some(end) = flush_or_leave(shared, &link, shutdown, &subscription_id).await {
        return end;
    }

    loop {
        tokio::select! {
            _ = shared.wake.notified() => {
                if let Some(end) = flush_or_leave(shared, &link, shutdown, &subscription_id).await {
                    return end;
                }
            }
            incoming = link.incoming.recv() => match incoming {
                Some(raw) => {
                    if let Err(reason) = handle_frame(shared, &raw) {
                        return SessionEnd::Lost(reason);
                    }
                }
                None => return SessionEnd::Lost("connection closed".to_string()),
            },
            _ = wait_for_shutdown(shutdown) => {
                leave(&link, &subscription_id);
                return SessionEnd::Shutdown;
            }
        }
    }
}

/// Flush the queue unless a shutdown arrives first; `Some` ends the session.
async fn flush_or_leave(
    shared: &ChannelShared,
    link: &TransportLink,
    shutdown: &mut watch::Receiver<bool>,
    subscription_id: &str,
) -> Option<SessionEnd> {
    tokio::select! {
        flushed = flush_queue(shared, link) => flushed.err().map(SessionEnd::Lost),
        _ = wait_for_shutdown(shutdown) => {
            leave(link, subscription_id);
            Some(SessionEnd::Shutdown)
        }
    }
}

/// Unsubscribe and disconnect; best effort.
fn leave(link: &TransportLink, subscription_id: &str) {
    let _ = link.post(StompFrame::unsubscribe(subscription_id).encode());
    let _ = link.post(StompFrame::disconnect().encode());
}

async fn await_connected(link: &mut TransportLink) -> Result<(), String> {
    while let Some(raw) = link.incoming.recv().await {
        match StompFrame::decode(&raw) {
            Ok(Some(frame)) if frame.command == StompCommand::Connected => return Ok(()),
            Ok(Some(frame)) if frame.command == StompCommand::Error => {
                return Err(format!(
                    "broker refused connection: {}",
                    frame.header_value("message").unwrap_or(frame.body.as_str())
                ));
            }
            Ok(Some(frame)) => {
                tracing::debug!("Ignoring {} before CONNECTED", frame.command);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Undecodable frame during handshake: {}", e),
        }
    }
    Err("connection closed during handshake".to_string())
}

/// Publish queued actions in order; an action leaves the queue only once the link wrote it.
async fn flush_queue(shared: &ChannelShared, link: &TransportLink) -> Result<(), String> {
    let destination = action_destination(&shared.room);
    loop {
        let Some(action) = shared.queue.lock().await.front().copied() else {
            return Ok(());
        };
        match serde_json::to_string(&ActionMessageDto::from(action)) {
            Ok(body) => {
                let frame = StompFrame::send(&destination, body);
                if let Err(e) = link.write(frame.encode()).await {
                    return Err(format!("{} while publishing queued actions", e));
                }
                tracing::debug!(
                    "Published {} for place {}",
                    action.action_type.as_str(),
                    action.place_id
                );
            }
            Err(e) => tracing::error!("Dropping unserializable action: {}", e),
        }
        shared.queue.lock().await.pop_front();
    }
}

/// Handle one inbound frame; `Err` means the session must be dropped.
fn handle_frame(shared: &ChannelShared, raw: &str) -> Result<(), String> {
    let frame = match StompFrame::decode(raw) {
        Ok(Some(frame)) => frame,
        Ok(None) => return Ok(()),
        Err(e) => {
            tracing::warn!("Dropping undecodable frame: {}", e);
            return Ok(());
        }
    };
    match frame.command {
        StompCommand::Message => {
            deliver_snapshot(shared, &frame.body);
            Ok(())
        }
        StompCommand::Error => Err(format!(
            "broker error: {}",
            frame.header_value("message").unwrap_or(frame.body.as_str())
        )),
        other => {
            tracing::debug!("Ignoring {} frame", other);
            Ok(())
        }
    }
}

fn deliver_snapshot(shared: &ChannelShared, body: &str) {
    match parse_snapshot(body) {
        Ok(records) => {
            let candidates: Vec<PlaceCandidate> = records
                .into_iter()
                .map(|record| record.into_candidate(shared.settings.current_user))
                .collect();
            tracing::debug!(
                "Room {} snapshot with {} candidates",
                shared.room,
                candidates.len()
            );
            (shared.on_update)(candidates);
        }
        Err(e) => tracing::warn!("Dropping malformed snapshot for room {}: {}", shared.room, e),
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
