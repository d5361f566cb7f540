//! Hub for managing live connections, room membership and event fan-out.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::types::Frame;

/// Default capacity of the per-connection outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default interval between keep-alive pings on the write loop.
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 30;

/// Opaque handle identifying one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ConnId(Uuid);

impl ConnId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// What to do when a subscriber's outbound queue is full at delivery time.
///
/// Fan-out never blocks the publisher; the only question is what happens to
/// the subscriber that cannot keep up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Disconnect the slow consumer: remove it from the registry and every
    /// room, and close its queue.
    Evict,
    /// Drop the frame for that subscriber and keep the connection.
    DropNewest,
}

/// Hub tuning knobs.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each connection's bounded outbound queue.
    pub queue_capacity: usize,
    /// Keep-alive ping interval for connection write loops.
    pub ping_interval_secs: u64,
    /// Policy applied when an outbound queue is full.
    pub overflow: OverflowPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
            overflow: OverflowPolicy::Evict,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("connection {0} is not registered")]
    NotRegistered(ConnId),
    #[error("hub is shutting down")]
    ShuttingDown,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result of registering a connection with the hub.
#[derive(Debug)]
pub struct Registration {
    /// Identity of the new connection.
    pub conn_id: ConnId,
    /// Receiving end of the connection's outbound queue. The write loop
    /// drains this; it yields `None` once the connection is unregistered.
    pub events: mpsc::Receiver<Frame>,
}

/// Sending side of one connection's outbound queue, kept only in the
/// registry. Rooms refer to connections by [`ConnId`]; dropping the handle
/// (on unregister or eviction) is what closes the queue.
struct ClientHandle {
    user_id: String,
    tx: mpsc::Sender<Frame>,
}

#[derive(Default)]
struct HubState {
    clients: HashMap<ConnId, ClientHandle>,
    rooms: HashMap<String, HashSet<ConnId>>,
}

enum Target<'a> {
    Room(&'a str),
    All,
}

/// Fan-out hub: the registry of live connections plus the room index.
///
/// Both maps live under a single reader/writer lock; broadcast is a
/// read-mostly traversal while join/leave/register/unregister take the
/// write lock, which also serializes all structural lifecycle changes.
/// Nothing blocks or awaits while the lock is held: delivery is a
/// `try_send` onto each subscriber's bounded queue, and failures are
/// resolved by the configured [`OverflowPolicy`] rather than by waiting.
pub struct Hub {
    state: RwLock<HubState>,
    config: HubConfig,
    cancel: CancellationToken,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        // tokio channels reject zero capacity, and a zero interval would
        // panic the write loop's ping timer.
        let config = HubConfig {
            queue_capacity: config.queue_capacity.max(1),
            ping_interval_secs: config.ping_interval_secs.max(1),
            ..config
        };
        Self {
            state: RwLock::new(HubState::default()),
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Token cancelled by [`Hub::shutdown`]; connection read loops select
    /// on it so teardown does not depend on peers closing their sockets.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Register a new connection for `user_id`.
    ///
    /// The connection is visible to `publish_all` immediately and to room
    /// broadcasts once it joins a room.
    pub fn register(&self, user_id: &str) -> Result<Registration, HubError> {
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let conn_id = ConnId::new();
        let handle = ClientHandle {
            user_id: user_id.to_string(),
            tx,
        };

        let mut state = self.write();
        // Checked under the lock: shutdown cancels first and sweeps the
        // registry second, also under the lock.
        if self.cancel.is_cancelled() {
            return Err(HubError::ShuttingDown);
        }
        if state.clients.insert(conn_id, handle).is_some() {
            // Freshly allocated ids cannot collide; reaching this means a
            // caller re-registered a live connection.
            error!("duplicate registration of connection {conn_id}");
        }
        info!("registered connection {conn_id} for user {user_id}");

        Ok(Registration {
            conn_id,
            events: rx,
        })
    }

    /// Remove a connection from the registry and from every room it
    /// belongs to, closing its outbound queue. Rooms left empty are
    /// dropped from the index. No-op if the connection is already gone.
    ///
    /// Returns whether the connection was still registered.
    pub fn unregister(&self, conn_id: ConnId) -> bool {
        let mut state = self.write();
        let Some(handle) = state.clients.remove(&conn_id) else {
            return false;
        };
        state.rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
        info!(
            "unregistered connection {conn_id} for user {}",
            handle.user_id
        );
        // `handle` drops here, closing the queue: it held the only
        // long-lived sender.
        true
    }

    /// Subscribe a connection to a room, creating the room on first join.
    /// Joining a room twice is a no-op.
    pub fn join(&self, conn_id: ConnId, room: &str) -> Result<(), HubError> {
        let mut state = self.write();
        if !state.clients.contains_key(&conn_id) {
            return Err(HubError::NotRegistered(conn_id));
        }
        if state.rooms.entry(room.to_string()).or_default().insert(conn_id) {
            info!("connection {conn_id} joined room {room}");
        }
        Ok(())
    }

    /// Drop a connection's membership in a room, removing the room from
    /// the index once its member set is empty. No-op if the connection was
    /// not a member.
    pub fn leave(&self, conn_id: ConnId, room: &str) {
        let mut state = self.write();
        let emptied = match state.rooms.get_mut(room) {
            Some(members) => {
                if !members.remove(&conn_id) {
                    return;
                }
                members.is_empty()
            }
            None => return,
        };
        if emptied {
            state.rooms.remove(room);
        }
        info!("connection {conn_id} left room {room}");
    }

    /// Serialize `event` and deliver it to every member of `room`.
    ///
    /// A serialization failure aborts the broadcast before any delivery
    /// attempt. Delivery itself is best-effort and never blocks; returns
    /// the number of queues the frame was placed on.
    pub fn publish<T: Serialize>(&self, room: &str, event: &T) -> Result<usize, PublishError> {
        let frame = Frame::from(serde_json::to_string(event)?);
        Ok(self.fan_out(Target::Room(room), frame))
    }

    /// Serialize `event` and deliver it to every registered connection,
    /// independent of room membership.
    pub fn publish_all<T: Serialize>(&self, event: &T) -> Result<usize, PublishError> {
        let frame = Frame::from(serde_json::to_string(event)?);
        Ok(self.fan_out(Target::All, frame))
    }

    /// Queue a single frame for one connection, used for control acks.
    ///
    /// Returns whether the connection is still live afterwards; a closed
    /// queue (and, under [`OverflowPolicy::Evict`], a full one) tears the
    /// connection down just like a failed broadcast delivery.
    pub fn send_to(&self, conn_id: ConnId, frame: Frame) -> bool {
        let result = {
            let state = self.read();
            let Some(handle) = state.clients.get(&conn_id) else {
                return false;
            };
            handle.tx.try_send(frame)
        };
        match result {
            Ok(()) => true,
            Err(TrySendError::Full(_)) if self.config.overflow == OverflowPolicy::DropNewest => {
                warn!("dropping frame for connection {conn_id}: outbound queue full");
                true
            }
            Err(_) => {
                self.evict(conn_id, "outbound queue full or closed");
                false
            }
        }
    }

    fn fan_out(&self, target: Target<'_>, frame: Frame) -> usize {
        let mut delivered = 0;
        let mut dropped = 0;
        let mut dead = Vec::new();

        {
            let state = self.read();
            let members: Vec<ConnId> = match target {
                Target::Room(room) => match state.rooms.get(room) {
                    Some(members) => members.iter().copied().collect(),
                    None => return 0,
                },
                Target::All => state.clients.keys().copied().collect(),
            };

            for conn_id in members {
                let Some(handle) = state.clients.get(&conn_id) else {
                    continue;
                };
                match handle.tx.try_send(frame.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => match self.config.overflow {
                        OverflowPolicy::Evict => dead.push(conn_id),
                        OverflowPolicy::DropNewest => dropped += 1,
                    },
                    Err(TrySendError::Closed(_)) => dead.push(conn_id),
                }
            }
        }

        if dropped > 0 {
            warn!("dropped frame for {dropped} slow consumer(s)");
        }
        for conn_id in dead {
            self.evict(conn_id, "outbound queue full or closed");
        }
        delivered
    }

    /// Tear down a connection in response to a delivery failure. Shares
    /// the unregister path, so the publisher observing the failure and a
    /// concurrent disconnect cannot race into a double teardown.
    fn evict(&self, conn_id: ConnId, reason: &str) {
        if self.unregister(conn_id) {
            warn!("evicted connection {conn_id}: {reason}");
        }
    }

    /// Close every connection and refuse further registrations.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        let mut state = self.write();
        let closed = state.clients.len();
        state.clients.clear();
        state.rooms.clear();
        if closed > 0 {
            info!("hub shut down, closed {closed} connection(s)");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.read().clients.len()
    }

    pub fn room_count(&self) -> usize {
        self.read().rooms.len()
    }

    pub fn is_registered(&self, conn_id: ConnId) -> bool {
        self.read().clients.contains_key(&conn_id)
    }

    pub fn is_member(&self, conn_id: ConnId, room: &str) -> bool {
        self.read()
            .rooms
            .get(room)
            .is_some_and(|members| members.contains(&conn_id))
    }

    // Lock poisoning only happens after a panic inside one of the short
    // critical sections above, none of which call user code; recover the
    // guard rather than propagate.
    fn read(&self) -> RwLockReadGuard<'_, HubState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HubState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}
