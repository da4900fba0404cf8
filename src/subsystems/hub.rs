//! Room hub: per-room broadcast groups for live game events.
//!
//! Each room PIN maps to one `tokio::sync::broadcast` channel. Sockets
//! subscribe to the rooms they care about; HTTP handlers and sockets publish
//! into them. Delivery is fire-and-forget.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::error::AppError;
use crate::subsystems::runtime::{Component, ComponentFuture};

const DEFAULT_CAPACITY: usize = 64;

/// Server → client notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum GameEvent {
    PlayerJoined { nickname: String },
    GameStarted,
    PlayerAnswered {
        #[serde(rename = "playerName")]
        player_name: String,
    },
    GameFinished,
    /// Sent only to the socket whose message could not be handled.
    Error { message: String },
}

/// Client → server message on the websocket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action")]
pub enum ClientMessage {
    JoinRoomGroup {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    StartGame {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    SendProgress {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "playerName")]
        player_name: String,
    },
}

pub struct GameHub {
    rooms: RwLock<HashMap<String, broadcast::Sender<GameEvent>>>,
    capacity: usize,
}

impl Default for GameHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl GameHub {
    pub fn new(capacity: usize) -> Self {
        Self { rooms: RwLock::new(HashMap::new()), capacity: capacity.max(1) }
    }

    /// Join a room's group, creating it on first use.
    pub async fn subscribe(&self, room: &str) -> broadcast::Receiver<GameEvent> {
        if let Some(tx) = self.rooms.read().await.get(room) {
            return tx.subscribe();
        }
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room.to_string())
            .or_insert_with(|| {
                debug!(room, "room group created");
                broadcast::channel(self.capacity).0
            })
            .subscribe()
    }

    /// Send `event` to everyone in `room`. Returns how many receivers got it;
    /// an unknown or empty room yields 0.
    pub async fn publish(&self, room: &str, event: GameEvent) -> usize {
        let rooms = self.rooms.read().await;
        let Some(tx) = rooms.get(room) else {
            trace!(room, ?event, "no listeners for room");
            return 0;
        };
        let delivered = tx.send(event).unwrap_or(0);
        trace!(room, delivered, "event published");
        delivered
    }

    /// Drop groups nobody listens to any more. Returns how many were removed.
    pub async fn prune(&self) -> usize {
        let mut rooms = self.rooms.write().await;
        let before = rooms.len();
        rooms.retain(|_, tx| tx.receiver_count() > 0);
        before - rooms.len()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

/// Periodically prunes idle room groups until shutdown.
pub struct HubJanitor {
    hub: std::sync::Arc<GameHub>,
    interval: Duration,
}

impl HubJanitor {
    pub fn new(hub: std::sync::Arc<GameHub>, interval: Duration) -> Self {
        Self { hub, interval }
    }
}

impl Component for HubJanitor {
    fn id(&self) -> &str {
        "hub-janitor"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.hub.prune().await;
                        if removed > 0 {
                            debug!(removed, "pruned idle room groups");
                        }
                    }
                }
            }
            info!("hub janitor stopped");
            Ok::<(), AppError>(())
        })
    }
}
