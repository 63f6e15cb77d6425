use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use chirp_types::events::ChatEvent;

use crate::rooms::{ChannelKey, InMemoryRooms, RoomRegistry};
use crate::session::{ConnId, ConnectionState, Session};

/// Tracks live chat sockets and fans events out to room members.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Room membership, keyed by connection
    rooms: Arc<dyn RoomRegistry>,

    /// Live connections: conn_id -> outbound sender
    connections: RwLock<HashMap<ConnId, mpsc::UnboundedSender<ChatEvent>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Dispatcher backed by a process-local room registry.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(InMemoryRooms::new()))
    }

    pub fn with_registry(rooms: Arc<dyn RoomRegistry>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                rooms,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn rooms(&self) -> &dyn RoomRegistry {
        self.inner.rooms.as_ref()
    }

    /// Admit a connection for `user_id`. Returns its session and the
    /// receiving end of its outbound queue.
    pub async fn register(&self, user_id: Uuid) -> (Session, mpsc::UnboundedReceiver<ChatEvent>) {
        let conn_id = ConnId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.rooms.admit(conn_id);
        self.inner
            .connections
            .write()
            .await
            .insert(conn_id, tx);
        (Session::new(conn_id, user_id), rx)
    }

    /// Forget a connection and drop it from every room. Returns the rooms
    /// it was in.
    pub async fn unregister(&self, conn_id: ConnId) -> Vec<ChannelKey> {
        self.inner.connections.write().await.remove(&conn_id);
        self.inner.rooms.release(conn_id)
    }

    pub async fn is_connected(&self, conn_id: ConnId) -> bool {
        self.inner.connections.read().await.contains_key(&conn_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    pub async fn state(&self, conn_id: ConnId) -> ConnectionState {
        if !self.is_connected(conn_id).await {
            return ConnectionState::Disconnected;
        }
        match self.inner.rooms.room_count(conn_id) {
            0 => ConnectionState::Idle,
            n => ConnectionState::InRoom(n),
        }
    }

    /// Send a targeted event to one connection. Returns false if it is gone.
    pub async fn send_to(&self, conn_id: ConnId, event: ChatEvent) -> bool {
        let connections = self.inner.connections.read().await;
        match connections.get(&conn_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Deliver `event` to whoever is in `key` right now. Members that have
    /// already disconnected are skipped. Returns the number of deliveries.
    pub async fn emit_to_room(&self, key: &ChannelKey, event: ChatEvent) -> usize {
        let members = self.inner.rooms.members(key);
        if members.is_empty() {
            return 0;
        }

        let connections = self.inner.connections.read().await;
        let mut delivered = 0;
        for conn_id in members {
            if let Some(tx) = connections.get(&conn_id) {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        debug!("Room {} event delivered to {} connection(s)", key, delivered);
        delivered
    }
}
