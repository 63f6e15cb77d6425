use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{PoisonError, RwLock};

use uuid::Uuid;

use crate::session::ConnId;

/// Separator between the two identities of a room key. Never produced by
/// the hyphenated UUID form.
pub const KEY_SEPARATOR: char = ':';

/// Canonical name of the room shared by two users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey(String);

impl ChannelKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order-independent room key: `channel_key(a, b) == channel_key(b, a)`.
pub fn channel_key(a: Uuid, b: Uuid) -> ChannelKey {
    let (a, b) = (a.to_string(), b.to_string());
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    ChannelKey(format!("{}{}{}", low, KEY_SEPARATOR, high))
}

/// Result of [`RoomRegistry::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinResult {
    Added,
    AlreadyMember,
    /// The connection was never admitted or has been released
    NotAdmitted,
}

/// Room membership table.
///
/// Rooms have no lifecycle of their own: a room exists while it has at
/// least one member. Implementations must apply each call atomically with
/// respect to the others.
pub trait RoomRegistry: Send + Sync {
    /// Make `conn` eligible to join rooms.
    fn admit(&self, conn: ConnId);

    /// Add `conn` to `key`. A connection that is not admitted, including
    /// one already released, never becomes a member.
    fn join(&self, conn: ConnId, key: &ChannelKey) -> JoinResult;

    /// Remove `conn` from `key`. Returns false if it was not a member.
    fn leave(&self, conn: ConnId, key: &ChannelKey) -> bool;

    fn is_member(&self, conn: ConnId, key: &ChannelKey) -> bool;

    /// Current members of `key`, read at call time.
    fn members(&self, key: &ChannelKey) -> Vec<ConnId>;

    /// Number of rooms `conn` belongs to.
    fn room_count(&self, conn: ConnId) -> usize;

    /// Remove `conn` from every room and revoke its admission. Returns the
    /// rooms it left.
    fn release(&self, conn: ConnId) -> Vec<ChannelKey>;
}

/// Process-local registry. Critical sections never await, so a plain
/// lock is enough on a multi-threaded runtime.
#[derive(Default)]
pub struct InMemoryRooms {
    table: RwLock<RoomTable>,
}

#[derive(Default)]
struct RoomTable {
    /// room -> connections in it
    members: HashMap<ChannelKey, HashSet<ConnId>>,
    /// admitted connection -> rooms it joined
    memberships: HashMap<ConnId, HashSet<ChannelKey>>,
}

impl RoomTable {
    fn remove(&mut self, conn: ConnId, key: &ChannelKey) -> bool {
        let Some(room) = self.members.get_mut(key) else {
            return false;
        };
        let removed = room.remove(&conn);
        if room.is_empty() {
            self.members.remove(key);
        }
        removed
    }
}

impl InMemoryRooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rooms with at least one member.
    pub fn room_total(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .members
            .len()
    }
}

impl RoomRegistry for InMemoryRooms {
    fn admit(&self, conn: ConnId) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .memberships
            .entry(conn)
            .or_default();
    }

    fn join(&self, conn: ConnId, key: &ChannelKey) -> JoinResult {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let Some(rooms) = table.memberships.get_mut(&conn) else {
            return JoinResult::NotAdmitted;
        };
        rooms.insert(key.clone());
        if table.members.entry(key.clone()).or_default().insert(conn) {
            JoinResult::Added
        } else {
            JoinResult::AlreadyMember
        }
    }

    fn leave(&self, conn: ConnId, key: &ChannelKey) -> bool {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(rooms) = table.memberships.get_mut(&conn) {
            rooms.remove(key);
        }
        table.remove(conn, key)
    }

    fn is_member(&self, conn: ConnId, key: &ChannelKey) -> bool {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .members
            .get(key)
            .is_some_and(|room| room.contains(&conn))
    }

    fn members(&self, key: &ChannelKey) -> Vec<ConnId> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .members
            .get(key)
            .map(|room| room.iter().copied().collect())
            .unwrap_or_default()
    }

    fn room_count(&self, conn: ConnId) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .memberships
            .get(&conn)
            .map_or(0, HashSet::len)
    }

    fn release(&self, conn: ConnId) -> Vec<ChannelKey> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let rooms: Vec<ChannelKey> = table
            .memberships
            .remove(&conn)
            .map(|rooms| rooms.into_iter().collect())
            .unwrap_or_default();
        for key in &rooms {
            table.remove(conn, key);
        }
        rooms
    }
}
