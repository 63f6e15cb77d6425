use std::fmt;

use uuid::Uuid;

/// Opaque identifier of one chat socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(Uuid);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// An admitted connection. The user id is bound at handshake time and
/// never changes for the life of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    conn_id: ConnId,
    user_id: Uuid,
}

impl Session {
    pub(crate) fn new(conn_id: ConnId, user_id: Uuid) -> Self {
        Self { conn_id, user_id }
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }
}

/// Lifecycle of an admitted connection as seen by the registry.
///
/// `Connecting` and the handshake itself live in the upgrade handler; a
/// rejected handshake never produces a `Session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Admitted, member of no room
    Idle,
    /// Admitted, member of this many rooms
    InRoom(usize),
    /// Unregistered; no further events are handled
    Disconnected,
}
