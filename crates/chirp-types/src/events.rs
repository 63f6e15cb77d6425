use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Commands sent FROM client TO server over the chat socket.
///
/// Every field is optional on the wire: a frame that parses but is missing
/// a field is dropped by the engine, it does not close the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum ChatCommand {
    /// Join the room shared with `receiver_id`
    #[serde(rename = "join room")]
    JoinRoom { receiver_id: Option<Uuid> },

    /// Leave the room shared with `receiver_id`
    #[serde(rename = "leave room")]
    LeaveRoom { receiver_id: Option<Uuid> },

    /// Publish `msg` into the room shared with `receiver_id`
    #[serde(rename = "chat message")]
    ChatMessage {
        msg: Option<String>,
        receiver_id: Option<Uuid>,
    },

    /// Replay the stored conversation with `receiver_id` into the room
    #[serde(rename = "bring room")]
    BringRoom { receiver_id: Option<Uuid> },
}

impl ChatCommand {
    /// Wire name of the command, used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join room",
            Self::LeaveRoom { .. } => "leave room",
            Self::ChatMessage { .. } => "chat message",
            Self::BringRoom { .. } => "bring room",
        }
    }
}

/// Events sent FROM server TO client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum ChatEvent {
    /// Connection was admitted
    #[serde(rename = "ready")]
    Ready { user_id: Uuid },

    /// A message delivered into one of the connection's rooms
    #[serde(rename = "chat message")]
    ChatMessage {
        content: String,
        created_at: DateTime<Utc>,
    },

    /// Per-event failure reported to the originating connection only
    #[serde(rename = "error")]
    Error { code: String },
}
