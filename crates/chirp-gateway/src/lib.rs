//! Chirp realtime gateway: authenticated chat sockets, pair rooms and
//! follow-gated message delivery.

pub mod auth;
pub mod connection;
pub mod dispatcher;
pub mod engine;
pub mod rooms;
pub mod session;
pub mod store;

pub use auth::{AuthError, Handshake, TokenKeys};
pub use dispatcher::Dispatcher;
pub use engine::{ChatEngine, ChatError, DropReason, Outcome};
pub use rooms::{ChannelKey, InMemoryRooms, JoinResult, RoomRegistry, channel_key};
pub use session::{ConnId, ConnectionState, Session};
pub use store::{FollowGraph, MessageStore};
