use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use chirp_types::events::{ChatCommand, ChatEvent};
use chirp_types::models::Message;

use crate::dispatcher::Dispatcher;
use crate::rooms::{ChannelKey, JoinResult, channel_key};
use crate::session::Session;
use crate::store::{FollowGraph, MessageStore};

/// Per-event failure surfaced to the caller of [`ChatEngine::handle`].
#[derive(Debug, Error)]
pub enum ChatError {
    /// Persisting a message failed; nothing was broadcast.
    #[error("DELIVERY_CONFLICT: {0}")]
    DeliveryConflict(#[source] anyhow::Error),
}

impl ChatError {
    /// Stable code reported to the originating connection.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DeliveryConflict(_) => "DELIVERY_CONFLICT",
        }
    }
}

/// Why an event was dropped without effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Payload lacked a required field
    MissingField(&'static str),
    /// Sender never joined the room it published into
    NotMember,
    /// The two users do not follow each other
    PrivacyGateDenied,
    /// Conversation history could not be read
    StoreUnavailable,
    /// Event arrived after the connection was torn down
    Disconnected,
}

/// What handling an event did. Never sent to the client; drops stay
/// silent on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Joined { key: ChannelKey, already_member: bool },
    Left { key: ChannelKey, was_member: bool },
    Delivered { message: Message, recipients: usize },
    Replayed { messages: usize, recipients: usize },
    Dropped(DropReason),
}

/// Realtime delivery state machine: membership checks, the mutual-follow
/// gate, persistence and room fan-out.
#[derive(Clone)]
pub struct ChatEngine {
    dispatcher: Dispatcher,
    follows: Arc<dyn FollowGraph>,
    messages: Arc<dyn MessageStore>,
}

impl ChatEngine {
    pub fn new(
        dispatcher: Dispatcher,
        follows: Arc<dyn FollowGraph>,
        messages: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            dispatcher,
            follows,
            messages,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Admit an authenticated user. The returned receiver carries every
    /// event addressed to the new connection.
    pub async fn connect(&self, user_id: Uuid) -> (Session, mpsc::UnboundedReceiver<ChatEvent>) {
        let (session, rx) = self.dispatcher.register(user_id).await;
        info!("{} ({}) connected to chat", user_id, session.conn_id());
        (session, rx)
    }

    /// Release every room the connection holds. Later events for the
    /// session are dropped.
    pub async fn disconnect(&self, session: &Session) {
        let rooms = self.dispatcher.unregister(session.conn_id()).await;
        info!(
            "{} ({}) disconnected from chat, released {} room(s)",
            session.user_id(),
            session.conn_id(),
            rooms.len()
        );
    }

    /// Handle one inbound command. Only a failed write during send is an
    /// error; everything else is logged and reported as an [`Outcome`].
    pub async fn handle(&self, session: &Session, cmd: ChatCommand) -> Result<Outcome, ChatError> {
        if !self.dispatcher.is_connected(session.conn_id()).await {
            return Ok(dropped(session, cmd.name(), DropReason::Disconnected));
        }

        let outcome = match cmd {
            ChatCommand::JoinRoom { receiver_id } => self.join(session, receiver_id),
            ChatCommand::LeaveRoom { receiver_id } => self.leave(session, receiver_id),
            ChatCommand::ChatMessage { msg, receiver_id } => {
                self.send(session, msg, receiver_id).await?
            }
            ChatCommand::BringRoom { receiver_id } => self.bring_room(session, receiver_id).await,
        };
        Ok(outcome)
    }

    pub fn join(&self, session: &Session, peer: Option<Uuid>) -> Outcome {
        let (user, peer) = match identities(session, peer) {
            Ok(ids) => ids,
            Err(reason) => return dropped(session, "join room", reason),
        };

        let key = channel_key(user, peer);
        let already_member = match self.dispatcher.rooms().join(session.conn_id(), &key) {
            JoinResult::Added => false,
            JoinResult::AlreadyMember => true,
            // Released between the liveness check and the join
            JoinResult::NotAdmitted => {
                return dropped(session, "join room", DropReason::Disconnected);
            }
        };
        debug!("{} ({}) joined room {}", user, session.conn_id(), key);
        Outcome::Joined {
            key,
            already_member,
        }
    }

    pub fn leave(&self, session: &Session, peer: Option<Uuid>) -> Outcome {
        let (user, peer) = match identities(session, peer) {
            Ok(ids) => ids,
            Err(reason) => return dropped(session, "leave room", reason),
        };

        let key = channel_key(user, peer);
        let was_member = self.dispatcher.rooms().leave(session.conn_id(), &key);
        debug!("{} ({}) left room {}", user, session.conn_id(), key);
        Outcome::Left { key, was_member }
    }

    /// Publish `content` into the room shared with `peer`.
    ///
    /// The sender must have joined that room on this connection and both
    /// users must follow each other. The broadcast goes to the members
    /// present once the write has completed.
    pub async fn send(
        &self,
        session: &Session,
        content: Option<String>,
        peer: Option<Uuid>,
    ) -> Result<Outcome, ChatError> {
        let (sender, peer) = match identities(session, peer) {
            Ok(ids) => ids,
            Err(reason) => return Ok(dropped(session, "chat message", reason)),
        };
        let Some(content) = content.filter(|c| !c.is_empty()) else {
            return Ok(dropped(session, "chat message", DropReason::MissingField("msg")));
        };

        let key = channel_key(sender, peer);
        if !self.dispatcher.rooms().is_member(session.conn_id(), &key) {
            return Ok(dropped(session, "chat message", DropReason::NotMember));
        }

        if !self.mutual_follow(sender, peer).await {
            return Ok(dropped(session, "chat message", DropReason::PrivacyGateDenied));
        }

        // Persist and broadcast in a task of its own: once the write has
        // started, cancelling the caller must not lose the broadcast.
        let store = self.messages.clone();
        let dispatcher = self.dispatcher.clone();
        let delivery = tokio::spawn(async move {
            let message =
                tokio::task::spawn_blocking(move || store.save_message(sender, peer, &content))
                    .await
                    .map_err(|e| {
                        error!("spawn_blocking join error: {}", e);
                        ChatError::DeliveryConflict(e.into())
                    })?
                    .map_err(|e| {
                        error!("Failed to persist message {} -> {}: {}", sender, peer, e);
                        ChatError::DeliveryConflict(e)
                    })?;

            let recipients = dispatcher
                .emit_to_room(
                    &key,
                    ChatEvent::ChatMessage {
                        content: message.content.clone(),
                        created_at: message.created_at,
                    },
                )
                .await;

            info!(
                "{} -> {} message {} delivered to {} connection(s)",
                sender, peer, message.id, recipients
            );
            Ok::<_, ChatError>((message, recipients))
        });

        let (message, recipients) = delivery.await.map_err(|e| {
            error!("Delivery task join error: {}", e);
            ChatError::DeliveryConflict(e.into())
        })??;

        Ok(Outcome::Delivered { message, recipients })
    }

    /// Replay the stored conversation with `peer` into their shared room.
    /// Every current member receives the replay, not only the requester.
    pub async fn bring_room(&self, session: &Session, peer: Option<Uuid>) -> Outcome {
        let (user, peer) = match identities(session, peer) {
            Ok(ids) => ids,
            Err(reason) => return dropped(session, "bring room", reason),
        };

        let store = self.messages.clone();
        let history = match tokio::task::spawn_blocking(move || store.get_messages(user, peer)).await {
            Ok(Ok(history)) => history,
            Ok(Err(e)) => {
                warn!("Failed to load history {} <-> {}: {}", user, peer, e);
                return dropped(session, "bring room", DropReason::StoreUnavailable);
            }
            Err(e) => {
                error!("spawn_blocking join error: {}", e);
                return dropped(session, "bring room", DropReason::StoreUnavailable);
            }
        };

        let key = channel_key(user, peer);
        let mut recipients = 0;
        for message in &history {
            recipients += self
                .dispatcher
                .emit_to_room(
                    &key,
                    ChatEvent::ChatMessage {
                        content: message.content.clone(),
                        created_at: message.created_at,
                    },
                )
                .await;
        }

        debug!(
            "{} ({}) replayed {} message(s) into room {}",
            user,
            session.conn_id(),
            history.len(),
            key
        );
        Outcome::Replayed {
            messages: history.len(),
            recipients,
        }
    }

    /// Fails closed: a lookup error counts as "not mutual".
    async fn mutual_follow(&self, a: Uuid, b: Uuid) -> bool {
        let follows = self.follows.clone();
        match tokio::task::spawn_blocking(move || follows.is_mutual(a, b)).await {
            Ok(Ok(mutual)) => mutual,
            Ok(Err(e)) => {
                warn!("Follow lookup failed for {} / {}: {}", a, b, e);
                false
            }
            Err(e) => {
                error!("spawn_blocking join error: {}", e);
                false
            }
        }
    }
}

fn identities(session: &Session, peer: Option<Uuid>) -> Result<(Uuid, Uuid), DropReason> {
    let user = Some(session.user_id())
        .filter(|id| !id.is_nil())
        .ok_or(DropReason::MissingField("senderId"))?;
    let peer = peer
        .filter(|id| !id.is_nil())
        .ok_or(DropReason::MissingField("receiverId"))?;
    Ok((user, peer))
}

fn dropped(session: &Session, event: &str, reason: DropReason) -> Outcome {
    match reason {
        // Relationship state is only ever logged at debug
        DropReason::PrivacyGateDenied => debug!(
            "{} ({}) '{}' dropped: {:?}",
            session.user_id(),
            session.conn_id(),
            event,
            reason
        ),
        _ => warn!(
            "{} ({}) '{}' dropped: {:?}",
            session.user_id(),
            session.conn_id(),
            event,
            reason
        ),
    }
    Outcome::Dropped(reason)
}
