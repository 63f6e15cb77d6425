use anyhow::{Result, anyhow};
use chrono::SubsecRound;
use uuid::Uuid;

use chirp_db::Database;
use chirp_db::models::format_timestamp;
use chirp_types::models::Message;

/// Who-follows-whom oracle. Queried live on every send, never cached.
pub trait FollowGraph: Send + Sync + 'static {
    fn is_following(&self, follower: Uuid, followed: Uuid) -> Result<bool>;

    /// Both directions must hold. Stops after the first missing edge.
    fn is_mutual(&self, a: Uuid, b: Uuid) -> Result<bool> {
        Ok(self.is_following(a, b)? && self.is_following(b, a)?)
    }
}

/// Durable direct-message storage.
pub trait MessageStore: Send + Sync + 'static {
    /// Persist a new message; the store assigns id and timestamp.
    fn save_message(&self, sender: Uuid, receiver: Uuid, content: &str) -> Result<Message>;

    /// Conversation between `a` and `b` in both directions, oldest first.
    fn get_messages(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>>;

    /// Returns true if a message was removed.
    fn delete_message(&self, id: Uuid) -> Result<bool>;

    fn is_sender(&self, user: Uuid, id: Uuid) -> Result<bool>;
}

impl FollowGraph for Database {
    fn is_following(&self, follower: Uuid, followed: Uuid) -> Result<bool> {
        Database::is_following(self, &follower.to_string(), &followed.to_string())
    }
}

impl MessageStore for Database {
    fn save_message(&self, sender: Uuid, receiver: Uuid, content: &str) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: sender,
            receiver_id: receiver,
            content: content.to_string(),
            // Stored with microsecond precision
            created_at: chrono::Utc::now().trunc_subsecs(6),
        };

        self.insert_message(
            &message.id.to_string(),
            &sender.to_string(),
            &receiver.to_string(),
            content,
            &format_timestamp(message.created_at),
        )?;

        Ok(message)
    }

    fn get_messages(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>> {
        self.get_messages_between(&a.to_string(), &b.to_string())?
            .into_iter()
            .map(|row| row.into_message())
            .collect()
    }

    fn delete_message(&self, id: Uuid) -> Result<bool> {
        Database::delete_message(self, &id.to_string())
    }

    fn is_sender(&self, user: Uuid, id: Uuid) -> Result<bool> {
        let sender = self.get_message_sender(&id.to_string())?;
        match sender {
            Some(sender) => {
                let sender: Uuid = sender
                    .parse()
                    .map_err(|e| anyhow!("corrupt sender_id on message '{}': {}", id, e))?;
                Ok(sender == user)
            }
            None => Ok(false),
        }
    }
}
