//! Database row types, mapped directly from SQLite rows.
//! Kept separate from the chirp-types domain models.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};

use chirp_types::models::Message;

/// Fixed-width UTC timestamps sort lexicographically in creation order.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        Ok(Message {
            id: self.id.parse().with_context(|| format!("corrupt message id '{}'", self.id))?,
            sender_id: self
                .sender_id
                .parse()
                .with_context(|| format!("corrupt sender_id on message '{}'", self.id))?,
            receiver_id: self
                .receiver_id
                .parse()
                .with_context(|| format!("corrupt receiver_id on message '{}'", self.id))?,
            created_at: parse_timestamp(&self.created_at)
                .with_context(|| format!("corrupt created_at on message '{}'", self.id))?,
            content: self.content,
        })
    }
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = raw.parse::<DateTime<Utc>>() {
        return Ok(ts);
    }
    // SQLite's own datetime('now') has no timezone suffix.
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")?;
    Ok(naive.and_utc())
}
