use std::future::Future;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::error::CoreError;

use super::PERSONAL_ROOM;

pub const MAX_MESSAGE_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub room_id: String,
    pub username: String,
    #[serde(rename = "message")]
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Append-only chat history, keyed by room.
pub trait MessageStore: Clone + Send + Sync + 'static {
    fn append(
        &self,
        room_id: &str,
        username: &str,
        content: &str,
    ) -> impl Future<Output = Result<Message, CoreError>> + Send;

    /// At most `limit` of the newest messages in `room_id`, oldest first.
    fn recent_history(
        &self,
        room_id: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Message>, CoreError>> + Send;
}

pub fn validate(room_id: &str, username: &str, content: &str) -> Result<(), CoreError> {
    if room_id == PERSONAL_ROOM {
        return Err(CoreError::validation("messages to @me are not stored"));
    }
    if room_id.trim().is_empty() {
        return Err(CoreError::validation("room id is required"));
    }
    if username.is_empty() {
        return Err(CoreError::validation("username is required"));
    }
    if content.is_empty() {
        return Err(CoreError::validation("message is empty"));
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(CoreError::validation(format!(
            "message exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct SqliteMessageStore {
    db_pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }
}

impl MessageStore for SqliteMessageStore {
    async fn append(&self, room_id: &str, username: &str, content: &str) -> Result<Message, CoreError> {
        validate(room_id, username, content)?;

        let id = Uuid::now_v7();
        let created_at = unix_millis(OffsetDateTime::now_utc());
        sqlx::query("INSERT INTO messages (id,room_id,username,content,created_at) values (?,?,?,?,?)")
            .bind(id.to_string())
            .bind(room_id)
            .bind(username)
            .bind(content)
            .bind(created_at)
            .execute(&self.db_pool)
            .await?;

        debug!(%id, room = room_id, "message appended");
        Ok(Message {
            id,
            room_id: room_id.to_owned(),
            username: username.to_owned(),
            content: content.to_owned(),
            timestamp: from_unix_millis(created_at)?,
        })
    }

    async fn recent_history(&self, room_id: &str, limit: u32) -> Result<Vec<Message>, CoreError> {
        if room_id.trim().is_empty() {
            return Err(CoreError::NotFound("room".to_owned()));
        }

        let rows: Vec<(String, String, String, i64)> = sqlx::query_as(
            "SELECT id,username,content,created_at FROM messages WHERE room_id=? \
             ORDER BY created_at DESC, seq DESC LIMIT ?",
        )
        .bind(room_id)
        .bind(i64::from(limit))
        .fetch_all(&self.db_pool)
        .await?;

        let mut messages = rows
            .into_iter()
            .map(|(id, username, content, created_at)| -> Result<Message, CoreError> {
                Ok(Message {
                    id: Uuid::parse_str(&id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
                    room_id: room_id.to_owned(),
                    username,
                    content,
                    timestamp: from_unix_millis(created_at)?,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        messages.reverse();
        Ok(messages)
    }
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_unix_millis(millis: i64) -> Result<OffsetDateTime, CoreError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|e| CoreError::Persistence(sqlx::Error::Decode(Box::new(e))))
}
