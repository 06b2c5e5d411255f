use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Message, MessageContent, MessageId, MessageRepository, RepositoryError, RoomId, Timestamp,
    UserId,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::map_sqlx_error;

#[derive(Debug, FromRow)]
struct DbMessage {
    id: Uuid,
    room_id: Uuid,
    sender_id: Uuid,
    text: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DbMessage> for Message {
    type Error = RepositoryError;

    fn try_from(row: DbMessage) -> Result<Self, Self::Error> {
        Ok(Message {
            id: MessageId::from(row.id),
            room_id: RoomId::from(row.room_id),
            sender_id: UserId::from(row.sender_id),
            text: MessageContent::new(row.text)
                .map_err(|err| RepositoryError::storage(err.to_string()))?,
            created_at: row.created_at,
        })
    }
}

pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn save(&self, message: &Message) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO messages (id, room_id, sender_id, text, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.room_id))
        .bind(Uuid::from(message.sender_id))
        .bind(message.text.as_str())
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_messages_before(
        &self,
        room_id: RoomId,
        before: Option<Timestamp>,
        page_size: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows: Vec<DbMessage> = sqlx::query_as(
            "SELECT id, room_id, sender_id, text, created_at FROM messages \
             WHERE room_id = $1 AND ($2::timestamptz IS NULL OR created_at < $2) \
             ORDER BY created_at DESC \
             LIMIT $3",
        )
        .bind(Uuid::from(room_id))
        .bind(before)
        .bind(i64::from(page_size))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(Message::try_from).collect()
    }
}
