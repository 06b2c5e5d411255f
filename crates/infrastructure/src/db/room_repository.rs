//! 房间仓储
//!
//! 对话房间的唯一性由 `rooms.dialog_key`（无序用户对的规范化键）上的
//! 唯一索引保证；`create_dialog_room` 用 `ON CONFLICT DO NOTHING` 在
//! 单个事务里区分“创建成功”与“并发竞争中已被抢先创建”。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    DialogRoomOutcome, RepositoryError, Room, RoomId, RoomRepository, Timestamp, UserId,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::map_sqlx_error;

#[derive(Debug, FromRow)]
struct DbRoom {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    is_dialog: bool,
    last_message_time: DateTime<Utc>,
    member_ids: Vec<Uuid>,
}

impl From<DbRoom> for Room {
    fn from(row: DbRoom) -> Self {
        Room {
            id: RoomId::from(row.id),
            name: row.name,
            created_at: row.created_at,
            is_dialog: row.is_dialog,
            member_ids: row.member_ids.into_iter().map(UserId::from).collect(),
            last_message_time: row.last_message_time,
        }
    }
}

const SELECT_ROOM: &str = "\
    SELECT r.id, r.name, r.created_at, r.is_dialog, r.last_message_time, \
           array_agg(m.user_id) AS member_ids \
    FROM rooms r \
    INNER JOIN room_members m ON r.id = m.room_id";

pub struct PgRoomRepository {
    pool: PgPool,
}

impl PgRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_members(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        room: &Room,
    ) -> Result<(), sqlx::Error> {
        for member in &room.member_ids {
            sqlx::query("INSERT INTO room_members (room_id, user_id) VALUES ($1, $2)")
                .bind(Uuid::from(room.id))
                .bind(Uuid::from(*member))
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn fetch_by_dialog_key(&self, key: &str) -> Result<Option<Room>, RepositoryError> {
        let row: Option<DbRoom> = sqlx::query_as(&format!(
            "{SELECT_ROOM} WHERE r.dialog_key = $1 GROUP BY r.id"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(Room::from))
    }
}

#[async_trait]
impl RoomRepository for PgRoomRepository {
    async fn create(&self, room: &Room) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            "INSERT INTO rooms (id, name, created_at, is_dialog, dialog_key, last_message_time) \
             VALUES ($1, $2, $3, $4, NULL, $5)",
        )
        .bind(Uuid::from(room.id))
        .bind(&room.name)
        .bind(room.created_at)
        .bind(room.is_dialog)
        .bind(room.last_message_time)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Self::insert_members(&mut tx, room)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn create_dialog_room(
        &self,
        room: &Room,
    ) -> Result<DialogRoomOutcome, RepositoryError> {
        let key = Room::dialog_key(room.member_ids[0], room.member_ids[1]);

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            "INSERT INTO rooms (id, name, created_at, is_dialog, dialog_key, last_message_time) \
             VALUES ($1, $2, $3, TRUE, $4, $5) \
             ON CONFLICT (dialog_key) DO NOTHING \
             RETURNING id",
        )
        .bind(Uuid::from(room.id))
        .bind(&room.name)
        .bind(room.created_at)
        .bind(&key)
        .bind(room.last_message_time)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        match inserted {
            Some(_) => {
                Self::insert_members(&mut tx, room)
                    .await
                    .map_err(map_sqlx_error)?;
                tx.commit().await.map_err(map_sqlx_error)?;
                Ok(DialogRoomOutcome::Created(room.clone()))
            }
            None => {
                // 竞争失败：对话房间已被并发请求创建，取回现有的那个
                tx.rollback().await.map_err(map_sqlx_error)?;
                let existing = self
                    .fetch_by_dialog_key(&key)
                    .await?
                    .ok_or(RepositoryError::NotFound)?;
                Ok(DialogRoomOutcome::AlreadyExists(existing))
            }
        }
    }

    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        let row: Option<DbRoom> =
            sqlx::query_as(&format!("{SELECT_ROOM} WHERE r.id = $1 GROUP BY r.id"))
                .bind(Uuid::from(id))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(row.map(Room::from))
    }

    async fn find_dialog_room(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Room>, RepositoryError> {
        self.fetch_by_dialog_key(&Room::dialog_key(a, b)).await
    }

    async fn members(&self, id: RoomId) -> Result<Vec<UserId>, RepositoryError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM room_members WHERE room_id = $1")
                .bind(Uuid::from(id))
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(|(id,)| UserId::from(id)).collect())
    }

    async fn touch_last_message(&self, id: RoomId, at: Timestamp) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE rooms SET last_message_time = GREATEST(last_message_time, $2) WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_rooms_before(
        &self,
        user_id: UserId,
        before: Option<Timestamp>,
        page_size: u32,
    ) -> Result<Vec<Room>, RepositoryError> {
        let rows: Vec<DbRoom> = sqlx::query_as(&format!(
            "{SELECT_ROOM} \
             WHERE r.id IN (SELECT room_id FROM room_members WHERE user_id = $1) \
               AND ($2::timestamptz IS NULL OR r.last_message_time < $2) \
             GROUP BY r.id \
             ORDER BY r.last_message_time DESC \
             LIMIT $3"
        ))
        .bind(Uuid::from(user_id))
        .bind(before)
        .bind(i64::from(page_size))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Room::from).collect())
    }
}
