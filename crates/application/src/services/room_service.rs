//! 房间用例服务

use std::sync::Arc;

use domain::{DomainError, Room, RoomRepository, UserId};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::page_token::{decode_page_token, encode_page_token};
use crate::services::message_service::MAX_PAGE_SIZE;

#[derive(Debug, Clone)]
pub struct RoomPage {
    pub rooms: Vec<Room>,
    pub next_page_token: Option<String>,
}

pub struct RoomService {
    room_repository: Arc<dyn RoomRepository>,
    clock: Arc<dyn Clock>,
}

impl RoomService {
    pub fn new(room_repository: Arc<dyn RoomRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            room_repository,
            clock,
        }
    }

    /// 显式创建房间。创建者总是成员；对话房间去重到已有的那个。
    pub async fn create_room(
        &self,
        creator: UserId,
        name: impl Into<String>,
        mut member_ids: Vec<UserId>,
        is_dialog: bool,
    ) -> Result<Room, ApplicationError> {
        if !member_ids.contains(&creator) {
            member_ids.push(creator);
        }
        let mut seen = std::collections::HashSet::new();
        member_ids.retain(|id| seen.insert(*id));

        let room = Room::new(name, is_dialog, member_ids, self.clock.now())?;

        if is_dialog {
            let outcome = self.room_repository.create_dialog_room(&room).await?;
            return Ok(outcome.into_room());
        }

        self.room_repository.create(&room).await?;
        tracing::info!(room_id = %room.id, "房间已创建");
        Ok(room)
    }

    /// 按 `last_message_time` 倒序分页列出用户的房间。
    pub async fn list_rooms(
        &self,
        user_id: UserId,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<RoomPage, ApplicationError> {
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(DomainError::invalid_argument(
                "page_size",
                format!("cannot be bigger than {MAX_PAGE_SIZE}"),
            )
            .into());
        }

        let before = page_token.map(decode_page_token).transpose()?;
        let rooms = self
            .room_repository
            .list_rooms_before(user_id, before, page_size)
            .await?;

        let next_page_token = if rooms.len() == page_size as usize {
            rooms.last().map(|r| encode_page_token(r.last_message_time))
        } else {
            None
        };

        Ok(RoomPage {
            rooms,
            next_page_token,
        })
    }
}
