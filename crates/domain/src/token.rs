use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::{Timestamp, UserId};

/// 服务端保存的刷新令牌，轮换时整行替换。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub token: Uuid,
    pub user_id: UserId,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
}

impl RefreshToken {
    pub fn new(user_id: UserId, issued_at: Timestamp, expires_at: Timestamp) -> Self {
        Self {
            token: Uuid::new_v4(),
            user_id,
            issued_at,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}
