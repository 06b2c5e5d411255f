use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::{Timestamp, UserId, Username};

/// 用户角色，随访问令牌一起下发。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(UserRole::User),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// 注册用户。密码哈希由应用层的哈希服务生成。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: Timestamp,
}

impl User {
    pub fn new(username: Username, password_hash: String, role: UserRole, now: Timestamp) -> Self {
        Self {
            id: UserId::new(Uuid::new_v4()),
            username,
            password_hash,
            role,
            created_at: now,
        }
    }
}
