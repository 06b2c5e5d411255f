//! 基础设施层
//!
//! 应用层抽象的具体实现：PostgreSQL 仓储、JWT 令牌管理、
//! bcrypt 密码哈希、Redis Pub/Sub 扇出适配器。

pub mod db;
pub mod jwt;
pub mod password;
pub mod redis;

pub use db::{
    create_pg_pool, PgMessageRepository, PgRefreshTokenRepository, PgRoomRepository,
    PgUserRepository,
};
pub use jwt::JwtManager;
pub use password::BcryptPasswordHasher;
pub use self::redis::{spawn_fanout_listener, RedisFanout};
