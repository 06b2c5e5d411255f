//! PostgreSQL 仓储实现

pub mod message_repository;
pub mod refresh_token_repository;
pub mod room_repository;
pub mod user_repository;

pub use message_repository::PgMessageRepository;
pub use refresh_token_repository::PgRefreshTokenRepository;
pub use room_repository::PgRoomRepository;
pub use user_repository::PgUserRepository;

use domain::RepositoryError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub async fn create_pg_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
}

/// postgres 唯一约束冲突的 SQLSTATE。
const UNIQUE_VIOLATION: &str = "23505";

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db_err)
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
        {
            RepositoryError::Conflict
        }
        _ => RepositoryError::storage(err.to_string()),
    }
}
