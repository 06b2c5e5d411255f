use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{RefreshToken, RefreshTokenRepository, RepositoryError, UserId};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::map_sqlx_error;

#[derive(Debug, FromRow)]
struct DbRefreshToken {
    token: Uuid,
    user_id: Uuid,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<DbRefreshToken> for RefreshToken {
    fn from(row: DbRefreshToken) -> Self {
        RefreshToken {
            token: row.token,
            user_id: UserId::from(row.user_id),
            issued_at: row.issued_at,
            expires_at: row.expires_at,
        }
    }
}

pub struct PgRefreshTokenRepository {
    pool: PgPool,
}

impl PgRefreshTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenRepository for PgRefreshTokenRepository {
    async fn add(&self, token: &RefreshToken) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO refresh_tokens (token, user_id, issued_at, expires_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(token.token)
        .bind(Uuid::from(token.user_id))
        .bind(token.issued_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get(&self, token: Uuid) -> Result<Option<RefreshToken>, RepositoryError> {
        let row: Option<DbRefreshToken> = sqlx::query_as(
            "SELECT token, user_id, issued_at, expires_at FROM refresh_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(RefreshToken::from))
    }

    async fn delete(&self, token: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
