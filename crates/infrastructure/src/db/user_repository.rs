use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{RepositoryError, User, UserId, UserRepository, UserRole, Username};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::map_sqlx_error;

#[derive(Debug, FromRow)]
struct DbUser {
    id: Uuid,
    username: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DbUser> for User {
    type Error = RepositoryError;

    fn try_from(row: DbUser) -> Result<Self, Self::Error> {
        Ok(User {
            id: UserId::from(row.id),
            username: Username::parse(row.username)
                .map_err(|err| RepositoryError::storage(err.to_string()))?,
            password_hash: row.password_hash,
            role: UserRole::parse(&row.role)
                .ok_or_else(|| RepositoryError::storage(format!("unknown role: {}", row.role)))?,
            created_at: row.created_at,
        })
    }
}

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: &User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, role, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::from(user.id))
        .bind(user.username.as_str())
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row: Option<DbUser> = sqlx::query_as(
            "SELECT id, username, password_hash, role, created_at FROM users WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError> {
        let row: Option<DbUser> = sqlx::query_as(
            "SELECT id, username, password_hash, role, created_at FROM users WHERE username = $1",
        )
        .bind(username.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.map(User::try_from).transpose()
    }
}
