//! 认证用例服务
//!
//! 注册/登录签发访问令牌 + 刷新令牌对；刷新时轮换存储的刷新令牌。
//! 登录失败对外不区分“用户不存在”和“密码错误”。

use std::sync::Arc;

use domain::{
    DomainError, RefreshTokenRepository, User, UserRepository, UserRole, Username,
};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::password::PasswordHasher;
use crate::token::{AuthError, TokenIssuer, TokenPair};

const MIN_PASSWORD_CHARS: usize = 6;

pub struct AuthServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub refresh_token_repository: Arc<dyn RefreshTokenRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub token_issuer: Arc<dyn TokenIssuer>,
    pub clock: Arc<dyn Clock>,
}

pub struct AuthService {
    user_repository: Arc<dyn UserRepository>,
    refresh_token_repository: Arc<dyn RefreshTokenRepository>,
    password_hasher: Arc<dyn PasswordHasher>,
    token_issuer: Arc<dyn TokenIssuer>,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(deps: AuthServiceDependencies) -> Self {
        Self {
            user_repository: deps.user_repository,
            refresh_token_repository: deps.refresh_token_repository,
            password_hasher: deps.password_hasher,
            token_issuer: deps.token_issuer,
            clock: deps.clock,
        }
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenPair, ApplicationError> {
        let username = Username::parse(username)?;
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(DomainError::invalid_argument(
                "password",
                format!("could not be less than {MIN_PASSWORD_CHARS} characters"),
            )
            .into());
        }

        if self
            .user_repository
            .find_by_username(&username)
            .await?
            .is_some()
        {
            return Err(DomainError::UserAlreadyExists.into());
        }

        let password_hash = self.password_hasher.hash(password).await?;
        let user = User::new(username, password_hash, UserRole::User, self.clock.now());
        self.user_repository.create(&user).await?;

        let pair = self.token_issuer.issue(&user)?;
        self.refresh_token_repository
            .add(&pair.refresh_token)
            .await?;

        tracing::info!(user_id = %user.id, "用户注册成功");
        Ok(pair)
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenPair, ApplicationError> {
        let username =
            Username::parse(username).map_err(|_| AuthError::InvalidCredentials)?;

        let user = self
            .user_repository
            .find_by_username(&username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self
            .password_hasher
            .verify(password, &user.password_hash)
            .await?
        {
            return Err(AuthError::InvalidCredentials.into());
        }

        let pair = self.token_issuer.issue(&user)?;
        self.refresh_token_repository
            .add(&pair.refresh_token)
            .await?;

        Ok(pair)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApplicationError> {
        let token_id = refresh_token
            .parse::<uuid::Uuid>()
            .map_err(|_| DomainError::invalid_argument("refresh_token", "could not parse"))?;

        let stored = self
            .refresh_token_repository
            .get(token_id)
            .await?
            .ok_or(AuthError::UnknownRefreshToken)?;

        if stored.is_expired(self.clock.now()) {
            if let Err(err) = self.refresh_token_repository.delete(token_id).await {
                tracing::error!(error = %err, "could not delete old refresh token");
            }
            return Err(AuthError::RefreshTokenExpired.into());
        }

        let user = self
            .user_repository
            .find_by_id(stored.user_id)
            .await?
            .ok_or(DomainError::UserNotFound)?;

        let pair = self.token_issuer.issue(&user)?;
        // 轮换：旧令牌作废，新令牌入库
        self.refresh_token_repository.delete(token_id).await?;
        self.refresh_token_repository
            .add(&pair.refresh_token)
            .await?;

        Ok(pair)
    }
}
