//! 访问令牌的签发与校验抽象
//!
//! 具体实现（JWT）在基础设施层；应用层只依赖校验结果中的
//! 身份、角色与过期时间。

use domain::{RefreshToken, Timestamp, User, UserId, UserRole};
use thiserror::Error;

/// 校验通过的访问令牌声明。
///
/// `expires_at` 在流注册时被固化进会话，同一条流后续不再刷新。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    pub subject: UserId,
    pub role: UserRole,
    pub expires_at: Timestamp,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("authorization token is invalid")]
    InvalidToken,
    #[error("authorization token is expired")]
    TokenExpired,
    #[error("incorrect username or password")]
    InvalidCredentials,
    #[error("refresh token does not exist")]
    UnknownRefreshToken,
    #[error("refresh token is expired")]
    RefreshTokenExpired,
    #[error("could not generate token pair")]
    Generation,
}

/// 签发后的令牌对：短期访问令牌 + 服务端保存的刷新令牌。
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: RefreshToken,
}

pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<AccessClaims, AuthError>;
}

pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user: &User) -> Result<TokenPair, AuthError>;
}
