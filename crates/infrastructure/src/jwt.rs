//! JWT 令牌管理
//!
//! HS256 访问令牌携带身份、角色与过期时间；刷新令牌是服务端保存的
//! 不透明 UUID，由仓储负责持久化与轮换。

use application::{AccessClaims, AuthError, TokenIssuer, TokenPair, TokenVerifier};
use chrono::{DateTime, Utc};
use domain::{RefreshToken, User, UserId, UserRole};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// 访问令牌的 JWT 声明。
#[derive(Debug, Serialize, Deserialize)]
struct JwtClaims {
    sub: String,
    role: String,
    iat: i64,
    exp: i64,
}

pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_ttl: chrono::Duration,
    refresh_token_ttl: chrono::Duration,
}

impl JwtManager {
    pub fn new(
        secret: &str,
        access_token_ttl: chrono::Duration,
        refresh_token_ttl: chrono::Duration,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_ttl,
            refresh_token_ttl,
        }
    }
}

impl TokenIssuer for JwtManager {
    fn issue(&self, user: &User) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let expires_at = now + self.access_token_ttl;
        let claims = JwtClaims {
            sub: user.id.to_string(),
            role: user.role.as_str().to_owned(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let access_token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| AuthError::Generation)?;

        Ok(TokenPair {
            access_token,
            refresh_token: RefreshToken::new(user.id, now, now + self.refresh_token_ttl),
        })
    }
}

impl TokenVerifier for JwtManager {
    fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let data = decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })?;

        let subject = data
            .claims
            .sub
            .parse::<uuid::Uuid>()
            .map(UserId::from)
            .map_err(|_| AuthError::InvalidToken)?;
        let role = UserRole::parse(&data.claims.role).ok_or(AuthError::InvalidToken)?;
        let expires_at: DateTime<Utc> = DateTime::from_timestamp(data.claims.exp, 0)
            .ok_or(AuthError::InvalidToken)?;

        Ok(AccessClaims {
            subject,
            role,
            expires_at,
        })
    }
}
