//! JWT 认证模块
//!
//! 路由只校验 Bearer token 并取出用户 ID。token 由账号服务签发，
//! `TokenIssuer` 仅用于测试和 `--in-memory` 演示模式。

use axum::http::{header::AUTHORIZATION, HeaderMap};
use config::JwtConfig;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub exp: i64, // Unix timestamp
}

/// 校验 HS256 token，过期或签名不符都视为未认证
#[derive(Clone)]
pub struct JwtService {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Uuid, ApiError> {
        let token = bearer_token(headers)?;
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.user_id)
            .map_err(|err| ApiError::unauthorized(format!("invalid token: {err}")))
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("invalid authorization header format"))
}

/// 用同一密钥签发 token
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    ttl: chrono::Duration,
}

impl TokenIssuer {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            ttl: chrono::Duration::hours(config.expiration_hours),
        }
    }

    pub fn issue(&self, user_id: Uuid) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            user_id,
            exp: (chrono::Utc::now() + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }
}
