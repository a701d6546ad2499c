// src/handlers/auth.rs
use crate::error::ApiError;
use crate::models::user::User;
use crate::AppState;
use axum::{
    extract::Extension,
    routing::{post, Router},
    Json,
};
use bcrypt::DEFAULT_COST;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn auth_routes() -> Router {
    Router::new().route("/login", post(login))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub exp: usize,
    pub iat: usize,
}

pub fn hash_password(plain: &str) -> Result<String, ApiError> {
    bcrypt::hash(plain, DEFAULT_COST)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))
}

pub fn verify_password(plain: &str, hashed: &str) -> Result<bool, ApiError> {
    bcrypt::verify(plain, hashed)
        .map_err(|e| ApiError::Internal(format!("password verification failed: {}", e)))
}

/// Issue an HS256 token carrying the user id, valid for `ttl_minutes`.
/// Pure function of its inputs and the clock.
pub fn create_access_token(
    user_id: i32,
    secret: &str,
    ttl_minutes: i64,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp() as usize,
        exp: (now + Duration::minutes(ttl_minutes)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("failed to sign token: {}", e)))
}

/// Validate signature and expiry, then recover the embedded user id.
pub fn verify_access_token(token: &str, secret: &str) -> Result<i32, ApiError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("token rejected: {}", e);
        ApiError::Unauthenticated("Invalid or expired token".to_string())
    })?;

    token_data
        .claims
        .sub
        .parse::<i32>()
        .map_err(|_| ApiError::Unauthenticated("Invalid or expired token".to_string()))
}

async fn login(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&payload.email)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| ApiError::Unauthenticated("Invalid email or password".to_string()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(ApiError::Unauthenticated(
            "Invalid email or password".to_string(),
        ));
    }

    let token = create_access_token(
        user.id,
        &state.config.jwt_secret,
        state.config.token_ttl_minutes,
    )?;

    tracing::info!(user_id = user.id, "user logged in");

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_round_trip() {
        let token = create_access_token(42, SECRET, 30).unwrap();
        let user_id = verify_access_token(&token, SECRET).unwrap();
        assert_eq!(user_id, 42);
    }

    #[test]
    fn test_token_rejected_with_wrong_secret() {
        let token = create_access_token(42, SECRET, 30).unwrap();
        let err = verify_access_token(&token, "other-secret").unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(_)));
    }

    #[test]
    fn test_expired_token_rejected() {
        // Well past the default decode leeway
        let token = create_access_token(42, SECRET, -5).unwrap();
        let err = verify_access_token(&token, SECRET).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(_)));
    }

    #[test]
    fn test_malformed_token_rejected() {
        let err = verify_access_token("not.a.token", SECRET).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(_)));
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("hunter3", &hash).unwrap());
    }
}
