// src/middleware/auth.rs
use crate::error::ApiError;
use crate::handlers::auth::verify_access_token;
use crate::models::user::User;
use crate::AppState;
use axum::{
    extract::{Extension, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Resolves the bearer token to an existing user and stores it in the
/// request extensions. A valid token naming a deleted user is still a 401.
pub async fn auth_middleware(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| ApiError::Unauthenticated("Missing Authorization header".to_string()))?;

    let auth_str = auth_header.to_str().map_err(|_| {
        ApiError::Unauthenticated("Invalid Authorization header format".to_string())
    })?;

    let token = auth_str.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::Unauthenticated(
            "Invalid Authorization header format. Expected 'Bearer <token>'".to_string(),
        )
    })?;

    let user_id = verify_access_token(token, &state.config.jwt_secret)?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| ApiError::Unauthenticated("Could not validate credentials".to_string()))?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}
