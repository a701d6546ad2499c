// src/handlers/chat.rs
use crate::error::ApiError;
use crate::middleware::auth::auth_middleware;
use crate::models::chat::{ChatMessage, ChatRoom, CreateRoomRequest, MessagePageQuery, SendMessageRequest};
use crate::models::user::{User, ROLE_STUDENT, ROLE_TEACHER};
use crate::AppState;
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post, Router},
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;

pub fn chat_routes() -> Router {
    Router::new()
        .route("/chat/rooms", post(create_room))
        .route(
            "/chat/rooms/:room_id/messages",
            get(list_messages).post(send_message),
        )
        .layer(axum::middleware::from_fn(auth_middleware))
}

const DEFAULT_PAGE_LIMIT: i64 = 50;
const MAX_PAGE_LIMIT: i64 = 200;

fn page_params(query: &MessagePageQuery) -> (i64, i64) {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    (limit, offset)
}

async fn fetch_room(pool: &PgPool, room_id: i32) -> Result<ChatRoom, ApiError> {
    sqlx::query_as::<_, ChatRoom>("SELECT * FROM chat_rooms WHERE id = $1")
        .bind(room_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Chat room not found".to_string()))
}

/// The user's role profile key: sap_id for students, teacher_id for
/// teachers. Distinct from the base user id.
async fn profile_key(pool: &PgPool, user: &User) -> Result<Option<i32>, ApiError> {
    let key = match user.role.as_str() {
        ROLE_STUDENT => {
            sqlx::query_scalar::<_, i32>("SELECT sap_id FROM students WHERE user_id = $1")
                .bind(user.id)
                .fetch_optional(pool)
                .await?
        }
        ROLE_TEACHER => {
            sqlx::query_scalar::<_, i32>("SELECT teacher_id FROM teachers WHERE user_id = $1")
                .bind(user.id)
                .fetch_optional(pool)
                .await?
        }
        _ => None,
    };
    Ok(key)
}

/// Room access is keyed by profile id, matched against the side of the room
/// corresponding to the user's role. Any third role is rejected outright.
async fn ensure_room_access(pool: &PgPool, user: &User, room: &ChatRoom) -> Result<(), ApiError> {
    let room_side = match user.role.as_str() {
        ROLE_STUDENT => room.student_id,
        ROLE_TEACHER => room.teacher_id,
        _ => {
            return Err(ApiError::Forbidden("Unauthorized user type".to_string()));
        }
    };

    match profile_key(pool, user).await? {
        Some(key) if key == room_side => Ok(()),
        _ => Err(ApiError::Forbidden(
            "Not authorized to access this chat room".to_string(),
        )),
    }
}

/// Create-or-fetch: at most one room exists per (student, teacher) pair.
/// The existence check and insert share a transaction; a concurrent insert
/// that trips the unique pair constraint resolves to the existing room.
async fn create_room(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current_user): Extension<User>,
    Json(payload): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<ChatRoom>), ApiError> {
    let own_key = profile_key(&state.db_pool, &current_user).await?;
    let claimed_key = match current_user.role.as_str() {
        ROLE_STUDENT => payload.student_id,
        ROLE_TEACHER => payload.teacher_id,
        _ => {
            return Err(ApiError::Forbidden("Unauthorized user type".to_string()));
        }
    };
    if own_key != Some(claimed_key) {
        return Err(ApiError::Forbidden(
            "Not authorized to create this chat room".to_string(),
        ));
    }

    let mut tx = state.db_pool.begin().await?;

    if let Some(existing) = sqlx::query_as::<_, ChatRoom>(
        "SELECT * FROM chat_rooms WHERE student_id = $1 AND teacher_id = $2",
    )
    .bind(payload.student_id)
    .bind(payload.teacher_id)
    .fetch_optional(&mut *tx)
    .await?
    {
        return Ok((StatusCode::CREATED, Json(existing)));
    }

    let inserted = sqlx::query_as::<_, ChatRoom>(
        "INSERT INTO chat_rooms (student_id, teacher_id, name)
         VALUES ($1, $2, $3)
         RETURNING *",
    )
    .bind(payload.student_id)
    .bind(payload.teacher_id)
    .bind(&payload.name)
    .fetch_one(&mut *tx)
    .await;

    match inserted {
        Ok(room) => {
            tx.commit().await?;
            tracing::info!(room_id = room.id, "created chat room");
            Ok((StatusCode::CREATED, Json(room)))
        }
        Err(err) => {
            drop(tx);
            match ApiError::from_constraint(err) {
                // Lost a creation race; the winner's row is the answer
                ApiError::Conflict(_) => {
                    let existing = sqlx::query_as::<_, ChatRoom>(
                        "SELECT * FROM chat_rooms WHERE student_id = $1 AND teacher_id = $2",
                    )
                    .bind(payload.student_id)
                    .bind(payload.teacher_id)
                    .fetch_one(&state.db_pool)
                    .await?;
                    Ok((StatusCode::CREATED, Json(existing)))
                }
                ApiError::BadRequest(_) => Err(ApiError::BadRequest(
                    "Referenced student or teacher does not exist".to_string(),
                )),
                other => Err(other),
            }
        }
    }
}

async fn send_message(
    Extension(state): Extension<Arc<AppState>>,
    Path(room_id): Path<i32>,
    Extension(current_user): Extension<User>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), ApiError> {
    let room = fetch_room(&state.db_pool, room_id).await?;
    ensure_room_access(&state.db_pool, &current_user, &room).await?;

    let message = sqlx::query_as::<_, ChatMessage>(
        "INSERT INTO chat_messages (chat_room_id, sender_id, content)
         VALUES ($1, $2, $3)
         RETURNING *",
    )
    .bind(room.id)
    .bind(current_user.id)
    .bind(&payload.content)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Paginated history, chronological within the page. Before the page query,
/// every unread message from the other participant is flipped to read --
/// all of them, not only the page being returned. Flip and query share one
/// transaction so a concurrent send cannot interleave inconsistently.
async fn list_messages(
    Extension(state): Extension<Arc<AppState>>,
    Path(room_id): Path<i32>,
    Query(query): Query<MessagePageQuery>,
    Extension(current_user): Extension<User>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let room = fetch_room(&state.db_pool, room_id).await?;
    ensure_room_access(&state.db_pool, &current_user, &room).await?;

    let (limit, offset) = page_params(&query);

    let mut tx = state.db_pool.begin().await?;

    let flipped = sqlx::query(
        "UPDATE chat_messages SET is_read = TRUE
         WHERE chat_room_id = $1 AND sender_id <> $2 AND is_read = FALSE",
    )
    .bind(room.id)
    .bind(current_user.id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let mut page = sqlx::query_as::<_, ChatMessage>(
        "SELECT * FROM chat_messages
         WHERE chat_room_id = $1
         ORDER BY sent_at DESC, id DESC
         LIMIT $2 OFFSET $3",
    )
    .bind(room.id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    if flipped > 0 {
        tracing::debug!(room_id = room.id, flipped, "marked messages as read");
    }

    // Newest-first query, oldest-first response
    page.reverse();

    Ok(Json(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_params_defaults() {
        let query = MessagePageQuery {
            limit: None,
            offset: None,
        };
        assert_eq!(page_params(&query), (DEFAULT_PAGE_LIMIT, 0));
    }

    #[test]
    fn test_page_params_caps_limit() {
        let query = MessagePageQuery {
            limit: Some(10_000),
            offset: Some(25),
        };
        assert_eq!(page_params(&query), (MAX_PAGE_LIMIT, 25));
    }

    #[test]
    fn test_page_params_rejects_nonpositive_values() {
        let query = MessagePageQuery {
            limit: Some(0),
            offset: Some(-3),
        };
        assert_eq!(page_params(&query), (1, 0));
    }
}
