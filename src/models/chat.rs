// src/models/chat.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Persistent 1:1 conversation container. student_id/teacher_id are profile
/// keys (sap_id / teacher_id), not base user ids.
#[derive(Debug, Serialize, FromRow)]
pub struct ChatRoom {
    pub id: i32,
    pub student_id: i32,
    pub teacher_id: i32,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// is_read flips false -> true only, when the other participant lists the
/// room's messages.
#[derive(Debug, Serialize, FromRow)]
pub struct ChatMessage {
    pub id: i32,
    pub chat_room_id: i32,
    pub sender_id: i32,
    pub content: String,
    pub is_read: bool,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub student_id: i32,
    pub teacher_id: i32,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagePageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
