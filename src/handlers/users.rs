// src/handlers/users.rs
use crate::error::ApiError;
use crate::handlers::auth::hash_password;
use crate::middleware::auth::auth_middleware;
use crate::models::user::{
    StudentOut, TeacherOut, User, UserOut, UserPayload, ROLE_STUDENT, ROLE_TEACHER,
};
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post, put, Router},
    Json,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub fn user_routes() -> Router {
    let public_routes = Router::new().route("/users", post(create_user));

    let protected_routes = Router::new()
        .route("/users", get(list_counterparts))
        .route("/users/:id", put(update_user).delete(delete_user))
        .layer(axum::middleware::from_fn(auth_middleware));

    public_routes.merge(protected_routes)
}

fn parse_user_payload(value: serde_json::Value) -> Result<UserPayload, ApiError> {
    serde_json::from_value(value)
        .map_err(|e| ApiError::BadRequest(format!("Invalid user payload: {}", e)))
}

/// Create a student or teacher account. Base row and profile row are written
/// in one transaction so a failed profile insert leaves no orphaned user.
async fn create_user(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<UserOut>), ApiError> {
    let payload = parse_user_payload(payload)?;

    let mut tx = state.db_pool.begin().await?;

    let user = match payload {
        UserPayload::Student(s) => {
            let password_hash = hash_password(&s.password)?;
            let (id, created_at): (i32, DateTime<Utc>) = sqlx::query_as(
                "INSERT INTO users (email, password_hash, first_name, last_name, role)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING id, created_at",
            )
            .bind(&s.email)
            .bind(&password_hash)
            .bind(&s.first_name)
            .bind(&s.last_name)
            .bind(ROLE_STUDENT)
            .fetch_one(&mut *tx)
            .await
            .map_err(ApiError::from_constraint)?;

            let sap_id: i32 = sqlx::query_scalar(
                "INSERT INTO students (user_id, department, roll_no, graduation_year, gpa)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING sap_id",
            )
            .bind(id)
            .bind(&s.department)
            .bind(&s.roll_no)
            .bind(s.graduation_year)
            .bind(s.gpa)
            .fetch_one(&mut *tx)
            .await
            .map_err(ApiError::from_constraint)?;

            UserOut::Student(StudentOut {
                id,
                email: s.email,
                first_name: s.first_name,
                last_name: s.last_name,
                created_at,
                sap_id,
                department: s.department,
                roll_no: s.roll_no,
                graduation_year: s.graduation_year,
                gpa: s.gpa,
            })
        }
        UserPayload::Teacher(t) => {
            let password_hash = hash_password(&t.password)?;
            let (id, created_at): (i32, DateTime<Utc>) = sqlx::query_as(
                "INSERT INTO users (email, password_hash, first_name, last_name, role)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING id, created_at",
            )
            .bind(&t.email)
            .bind(&password_hash)
            .bind(&t.first_name)
            .bind(&t.last_name)
            .bind(ROLE_TEACHER)
            .fetch_one(&mut *tx)
            .await
            .map_err(ApiError::from_constraint)?;

            let teacher_id: i32 = sqlx::query_scalar(
                "INSERT INTO teachers (user_id, department, start_date)
                 VALUES ($1, $2, $3)
                 RETURNING teacher_id",
            )
            .bind(id)
            .bind(&t.department)
            .bind(t.start_date)
            .fetch_one(&mut *tx)
            .await
            .map_err(ApiError::from_constraint)?;

            UserOut::Teacher(TeacherOut {
                id,
                email: t.email,
                first_name: t.first_name,
                last_name: t.last_name,
                created_at,
                teacher_id,
                department: t.department,
                start_date: t.start_date,
            })
        }
    };

    tx.commit().await?;

    tracing::info!("created user account");

    Ok((StatusCode::CREATED, Json(user)))
}

/// Students see all teachers, teachers see all students.
async fn list_counterparts(
    Extension(state): Extension<Arc<AppState>>,
    Extension(current_user): Extension<User>,
) -> Result<Json<Vec<UserOut>>, ApiError> {
    let users = match current_user.role.as_str() {
        ROLE_STUDENT => sqlx::query_as::<_, TeacherOut>(
            "SELECT u.id, u.email, u.first_name, u.last_name, u.created_at,
                    t.teacher_id, t.department, t.start_date
             FROM users u
             JOIN teachers t ON t.user_id = u.id
             ORDER BY u.id",
        )
        .fetch_all(&state.db_pool)
        .await?
        .into_iter()
        .map(UserOut::Teacher)
        .collect(),
        ROLE_TEACHER => sqlx::query_as::<_, StudentOut>(
            "SELECT u.id, u.email, u.first_name, u.last_name, u.created_at,
                    s.sap_id, s.department, s.roll_no, s.graduation_year, s.gpa
             FROM users u
             JOIN students s ON s.user_id = u.id
             ORDER BY u.id",
        )
        .fetch_all(&state.db_pool)
        .await?
        .into_iter()
        .map(UserOut::Student)
        .collect(),
        other => {
            return Err(ApiError::BadRequest(format!("Invalid user type: {}", other)));
        }
    };

    Ok(Json(users))
}

/// Self-only update. The payload's type tag cannot switch the stored role;
/// a payload for the other variant is rejected.
async fn update_user(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i32>,
    Extension(current_user): Extension<User>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let payload = parse_user_payload(payload)?;

    let target = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User with id {} not found", id)))?;

    if target.id != current_user.id {
        return Err(ApiError::Forbidden(
            "Not authorized to update this user".to_string(),
        ));
    }

    let mut tx = state.db_pool.begin().await?;

    match (target.role.as_str(), payload) {
        (ROLE_STUDENT, UserPayload::Student(s)) => {
            let password_hash = hash_password(&s.password)?;
            sqlx::query(
                "UPDATE users SET email = $1, password_hash = $2, first_name = $3, last_name = $4
                 WHERE id = $5",
            )
            .bind(&s.email)
            .bind(&password_hash)
            .bind(&s.first_name)
            .bind(&s.last_name)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::from_constraint)?;

            sqlx::query(
                "UPDATE students SET department = $1, roll_no = $2, graduation_year = $3, gpa = $4
                 WHERE user_id = $5",
            )
            .bind(&s.department)
            .bind(&s.roll_no)
            .bind(s.graduation_year)
            .bind(s.gpa)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::from_constraint)?;
        }
        (ROLE_TEACHER, UserPayload::Teacher(t)) => {
            let password_hash = hash_password(&t.password)?;
            sqlx::query(
                "UPDATE users SET email = $1, password_hash = $2, first_name = $3, last_name = $4
                 WHERE id = $5",
            )
            .bind(&t.email)
            .bind(&password_hash)
            .bind(&t.first_name)
            .bind(&t.last_name)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::from_constraint)?;

            sqlx::query("UPDATE teachers SET department = $1, start_date = $2 WHERE user_id = $3")
                .bind(&t.department)
                .bind(t.start_date)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(ApiError::from_constraint)?;
        }
        _ => {
            return Err(ApiError::BadRequest(
                "Payload does not match the user's role".to_string(),
            ));
        }
    }

    tx.commit().await?;

    tracing::info!(user_id = id, "updated user account");

    Ok(Json(serde_json::json!({
        "detail": format!("User with id {} updated successfully", id)
    })))
}

/// Self-only delete. Profile, rooms, and messages go with the user via
/// cascading foreign keys.
async fn delete_user(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i32>,
    Extension(current_user): Extension<User>,
) -> Result<StatusCode, ApiError> {
    let target = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User with id {} not found", id)))?;

    if target.id != current_user.id {
        return Err(ApiError::Forbidden(
            "Not authorized to delete this user".to_string(),
        ));
    }

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&state.db_pool)
        .await?;

    tracing::info!(user_id = id, "deleted user account");

    Ok(StatusCode::NO_CONTENT)
}
