// src/models/user.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const ROLE_STUDENT: &str = "student";
pub const ROLE_TEACHER: &str = "teacher";

/// Base user row. The role discriminator is fixed at creation and selects
/// which profile row (students/teachers) belongs to this user.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Discriminated create/update payload: student fields xor teacher fields,
/// selected by the "type" tag.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UserPayload {
    Student(StudentPayload),
    Teacher(TeacherPayload),
}

#[derive(Debug, Deserialize)]
pub struct StudentPayload {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub department: String,
    pub roll_no: String,
    pub graduation_year: i32,
    pub gpa: f64,
}

#[derive(Debug, Deserialize)]
pub struct TeacherPayload {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub department: String,
    pub start_date: DateTime<Utc>,
}

/// Outward user representation, tagged by role. The password hash is never
/// part of this type.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UserOut {
    Student(StudentOut),
    Teacher(TeacherOut),
}

#[derive(Debug, Serialize, FromRow)]
pub struct StudentOut {
    pub id: i32,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub sap_id: i32,
    pub department: String,
    pub roll_no: String,
    pub graduation_year: i32,
    pub gpa: f64,
}

#[derive(Debug, Serialize, FromRow)]
pub struct TeacherOut {
    pub id: i32,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub teacher_id: i32,
    pub department: String,
    pub start_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_student_payload_deserializes_from_tag() {
        let payload: UserPayload = serde_json::from_value(serde_json::json!({
            "type": "student",
            "email": "s@example.com",
            "password": "secret",
            "first_name": "Asha",
            "last_name": "Rao",
            "department": "CS",
            "roll_no": "CS-042",
            "graduation_year": 2026,
            "gpa": 3.7
        }))
        .unwrap();

        match payload {
            UserPayload::Student(s) => {
                assert_eq!(s.roll_no, "CS-042");
                assert_eq!(s.graduation_year, 2026);
            }
            UserPayload::Teacher(_) => panic!("expected student variant"),
        }
    }

    #[test]
    fn test_unknown_role_tag_is_rejected() {
        let result: Result<UserPayload, _> = serde_json::from_value(serde_json::json!({
            "type": "admin",
            "email": "a@example.com",
            "password": "secret",
            "first_name": "A",
            "last_name": "B"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_user_out_serializes_with_role_tag() {
        let out = UserOut::Teacher(TeacherOut {
            id: 7,
            email: "t@example.com".to_string(),
            first_name: "Maya".to_string(),
            last_name: "Iyer".to_string(),
            created_at: Utc::now(),
            teacher_id: 3,
            department: "Physics".to_string(),
            start_date: Utc::now(),
        });

        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["type"], "teacher");
        assert_eq!(value["teacher_id"], 3);
        assert!(value.get("password").is_none());
        assert!(value.get("password_hash").is_none());
    }
}
