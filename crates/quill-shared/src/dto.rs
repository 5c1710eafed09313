//! Data Transfer Objects - request/response types for the API.
//!
//! Field names are camelCase on the wire (`userName`, `createdAt`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

/// Order in which validation failures are reported, compared case- and
/// underscore-insensitively against the failing field's name.
const VALIDATION_ORDER: &[&str] = &["username", "email", "newemail", "password"];

/// Request to register a new user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterUserRequest {
    #[validate(length(
        min = 3,
        max = 255,
        message = "userName must be between 3 and 255 characters long"
    ))]
    pub user_name: String,
    #[validate(email(message = "email must be a valid email"))]
    pub email: String,
    #[validate(length(
        min = 6,
        max = 1024,
        message = "password must be between 6 and 1024 characters long"
    ))]
    pub password: String,
}

/// Request to login.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Partial user update. `email` selects the account; every other field is optional
/// and only validated when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateUserRequest {
    #[validate(email(message = "email must be a valid email"))]
    pub email: String,
    #[validate(length(
        min = 3,
        max = 255,
        message = "userName must be between 3 and 255 characters long"
    ))]
    pub user_name: Option<String>,
    #[validate(email(message = "newEmail must be a valid email"))]
    pub new_email: Option<String>,
    #[validate(length(
        min = 6,
        max = 1024,
        message = "password must be between 6 and 1024 characters long"
    ))]
    pub password: Option<String>,
}

/// Request to delete a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteUserRequest {
    pub email: String,
}

/// Response containing a user's public information.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub user_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Response to a successful registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub status: String,
    pub message: String,
    pub new_user: UserResponse,
    pub token: String,
}

/// Response to a successful login. The token itself travels in the cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub id: Uuid,
    pub email: String,
}

/// Decoded claims of the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Author projection attached to posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorResponse {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: Uuid,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub cover: String,
    pub author: Option<AuthorResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Message of the first violated field, following `VALIDATION_ORDER`.
pub fn first_violation(errors: &ValidationErrors) -> String {
    let rank = |field: &str| {
        let normalized = field.replace('_', "").to_lowercase();
        VALIDATION_ORDER
            .iter()
            .position(|known| *known == normalized)
            .unwrap_or(VALIDATION_ORDER.len())
    };

    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by_key(|(field, _)| {
        let name: &str = field;
        (rank(name), name.to_string())
    });

    fields
        .into_iter()
        .find_map(|(field, errs)| {
            errs.first().map(|err| match &err.message {
                Some(message) => message.to_string(),
                None => format!("{} is invalid", field),
            })
        })
        .unwrap_or_else(|| "Invalid request".to_string())
}
