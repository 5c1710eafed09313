//! Account handlers: registration, login, session and user CRUD.

use actix_web::{HttpResponse, web};
use uuid::Uuid;
use validator::Validate;

use quill_core::domain::User;
use quill_core::ports::{AuthError, BaseRepository, UserRepository};
use quill_shared::ApiResponse;
use quill_shared::dto::{
    DeleteUserRequest, LoginRequest, LoginResponse, ProfileResponse, RegisterResponse,
    RegisterUserRequest, UpdateUserRequest, UserResponse,
};

use crate::middleware::auth::{Identity, removal_cookie, session_cookie};
use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

/// Public projection of a user; the password hash never leaves the server.
pub(crate) fn user_response(user: User) -> UserResponse {
    UserResponse {
        id: user.id,
        user_name: user.user_name,
        email: user.email,
        created_at: user.created_at,
        updated_at: user.updated_at,
    }
}

fn user_not_found() -> AppError {
    AppError::NotFound("User not found".to_string())
}

/// Hashing runs on the blocking pool.
async fn hash_password(state: &AppState, password: String) -> AppResult<String> {
    let passwords = state.passwords.clone();
    Ok(web::block(move || passwords.hash(&password)).await??)
}

async fn verify_password(state: &AppState, password: String, hash: String) -> AppResult<bool> {
    let passwords = state.passwords.clone();
    Ok(web::block(move || passwords.verify(&password, &hash)).await??)
}

/// POST /register
pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterUserRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();
    req.validate()?;

    if state.users.find_by_email(&req.email).await?.is_some() {
        return Err(AppError::Duplicate("User already exists".to_string()));
    }
    if state.users.find_by_user_name(&req.user_name).await?.is_some() {
        return Err(AppError::Duplicate("User name already taken".to_string()));
    }

    let password_hash = hash_password(&state, req.password).await?;
    let user = state
        .users
        .insert(User::new(req.user_name, req.email, password_hash))
        .await?;

    let token = state.tokens.generate_token(user.id, &user.email)?;
    tracing::info!(user_id = %user.id, "User registered");

    Ok(HttpResponse::Created().json(RegisterResponse {
        status: "ok".to_string(),
        message: "User registered correctly".to_string(),
        new_user: user_response(user),
        token,
    }))
}

/// POST /login - sets the session cookie.
pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();
    if req.email.is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest(
            "Content can not be empty!".to_string(),
        ));
    }

    let invalid = || AppError::from(AuthError::InvalidCredentials);

    let user = state
        .users
        .find_by_email(&req.email)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&state, req.password, user.password_hash.clone()).await? {
        tracing::debug!(user_id = %user.id, "Password mismatch");
        return Err(invalid());
    }

    let token = state.tokens.generate_token(user.id, &user.email)?;
    let cookie = session_cookie(token, state.tokens.expiration_seconds());

    Ok(HttpResponse::Ok().cookie(cookie).json(LoginResponse {
        id: user.id,
        email: user.email,
    }))
}

/// GET /profile - echoes the decoded session claims.
pub async fn profile(identity: Identity) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(ProfileResponse {
        id: identity.user_id,
        email: identity.email,
        iat: identity.issued_at,
        exp: identity.expires_at,
    }))
}

/// POST /logout
pub async fn logout() -> HttpResponse {
    HttpResponse::Ok().cookie(removal_cookie()).json("ok")
}

/// GET /users
pub async fn list_users(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let users = state.users.find_all().await?;

    Ok(HttpResponse::Ok().json(users.into_iter().map(user_response).collect::<Vec<_>>()))
}

/// GET /users/{id}
pub async fn get_user(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let user = state
        .users
        .find_by_id(path.into_inner())
        .await?
        .ok_or_else(user_not_found)?;

    Ok(HttpResponse::Ok().json(user_response(user)))
}

/// PATCH /users - partial update of the account selected by `email`.
pub async fn update_user(
    state: web::Data<AppState>,
    body: web::Json<UpdateUserRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();
    req.validate()?;

    let mut user = state
        .users
        .find_by_email(&req.email)
        .await?
        .ok_or_else(user_not_found)?;

    if let Some(user_name) = req.user_name.filter(|name| *name != user.user_name) {
        if state.users.find_by_user_name(&user_name).await?.is_some() {
            return Err(AppError::Duplicate("User name already taken".to_string()));
        }
        user.user_name = user_name;
    }

    if let Some(new_email) = req.new_email.filter(|email| *email != user.email) {
        if state.users.find_by_email(&new_email).await?.is_some() {
            return Err(AppError::Duplicate("User already exists".to_string()));
        }
        user.email = new_email;
    }

    if let Some(password) = req.password {
        user.password_hash = hash_password(&state, password).await?;
    }

    user.touch();
    let user = state.users.update(user).await?;
    tracing::info!(user_id = %user.id, "User updated");

    Ok(HttpResponse::Ok().json(ApiResponse::ok_with_message(
        user_response(user),
        "User updated successfully",
    )))
}

/// DELETE /users
pub async fn delete_user(
    state: web::Data<AppState>,
    body: web::Json<DeleteUserRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();

    let user = state
        .users
        .find_by_email(&req.email)
        .await?
        .ok_or_else(user_not_found)?;

    state.users.delete(user.id).await?;
    tracing::info!(user_id = %user.id, "User deleted");

    Ok(HttpResponse::Ok().json(ApiResponse::ok_with_message(
        user_response(user),
        "User removed correctly",
    )))
}
