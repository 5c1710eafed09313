//! End-to-end handler tests against in-memory state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use actix_web::cookie::Cookie;
use actix_web::http::{StatusCode, header};
use actix_web::{App, test, web};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

use async_trait::async_trait;
use quill_core::RepoError;
use quill_core::domain::{Post, PostDetails};
use quill_core::ports::{BaseRepository, PostRepository};
use quill_infra::{Argon2PasswordService, InMemoryPostRepository, InMemoryUserRepository};

use super::configure_routes;
use crate::config::AppConfig;
use crate::middleware::auth::TOKEN_COOKIE;
use crate::state::AppState;

const BOUNDARY: &str = "----quill-test-boundary";
const PASSWORD: &str = "correct-horse";

fn test_state() -> (AppState, PathBuf) {
    let upload_dir = std::env::temp_dir().join(format!("quill-api-{}", Uuid::new_v4()));
    let config = AppConfig {
        upload_dir: upload_dir.clone(),
        ..AppConfig::default()
    };

    let mut state = AppState::in_memory(&config);
    state.passwords = Arc::new(Argon2PasswordService::with_params(1024, 1, 1).unwrap());
    (state, upload_dir)
}

/// In-memory post store whose writes can be made to fail.
struct FlakyPosts {
    inner: InMemoryPostRepository,
    reject_writes: AtomicBool,
}

impl FlakyPosts {
    fn check_writes(&self) -> Result<(), RepoError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            Err(RepoError::Connection("connection reset by peer".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BaseRepository<Post, Uuid> for FlakyPosts {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Post>, RepoError> {
        self.inner.find_by_id(id).await
    }

    async fn find_all(&self) -> Result<Vec<Post>, RepoError> {
        self.inner.find_all().await
    }

    async fn insert(&self, post: Post) -> Result<Post, RepoError> {
        self.check_writes()?;
        self.inner.insert(post).await
    }

    async fn update(&self, post: Post) -> Result<Post, RepoError> {
        self.check_writes()?;
        self.inner.update(post).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        self.inner.delete(id).await
    }
}

#[async_trait]
impl PostRepository for FlakyPosts {
    async fn find_recent(&self, limit: u64) -> Result<Vec<PostDetails>, RepoError> {
        self.inner.find_recent(limit).await
    }

    async fn find_with_author(&self, id: Uuid) -> Result<Option<PostDetails>, RepoError> {
        self.inner.find_with_author(id).await
    }
}

fn flaky_state() -> (AppState, Arc<FlakyPosts>, PathBuf) {
    let (mut state, upload_dir) = test_state();
    let users = Arc::new(InMemoryUserRepository::new());
    let posts = Arc::new(FlakyPosts {
        inner: InMemoryPostRepository::new(users.clone()),
        reject_writes: AtomicBool::new(false),
    });

    state.users = users;
    state.posts = posts.clone();
    (state, posts, upload_dir)
}

fn stored_files(upload_dir: &Path) -> usize {
    std::fs::read_dir(upload_dir)
        .map(|entries| entries.count())
        .unwrap_or(0)
}

macro_rules! test_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(configure_routes),
        )
        .await
    };
}

fn register_request(user_name: &str, email: &str, password: &str) -> test::TestRequest {
    test::TestRequest::post().uri("/register").set_json(json!({
        "userName": user_name,
        "email": email,
        "password": password,
    }))
}

fn login_request(email: &str, password: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/login")
        .set_json(json!({ "email": email, "password": password }))
}

/// Hand-built `multipart/form-data` body.
fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, contents)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(contents);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(
    req: test::TestRequest,
    fields: &[(&str, &str)],
    file: Option<(&str, &[u8])>,
) -> test::TestRequest {
    req.insert_header((
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    ))
    .set_payload(multipart_body(fields, file))
}

fn token_cookie(resp: &actix_web::dev::ServiceResponse) -> Cookie<'static> {
    resp.response()
        .cookies()
        .find(|c| c.name() == TOKEN_COOKIE)
        .map(|c| c.into_owned())
        .expect("login sets the session cookie")
}

macro_rules! login_as {
    ($app:expr, $user_name:expr, $email:expr) => {{
        let req = register_request($user_name, $email, PASSWORD).to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let req = login_request($email, PASSWORD).to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        token_cookie(&resp)
    }};
}

macro_rules! create_post {
    ($app:expr, $cookie:expr, $title:expr) => {{
        let req = multipart_request(
            test::TestRequest::post().uri("/post").cookie($cookie.clone()),
            &[("title", $title), ("summary", "A summary"), ("content", "<p>Body</p>")],
            Some(("cover.png", b"\x89PNG fake image".as_slice())),
        );
        let resp = test::call_service(&$app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        test::read_body_json::<Value, _>(resp).await
    }};
}

#[actix_web::test]
async fn test_health_check() {
    let (state, _) = test_state();
    let app = test_app!(state);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "Server Up");
}

#[actix_web::test]
async fn test_register_returns_user_without_hash() {
    let (state, _) = test_state();
    let app = test_app!(state);

    let resp = test::call_service(
        &app,
        register_request("writer", "writer@example.com", PASSWORD).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["newUser"]["userName"], "writer");
    assert_eq!(body["newUser"]["email"], "writer@example.com");
    assert!(body["newUser"].get("passwordHash").is_none());
    assert!(!body["token"].as_str().unwrap().is_empty());
}

#[actix_web::test]
async fn test_register_duplicate_email_is_rejected() {
    let (state, _) = test_state();
    let app = test_app!(state);

    let first = test::call_service(
        &app,
        register_request("writer", "writer@example.com", PASSWORD).to_request(),
    )
    .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = test::call_service(
        &app,
        register_request("another", "writer@example.com", PASSWORD).to_request(),
    )
    .await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(second).await;
    assert_eq!(body["detail"], "User already exists");

    let resp = test::call_service(&app, test::TestRequest::get().uri("/users").to_request()).await;
    let users: Value = test::read_body_json(resp).await;
    assert_eq!(users.as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn test_register_short_password_creates_nothing() {
    let (state, _) = test_state();
    let app = test_app!(state);

    let resp = test::call_service(
        &app,
        register_request("writer", "writer@example.com", "12345").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["detail"].as_str().unwrap().contains("password"));

    let resp = test::call_service(&app, test::TestRequest::get().uri("/users").to_request()).await;
    let users: Value = test::read_body_json(resp).await;
    assert!(users.as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn test_register_malformed_json_is_bad_request() {
    let (state, _) = test_state();
    let app = test_app!(state);

    let req = test::TestRequest::post()
        .uri("/register")
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_login_cookie_identifies_registered_user() {
    let (state, _) = test_state();
    let app = test_app!(state);

    let resp = test::call_service(
        &app,
        register_request("writer", "writer@example.com", PASSWORD).to_request(),
    )
    .await;
    let registered: Value = test::read_body_json(resp).await;
    let user_id: Uuid = registered["newUser"]["id"].as_str().unwrap().parse().unwrap();

    let resp = test::call_service(
        &app,
        login_request("writer@example.com", PASSWORD).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cookie = token_cookie(&resp);
    assert_eq!(cookie.http_only(), Some(true));
    let claims = state.tokens.validate_token(cookie.value()).unwrap();
    assert_eq!(claims.user_id, user_id);
    assert_eq!(claims.email, "writer@example.com");

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["id"], user_id.to_string());
}

#[actix_web::test]
async fn test_login_failures_are_indistinguishable() {
    let (state, _) = test_state();
    let app = test_app!(state);

    test::call_service(
        &app,
        register_request("writer", "writer@example.com", PASSWORD).to_request(),
    )
    .await;

    let wrong_password = test::call_service(
        &app,
        login_request("writer@example.com", "not-the-password").to_request(),
    )
    .await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert!(
        wrong_password
            .response()
            .cookies()
            .all(|c| c.name() != TOKEN_COOKIE)
    );
    let wrong_password: Value = test::read_body_json(wrong_password).await;

    let unknown = test::call_service(
        &app,
        login_request("nobody@example.com", PASSWORD).to_request(),
    )
    .await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    let unknown: Value = test::read_body_json(unknown).await;

    assert_eq!(wrong_password["detail"], unknown["detail"]);
}

#[actix_web::test]
async fn test_login_empty_fields_is_bad_request() {
    let (state, _) = test_state();
    let app = test_app!(state);

    let resp = test::call_service(&app, login_request("", "").to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_profile_requires_session() {
    let (state, _) = test_state();
    let app = test_app!(state);

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/profile").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/profile")
        .cookie(Cookie::new(TOKEN_COOKIE, "garbage"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let cookie = login_as!(app, "writer", "writer@example.com");
    let req = test::TestRequest::get()
        .uri("/profile")
        .cookie(cookie)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["email"], "writer@example.com");
    assert!(body["exp"].as_i64().unwrap() > body["iat"].as_i64().unwrap());
}

#[actix_web::test]
async fn test_logout_clears_cookie() {
    let (state, _) = test_state();
    let app = test_app!(state);

    let resp =
        test::call_service(&app, test::TestRequest::post().uri("/logout").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cookie = token_cookie(&resp);
    assert_eq!(cookie.value(), "");
    assert_eq!(
        cookie.max_age(),
        Some(actix_web::cookie::time::Duration::ZERO)
    );

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, "ok");
}

#[actix_web::test]
async fn test_get_user_unknown_and_malformed_ids() {
    let (state, _) = test_state();
    let app = test_app!(state);

    let uri = format!("/users/{}", Uuid::new_v4());
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/users/not-a-uuid").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_update_user_changes_only_given_fields() {
    let (state, _) = test_state();
    let app = test_app!(state);

    test::call_service(
        &app,
        register_request("writer", "writer@example.com", PASSWORD).to_request(),
    )
    .await;

    let req = test::TestRequest::patch()
        .uri("/users")
        .set_json(json!({ "email": "writer@example.com", "userName": "renamed" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "User updated successfully");
    assert_eq!(body["data"]["userName"], "renamed");
    assert_eq!(body["data"]["email"], "writer@example.com");

    // Password untouched
    let resp = test::call_service(
        &app,
        login_request("writer@example.com", PASSWORD).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_update_user_rejects_taken_user_name() {
    let (state, _) = test_state();
    let app = test_app!(state);

    for (name, email) in [("first", "first@example.com"), ("second", "second@example.com")] {
        test::call_service(&app, register_request(name, email, PASSWORD).to_request()).await;
    }

    let req = test::TestRequest::patch()
        .uri("/users")
        .set_json(json!({ "email": "second@example.com", "userName": "first" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_delete_user() {
    let (state, _) = test_state();
    let app = test_app!(state);

    let req = test::TestRequest::delete()
        .uri("/users")
        .set_json(json!({ "email": "ghost@example.com" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    test::call_service(
        &app,
        register_request("writer", "writer@example.com", PASSWORD).to_request(),
    )
    .await;
    let req = test::TestRequest::delete()
        .uri("/users")
        .set_json(json!({ "email": "writer@example.com" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "User removed correctly");

    let resp = test::call_service(&app, test::TestRequest::get().uri("/users").to_request()).await;
    let users: Value = test::read_body_json(resp).await;
    assert!(users.as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn test_create_post_requires_session() {
    let (state, _) = test_state();
    let app = test_app!(state);

    let req = multipart_request(
        test::TestRequest::post().uri("/post"),
        &[("title", "Hello")],
        Some(("cover.png", b"image".as_slice())),
    );
    let resp = test::call_service(&app, req.to_request()).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_create_post_requires_cover() {
    let (state, _) = test_state();
    let app = test_app!(state);
    let cookie = login_as!(app, "writer", "writer@example.com");

    let req = multipart_request(
        test::TestRequest::post().uri("/post").cookie(cookie),
        &[("title", "Hello")],
        None,
    );
    let resp = test::call_service(&app, req.to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_create_then_get_post() {
    let (state, upload_dir) = test_state();
    let app = test_app!(state);
    let cookie = login_as!(app, "writer", "writer@example.com");

    let created = create_post!(app, cookie, "Hello world");
    let cover = created["cover"].as_str().unwrap();
    assert!(cover.starts_with("uploads/"));
    assert!(cover.ends_with(".png"));
    let stored = upload_dir.join(cover.trim_start_matches("uploads/"));
    assert!(stored.exists());

    let uri = format!("/post/{}", created["id"].as_str().unwrap());
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let fetched: Value = test::read_body_json(resp).await;
    assert_eq!(fetched["title"], "Hello world");
    assert_eq!(fetched["summary"], "A summary");
    assert_eq!(fetched["content"], "<p>Body</p>");
    assert_eq!(fetched["cover"], created["cover"]);
    assert_eq!(fetched["author"]["email"], "writer@example.com");
}

#[actix_web::test]
async fn test_get_post_unknown_id() {
    let (state, _) = test_state();
    let app = test_app!(state);

    let uri = format!("/post/{}", Uuid::new_v4());
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_update_post_by_author() {
    let (state, _) = test_state();
    let app = test_app!(state);
    let cookie = login_as!(app, "writer", "writer@example.com");
    let created = create_post!(app, cookie, "Draft");
    let id = created["id"].as_str().unwrap();

    let req = multipart_request(
        test::TestRequest::put().uri("/post").cookie(cookie),
        &[("id", id), ("title", "Final")],
        None,
    );
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let updated: Value = test::read_body_json(resp).await;
    assert_eq!(updated["title"], "Final");
    assert_eq!(updated["content"], created["content"]);
    assert_eq!(updated["cover"], created["cover"]);
}

#[actix_web::test]
async fn test_update_post_by_non_author_is_forbidden() {
    let (state, upload_dir) = test_state();
    let app = test_app!(state);
    let author = login_as!(app, "writer", "writer@example.com");
    let intruder = login_as!(app, "intruder", "intruder@example.com");
    let created = create_post!(app, author, "Mine");
    let id = created["id"].as_str().unwrap();

    let req = multipart_request(
        test::TestRequest::put().uri("/post").cookie(intruder),
        &[("id", id), ("content", "defaced")],
        Some(("evil.png", b"payload".as_slice())),
    );
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Only the original cover is on disk
    let files = std::fs::read_dir(&upload_dir).unwrap().count();
    assert_eq!(files, 1);

    let uri = format!("/post/{}", id);
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    let fetched: Value = test::read_body_json(resp).await;
    assert_eq!(fetched["content"], "<p>Body</p>");
}

#[actix_web::test]
async fn test_update_post_missing_id_is_bad_request() {
    let (state, _) = test_state();
    let app = test_app!(state);
    let cookie = login_as!(app, "writer", "writer@example.com");

    let req = multipart_request(
        test::TestRequest::put().uri("/post").cookie(cookie),
        &[("title", "Orphan")],
        None,
    );
    let resp = test::call_service(&app, req.to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_list_posts_is_capped_and_newest_first() {
    let (state, _) = test_state();
    let app = test_app!(state);
    let cookie = login_as!(app, "writer", "writer@example.com");

    for i in 0..21 {
        let title = format!("Post {}", i);
        create_post!(app, cookie, title.as_str());
    }

    let resp = test::call_service(&app, test::TestRequest::get().uri("/post").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let posts: Value = test::read_body_json(resp).await;
    let posts = posts.as_array().unwrap();
    assert_eq!(posts.len(), 20);

    let created_at: Vec<DateTime<Utc>> = posts
        .iter()
        .map(|p| p["createdAt"].as_str().unwrap().parse().unwrap())
        .collect();
    assert!(created_at.windows(2).all(|w| w[0] >= w[1]));
    assert!(posts.iter().all(|p| p["author"]["email"] == "writer@example.com"));
}

#[actix_web::test]
async fn test_deleting_user_keeps_their_posts() {
    let (state, _) = test_state();
    let app = test_app!(state);
    let cookie = login_as!(app, "writer", "writer@example.com");
    let created = create_post!(app, cookie, "Survivor");

    let req = test::TestRequest::delete()
        .uri("/users")
        .set_json(json!({ "email": "writer@example.com" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let uri = format!("/post/{}", created["id"].as_str().unwrap());
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let fetched: Value = test::read_body_json(resp).await;
    assert_eq!(fetched["title"], "Survivor");
    assert!(fetched["author"].is_null());

    let resp = test::call_service(&app, test::TestRequest::get().uri("/post").to_request()).await;
    let posts: Value = test::read_body_json(resp).await;
    assert_eq!(posts.as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn test_create_post_after_account_deleted_is_unauthorized() {
    let (state, upload_dir) = test_state();
    let app = test_app!(state);
    let cookie = login_as!(app, "writer", "writer@example.com");

    let req = test::TestRequest::delete()
        .uri("/users")
        .set_json(json!({ "email": "writer@example.com" }))
        .to_request();
    test::call_service(&app, req).await;

    let req = multipart_request(
        test::TestRequest::post().uri("/post").cookie(cookie),
        &[("title", "Ghost")],
        Some(("cover.png", b"image".as_slice())),
    );
    let resp = test::call_service(&app, req.to_request()).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(stored_files(&upload_dir), 0);
}

#[actix_web::test]
async fn test_failed_insert_removes_stored_cover() {
    let (state, posts, upload_dir) = flaky_state();
    let app = test_app!(state);
    let cookie = login_as!(app, "writer", "writer@example.com");
    posts.reject_writes.store(true, Ordering::SeqCst);

    let req = multipart_request(
        test::TestRequest::post().uri("/post").cookie(cookie),
        &[("title", "Lost")],
        Some(("cover.png", b"image".as_slice())),
    );
    let resp = test::call_service(&app, req.to_request()).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(stored_files(&upload_dir), 0);
}

#[actix_web::test]
async fn test_failed_update_removes_new_cover() {
    let (state, posts, upload_dir) = flaky_state();
    let app = test_app!(state);
    let cookie = login_as!(app, "writer", "writer@example.com");
    let created = create_post!(app, cookie, "Stable");
    let id = created["id"].as_str().unwrap();
    posts.reject_writes.store(true, Ordering::SeqCst);

    let req = multipart_request(
        test::TestRequest::put().uri("/post").cookie(cookie),
        &[("id", id), ("title", "Changed")],
        Some(("new.jpg", b"other image".as_slice())),
    );
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    assert_eq!(stored_files(&upload_dir), 1);
    let uri = format!("/post/{}", id);
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    let fetched: Value = test::read_body_json(resp).await;
    assert_eq!(fetched["title"], "Stable");
    assert_eq!(fetched["cover"], created["cover"]);
}

#[actix_web::test]
async fn test_oversized_cover_is_rejected() {
    let (mut state, upload_dir) = test_state();
    state.upload_max_bytes = 16;
    let app = test_app!(state);
    let cookie = login_as!(app, "writer", "writer@example.com");

    let req = multipart_request(
        test::TestRequest::post().uri("/post").cookie(cookie),
        &[("title", "Big")],
        Some(("cover.png", [0u8; 64].as_slice())),
    );
    let resp = test::call_service(&app, req.to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(stored_files(&upload_dir), 0);
}

#[actix_web::test]
async fn test_update_post_requires_valid_session() {
    let (state, _) = test_state();
    let app = test_app!(state);
    let cookie = login_as!(app, "writer", "writer@example.com");
    let created = create_post!(app, cookie, "Guarded");
    let id = created["id"].as_str().unwrap();

    let req = multipart_request(
        test::TestRequest::put()
            .uri("/post")
            .cookie(Cookie::new(TOKEN_COOKIE, "garbage")),
        &[("id", id), ("title", "Hijacked")],
        None,
    );
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = multipart_request(
        test::TestRequest::put().uri("/post"),
        &[("id", id), ("title", "Hijacked")],
        None,
    );
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let uri = format!("/post/{}", id);
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    let fetched: Value = test::read_body_json(resp).await;
    assert_eq!(fetched["title"], "Guarded");
}
