//! Post handlers: create/update with multipart cover upload, list and read.

use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures::TryStreamExt;
use uuid::Uuid;

use quill_core::DomainError;
use quill_core::RepoError;
use quill_core::domain::{AuthorRef, Post, PostChanges, PostDetails};
use quill_core::ports::{BaseRepository, PostRepository};
use quill_shared::dto::{AuthorResponse, PostResponse};

use crate::middleware::auth::Identity;
use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

/// How many posts the listing returns.
pub const RECENT_POSTS_LIMIT: u64 = 20;

/// Name of the multipart field carrying the cover file.
const FILE_FIELD: &str = "file";

fn post_response(details: PostDetails) -> PostResponse {
    let PostDetails { post, author } = details;
    PostResponse {
        id: post.id,
        title: post.title,
        summary: post.summary,
        content: post.content,
        cover: post.cover,
        author: author.map(|a| AuthorResponse {
            id: a.id,
            email: a.email,
        }),
        created_at: post.created_at,
        updated_at: post.updated_at,
    }
}

/// An uploaded file held in memory until it is handed to the cover store.
struct UploadedCover {
    file_name: String,
    contents: Vec<u8>,
}

/// Text fields and file of a post form. Absent fields stay `None`.
#[derive(Default)]
struct PostForm {
    id: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    content: Option<String>,
    cover: Option<UploadedCover>,
}

fn multipart_error(err: actix_multipart::MultipartError) -> AppError {
    AppError::BadRequest(format!("Malformed multipart body: {}", err))
}

/// Drain the multipart stream, enforcing `limit` bytes per field.
async fn read_post_form(mut payload: Multipart, limit: usize) -> AppResult<PostForm> {
    let mut form = PostForm::default();

    while let Some(mut field) = payload.try_next().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
            if data.len() + chunk.len() > limit {
                return Err(AppError::BadRequest(format!(
                    "Field '{}' exceeds the {} byte limit",
                    name, limit
                )));
            }
            data.extend_from_slice(&chunk);
        }

        if name == FILE_FIELD {
            // Browsers send an empty part with filename="" when no file was picked.
            match file_name {
                Some(file_name) if !file_name.is_empty() => {
                    form.cover = Some(UploadedCover {
                        file_name,
                        contents: data,
                    });
                }
                _ => {}
            }
            continue;
        }

        let slot = match name.as_str() {
            "id" => &mut form.id,
            "title" => &mut form.title,
            "summary" => &mut form.summary,
            "content" => &mut form.content,
            _ => continue,
        };
        let text = String::from_utf8(data)
            .map_err(|_| AppError::BadRequest(format!("Field '{}' is not valid UTF-8", name)))?;
        *slot = Some(text);
    }

    Ok(form)
}

/// Remove a cover stored for a write that did not go through.
async fn discard_cover(state: &AppState, path: &str) {
    if let Err(e) = state.covers.remove(path).await {
        tracing::warn!(cover = %path, "Failed to remove orphaned cover: {}", e);
    }
}

/// POST /post - multipart form with a required `file` part.
pub async fn create_post(
    state: web::Data<AppState>,
    identity: Identity,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let form = read_post_form(payload, state.upload_max_bytes).await?;
    let cover = form
        .cover
        .ok_or_else(|| AppError::BadRequest("A cover file is required".to_string()))?;

    // The token may outlive its user.
    let author = state
        .users
        .find_by_id(identity.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid token".to_string()))?;

    let cover_path = state.covers.store(&cover.file_name, cover.contents).await?;

    let post = Post::new(
        author.id,
        form.title.unwrap_or_default(),
        form.summary.unwrap_or_default(),
        form.content.unwrap_or_default(),
        cover_path.clone(),
    );

    let post = match state.posts.insert(post).await {
        Ok(post) => post,
        Err(err) => {
            discard_cover(&state, &cover_path).await;
            return Err(match err {
                RepoError::Constraint(_) => AppError::Unauthorized("Invalid token".to_string()),
                other => other.into(),
            });
        }
    };

    tracing::info!(post_id = %post.id, author_id = %author.id, "Post created");

    Ok(HttpResponse::Ok().json(post_response(PostDetails {
        post,
        author: Some(AuthorRef {
            id: author.id,
            email: author.email,
        }),
    })))
}

/// PUT /post - multipart form with `id` and optional fields and `file`.
pub async fn update_post(
    state: web::Data<AppState>,
    identity: Identity,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let form = read_post_form(payload, state.upload_max_bytes).await?;

    let id = form
        .id
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("Post id is required".to_string()))?;
    let id = Uuid::parse_str(id).map_err(|_| AppError::NotFound("Post not found".to_string()))?;

    let mut post = state
        .posts
        .find_by_id(id)
        .await?
        .ok_or(DomainError::NotFound {
            entity_type: "Post",
            id,
        })?;

    if let Err(err) = post.ensure_author(identity.user_id) {
        tracing::warn!(post_id = %id, user_id = %identity.user_id, "Rejected update by non-author");
        return Err(err.into());
    }

    // Only authorized updates touch the disk.
    let cover = match form.cover {
        Some(cover) => Some(state.covers.store(&cover.file_name, cover.contents).await?),
        None => None,
    };

    let new_cover = cover.clone();
    post.apply(PostChanges {
        title: form.title,
        summary: form.summary,
        content: form.content,
        cover,
    });
    let post = match state.posts.update(post).await {
        Ok(post) => post,
        Err(err) => {
            if let Some(path) = new_cover {
                discard_cover(&state, &path).await;
            }
            return Err(err.into());
        }
    };

    let details = state
        .posts
        .find_with_author(post.id)
        .await?
        .unwrap_or(PostDetails { post, author: None });

    Ok(HttpResponse::Ok().json(post_response(details)))
}

/// GET /post - the most recent posts, newest first.
pub async fn list_posts(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let posts = state.posts.find_recent(RECENT_POSTS_LIMIT).await?;

    Ok(HttpResponse::Ok().json(posts.into_iter().map(post_response).collect::<Vec<_>>()))
}

/// GET /post/{id}
pub async fn get_post(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let details = state
        .posts
        .find_with_author(id)
        .await?
        .ok_or(DomainError::NotFound {
            entity_type: "Post",
            id,
        })?;

    Ok(HttpResponse::Ok().json(post_response(details)))
}
