use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Post entity - a blog post with an uploaded cover image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    /// `None` once the author's account has been deleted.
    pub author_id: Option<Uuid>,
    pub title: String,
    pub summary: String,
    pub content: String,
    /// Public path of the stored cover file, e.g. `uploads/3f2a....png`.
    pub cover: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field changes applied by an update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub cover: Option<String>,
}

/// The slice of the author exposed alongside a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRef {
    pub id: Uuid,
    pub email: String,
}

/// A post joined with its author. `author` is `None` when the reference dangles.
#[derive(Debug, Clone)]
pub struct PostDetails {
    pub post: Post,
    pub author: Option<AuthorRef>,
}

impl Post {
    /// Create a new post.
    pub fn new(
        author_id: Uuid,
        title: String,
        summary: String,
        content: String,
        cover: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            author_id: Some(author_id),
            title,
            summary,
            content,
            cover,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_authored_by(&self, user_id: Uuid) -> bool {
        self.author_id == Some(user_id)
    }

    /// Only the author may modify a post.
    pub fn ensure_author(&self, user_id: Uuid) -> Result<(), DomainError> {
        if self.is_authored_by(user_id) {
            Ok(())
        } else {
            Err(DomainError::Forbidden(
                "You are not the author of this post".to_string(),
            ))
        }
    }

    /// Apply a partial update and bump `updated_at`.
    pub fn apply(&mut self, changes: PostChanges) {
        if let Some(title) = changes.title {
            self.title = title;
        }
        if let Some(summary) = changes.summary {
            self.summary = summary;
        }
        if let Some(content) = changes.content {
            self.content = content;
        }
        if let Some(cover) = changes.cover {
            self.cover = cover;
        }
        self.updated_at = Utc::now();
    }
}
