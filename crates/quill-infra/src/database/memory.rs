//! In-memory repositories - used when no database is configured, and in tests.
//!
//! They mirror the relational constraints: unique `email`/`user_name`, an
//! author that must exist when a post is inserted, and a post author that reads
//! as `None` once the user is deleted.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use quill_core::domain::{AuthorRef, Post, PostDetails, User};
use quill_core::error::RepoError;
use quill_core::ports::{BaseRepository, PostRepository, UserRepository};

use super::mask_email;

/// User store keyed by id.
#[derive(Default)]
pub struct InMemoryUserRepository {
    store: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject a user whose email or name is held by a different id.
    fn check_unique(store: &HashMap<Uuid, User>, user: &User) -> Result<(), RepoError> {
        let clash = store.values().find(|existing| {
            existing.id != user.id
                && (existing.email == user.email || existing.user_name == user.user_name)
        });

        match clash {
            Some(existing) if existing.email == user.email => Err(RepoError::Constraint(
                "duplicate key value violates unique constraint \"users_email_key\"".to_string(),
            )),
            Some(_) => Err(RepoError::Constraint(
                "duplicate key value violates unique constraint \"users_user_name_key\""
                    .to_string(),
            )),
            None => Ok(()),
        }
    }

    async fn author(&self, id: Uuid) -> Option<AuthorRef> {
        self.store.read().await.get(&id).map(|user| AuthorRef {
            id: user.id,
            email: user.email.clone(),
        })
    }
}

#[async_trait]
impl BaseRepository<User, Uuid> for InMemoryUserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        Ok(self.store.read().await.get(&id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<User>, RepoError> {
        let mut users: Vec<User> = self.store.read().await.values().cloned().collect();
        users.sort_by_key(|user| user.created_at);
        Ok(users)
    }

    async fn insert(&self, user: User) -> Result<User, RepoError> {
        let mut store = self.store.write().await;
        if store.contains_key(&user.id) {
            return Err(RepoError::Constraint("duplicate primary key".to_string()));
        }
        Self::check_unique(&store, &user)?;

        store.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, user: User) -> Result<User, RepoError> {
        let mut store = self.store.write().await;
        if !store.contains_key(&user.id) {
            return Err(RepoError::NotFound);
        }
        Self::check_unique(&store, &user)?;

        store.insert(user.id, user.clone());
        Ok(user)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        self.store
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        tracing::debug!(user_email = %mask_email(email), "Finding user by email (in-memory)");

        Ok(self
            .store
            .read()
            .await
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn find_by_user_name(&self, user_name: &str) -> Result<Option<User>, RepoError> {
        Ok(self
            .store
            .read()
            .await
            .values()
            .find(|user| user.user_name == user_name)
            .cloned())
    }
}

/// Post store keyed by id. Joins authors against the shared user store.
pub struct InMemoryPostRepository {
    store: RwLock<HashMap<Uuid, Post>>,
    users: Arc<InMemoryUserRepository>,
}

impl InMemoryPostRepository {
    pub fn new(users: Arc<InMemoryUserRepository>) -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
            users,
        }
    }

    /// Join the author, clearing `author_id` if that user no longer exists.
    async fn with_author(&self, mut post: Post) -> PostDetails {
        let author = match post.author_id {
            Some(id) => self.users.author(id).await,
            None => None,
        };
        if author.is_none() {
            post.author_id = None;
        }
        PostDetails { post, author }
    }
}

#[async_trait]
impl BaseRepository<Post, Uuid> for InMemoryPostRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Post>, RepoError> {
        let post = self.store.read().await.get(&id).cloned();
        match post {
            Some(post) => Ok(Some(self.with_author(post).await.post)),
            None => Ok(None),
        }
    }

    async fn find_all(&self) -> Result<Vec<Post>, RepoError> {
        let posts: Vec<Post> = self.store.read().await.values().cloned().collect();

        let mut resolved = Vec::with_capacity(posts.len());
        for post in posts {
            resolved.push(self.with_author(post).await.post);
        }
        Ok(resolved)
    }

    async fn insert(&self, post: Post) -> Result<Post, RepoError> {
        if let Some(author_id) = post.author_id {
            if self.users.author(author_id).await.is_none() {
                return Err(RepoError::Constraint(format!(
                    "author {} does not exist",
                    author_id
                )));
            }
        }

        let mut store = self.store.write().await;
        if store.contains_key(&post.id) {
            return Err(RepoError::Constraint("duplicate primary key".to_string()));
        }
        store.insert(post.id, post.clone());
        Ok(post)
    }

    async fn update(&self, post: Post) -> Result<Post, RepoError> {
        let mut store = self.store.write().await;
        match store.get_mut(&post.id) {
            Some(existing) => {
                *existing = post.clone();
                Ok(post)
            }
            None => Err(RepoError::NotFound),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        self.store
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl PostRepository for InMemoryPostRepository {
    async fn find_recent(&self, limit: u64) -> Result<Vec<PostDetails>, RepoError> {
        let mut posts: Vec<Post> = self.store.read().await.values().cloned().collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        posts.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

        let mut details = Vec::with_capacity(posts.len());
        for post in posts {
            details.push(self.with_author(post).await);
        }
        Ok(details)
    }

    async fn find_with_author(&self, id: Uuid) -> Result<Option<PostDetails>, RepoError> {
        let post = self.store.read().await.get(&id).cloned();
        match post {
            Some(post) => Ok(Some(self.with_author(post).await)),
            None => Ok(None),
        }
    }
}
