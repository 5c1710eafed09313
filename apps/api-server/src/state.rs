//! Application state - shared across all handlers.

use std::sync::Arc;

use quill_core::ports::{
    CoverStore, PasswordService, PostRepository, TokenService, UserRepository,
};
use quill_infra::{
    Argon2PasswordService, InMemoryPostRepository, InMemoryUserRepository, JwtTokenService,
    LocalCoverStore,
};

#[cfg(feature = "postgres")]
use quill_infra::{DatabaseHandle, PostgresPostRepository, PostgresUserRepository};

use crate::config::AppConfig;

/// URL prefix static covers are served under.
pub const UPLOADS_ROUTE: &str = "/uploads";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub tokens: Arc<dyn TokenService>,
    pub passwords: Arc<dyn PasswordService>,
    pub covers: Arc<dyn CoverStore>,
    pub upload_max_bytes: usize,
}

impl AppState {
    /// Build the application state, preferring the configured database.
    pub async fn new(config: &AppConfig) -> Self {
        #[cfg(feature = "postgres")]
        {
            if let Some(state) = Self::from_database(config).await {
                tracing::info!("Application state initialized (postgres)");
                return state;
            }
        }

        #[cfg(not(feature = "postgres"))]
        tracing::info!("Running without postgres feature - using in-memory repositories");

        tracing::info!("Application state initialized (in-memory)");
        Self::in_memory(config)
    }

    /// State backed by in-memory repositories. Data is lost on restart.
    pub fn in_memory(config: &AppConfig) -> Self {
        let users = Arc::new(InMemoryUserRepository::new());
        let posts = Arc::new(InMemoryPostRepository::new(users.clone()));

        Self::assemble(config, users, posts)
    }

    #[cfg(feature = "postgres")]
    async fn from_database(config: &AppConfig) -> Option<Self> {
        use migration::{Migrator, MigratorTrait};

        let Some(db_config) = &config.database else {
            tracing::warn!(
                "No database configured (DATABASE_URL or DB_HOST/DB_NAME). Running in-memory."
            );
            return None;
        };

        let handle = match DatabaseHandle::connect(db_config).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(
                    "Failed to connect to database: {}. Using in-memory fallback.",
                    e
                );
                return None;
            }
        };

        if config.auto_migrate {
            if let Err(e) = Migrator::up(handle.conn.as_ref(), None).await {
                tracing::error!(
                    "Failed to apply migrations: {}. Using in-memory fallback.",
                    e
                );
                return None;
            }
            tracing::info!("Database migrations applied");
        }

        let users = Arc::new(PostgresUserRepository::new(Arc::clone(&handle.conn)));
        let posts = Arc::new(PostgresPostRepository::new(handle.conn));

        Some(Self::assemble(config, users, posts))
    }

    fn assemble(
        config: &AppConfig,
        users: Arc<dyn UserRepository>,
        posts: Arc<dyn PostRepository>,
    ) -> Self {
        let covers = LocalCoverStore::new(
            config.upload_dir.clone(),
            UPLOADS_ROUTE.trim_start_matches('/'),
        );

        Self {
            users,
            posts,
            tokens: Arc::new(JwtTokenService::new(config.jwt.clone())),
            passwords: Arc::new(Argon2PasswordService::new()),
            covers: Arc::new(covers),
            upload_max_bytes: config.upload_max_bytes,
        }
    }
}
