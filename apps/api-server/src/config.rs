//! Application configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use quill_infra::{DatabaseConfig, JwtConfig};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database: Option<DatabaseConfig>,
    /// Run pending migrations before serving.
    pub auto_migrate: bool,
    pub jwt: JwtConfig,
    pub upload_dir: PathBuf,
    pub upload_max_bytes: usize,
    pub cors_origin: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            database: None,
            auto_migrate: true,
            jwt: JwtConfig::default(),
            upload_dir: PathBuf::from("uploads"),
            upload_max_bytes: 10 * 1024 * 1024,
            cors_origin: "http://localhost:5173".to_string(),
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parsed("SERVER_PORT")
                .or_else(|| parsed("PORT"))
                .unwrap_or(defaults.port),
            database: Self::database_from_env(),
            auto_migrate: env::var("DB_AUTO_MIGRATE")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.auto_migrate),
            jwt: Self::jwt_from_env(),
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            upload_max_bytes: parsed("UPLOAD_MAX_BYTES").unwrap_or(defaults.upload_max_bytes),
            cors_origin: env::var("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
        }
    }

    /// `DATABASE_URL` wins; otherwise `DB_HOST` and `DB_NAME` must both be set.
    fn database_from_env() -> Option<DatabaseConfig> {
        let url = env::var("DATABASE_URL").ok().or_else(|| {
            let host = env::var("DB_HOST").ok()?;
            let name = env::var("DB_NAME").ok()?;
            let port = parsed("DB_PORT").unwrap_or(5432);
            let user = env::var("DB_USER").ok();
            let password = env::var("DB_PASSWORD").ok();

            match DatabaseConfig::postgres_url(
                &host,
                port,
                &name,
                user.as_deref(),
                password.as_deref(),
            ) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::error!(db_host = %host, "Invalid database settings: {}", e);
                    None
                }
            }
        })?;

        Some(DatabaseConfig {
            url,
            max_connections: parsed("DB_MAX_CONNECTIONS").unwrap_or(20),
            min_connections: parsed("DB_MIN_CONNECTIONS").unwrap_or(2),
        })
    }

    fn jwt_from_env() -> JwtConfig {
        let defaults = JwtConfig::default();
        let config = JwtConfig {
            secret: env::var("JWT_SECRET").unwrap_or(defaults.secret),
            expiration_hours: parsed("JWT_EXPIRATION_HOURS")
                .map(JwtConfig::bounded_expiration_hours)
                .unwrap_or(defaults.expiration_hours),
            issuer: env::var("JWT_ISSUER").unwrap_or(defaults.issuer),
        };

        // Warn if using default secret in production
        if config.uses_default_secret() {
            let is_production = env::var("RUST_ENV")
                .map(|v| v == "production" || v == "prod")
                .unwrap_or(false);

            if is_production {
                tracing::error!(
                    "SECURITY: Using default JWT secret in production! Set JWT_SECRET environment variable."
                );
            } else {
                tracing::warn!("Using default JWT secret. Set JWT_SECRET for production use.");
            }
        }

        config
    }
}
