#[cfg(feature = "postgres")]
use std::sync::Arc;
#[cfg(feature = "postgres")]
use std::time::Duration;

#[cfg(feature = "postgres")]
use sea_orm::{ConnectOptions, Database, DbConn, DbErr};
use url::{ParseError, Url};

/// Connection settings for the primary database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl DatabaseConfig {
    /// Build a PostgreSQL URL from its parts. Credentials are optional and
    /// percent-encoded.
    pub fn postgres_url(
        host: &str,
        port: u16,
        name: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<String, ParseError> {
        let mut url = Url::parse(&format!("postgres://{}:{}", host, port))?;
        url.path_segments_mut()
            .map_err(|_| ParseError::RelativeUrlWithCannotBeABaseBase)?
            .push(name);

        if let Some(user) = user {
            url.set_username(user).map_err(|_| ParseError::EmptyHost)?;
            url.set_password(password).map_err(|_| ParseError::EmptyHost)?;
        }

        Ok(url.into())
    }

    /// URL with the password replaced, for logging.
    pub fn redacted_url(&self) -> String {
        match (self.url.find("://"), self.url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                let userinfo = &self.url[scheme_end + 3..at];
                let user = userinfo.split(':').next().unwrap_or_default();
                format!("{}{}:***{}", &self.url[..scheme_end + 3], user, &self.url[at..])
            }
            _ => self.url.clone(),
        }
    }
}

/// Handle to the primary connection pool, created once at startup. Repositories
/// share the pool through `conn`.
#[cfg(feature = "postgres")]
pub struct DatabaseHandle {
    pub conn: Arc<DbConn>,
}

#[cfg(feature = "postgres")]
impl DatabaseHandle {
    /// Open the connection pool described by `config`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbErr> {
        tracing::info!(url = %config.redacted_url(), "Connecting to database...");

        let opts = ConnectOptions::new(&config.url)
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .sqlx_logging(false)
            .to_owned();

        let conn = Database::connect(opts).await?;
        tracing::info!(
            "Database connected (pool: {}-{})",
            config.min_connections,
            config.max_connections
        );

        Ok(Self {
            conn: Arc::new(conn),
        })
    }
}
