use crate::config::DatabaseSettings;
use crate::error::StoreError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::FromRow;
use tracing::{debug, info, instrument, warn};

/// A stored note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Note {
    /// Assigned by the database, increasing
    pub id: i64,
    pub body: String,
}

/// Read/append access to notes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// All notes, newest (highest id) first
    async fn list_notes(&self) -> Result<Vec<Note>, StoreError>;

    /// Insert a note. A missing body is stored as an empty string.
    async fn create_note(&self, body: Option<String>) -> Result<Note, StoreError>;
}

/// PostgreSQL-backed note store over a shared connection pool
pub struct PgNoteStore {
    /// `Err` holds the reason no pool could be configured (a malformed port)
    pool: std::result::Result<PgPool, String>,
}

impl PgNoteStore {
    /// Build the pool without connecting.
    ///
    /// Never fails. Connections are opened on first use, so an unreachable
    /// database or a malformed port shows up as a [`StoreError`] on every
    /// request rather than at startup.
    pub fn new(config: &DatabaseSettings) -> Self {
        let port: u16 = match config.port.parse() {
            Ok(port) => port,
            Err(e) => {
                warn!(port = %config.port, error = %e, "Invalid database port, queries will fail");
                return Self {
                    pool: Err(format!("invalid database port {:?}: {}", config.port, e)),
                };
            }
        };

        // Require encrypts the connection but does not verify the server certificate
        let ssl_mode = if config.requires_encrypted_transport {
            PgSslMode::Require
        } else {
            PgSslMode::Disable
        };

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(port)
            .database(&config.name)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode);

        let pool = PgPoolOptions::new().connect_lazy_with(options);

        info!(
            host = %config.host,
            database = %config.name,
            ssl = config.requires_encrypted_transport,
            "PostgreSQL pool configured"
        );

        Self { pool: Ok(pool) }
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool: Ok(pool) }
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(self.pool()?)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool, or the configuration error that prevented it
    pub fn pool(&self) -> std::result::Result<&PgPool, StoreError> {
        self.pool
            .as_ref()
            .map_err(|reason| StoreError(sqlx::Error::Configuration(reason.clone().into())))
    }
}

#[async_trait]
impl NoteStore for PgNoteStore {
    #[instrument(skip(self))]
    async fn list_notes(&self) -> Result<Vec<Note>, StoreError> {
        let notes = sqlx::query_as::<_, Note>(
            r#"
            SELECT id::int8 AS id, COALESCE(body, '') AS body
            FROM notes
            ORDER BY id DESC
            "#,
        )
        .fetch_all(self.pool()?)
        .await?;

        debug!(count = notes.len(), "Listed notes");
        metrics::counter!("notes.listed").increment(1);

        Ok(notes)
    }

    #[instrument(skip(self, body))]
    async fn create_note(&self, body: Option<String>) -> Result<Note, StoreError> {
        let note = sqlx::query_as::<_, Note>(
            r#"
            INSERT INTO notes (body) VALUES ($1)
            RETURNING id::int8 AS id, COALESCE(body, '') AS body
            "#,
        )
        .bind(body.unwrap_or_default())
        .fetch_one(self.pool()?)
        .await?;

        debug!(note_id = note.id, "Note created");
        metrics::counter!("notes.created").increment(1);

        Ok(note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PasswordSource;
    use crate::error::ApiError;

    fn database_settings(host: &str, port: &str) -> DatabaseSettings {
        DatabaseSettings {
            host: host.to_string(),
            port: port.to_string(),
            name: "appdb".to_string(),
            user: "appuser".to_string(),
            password: "apppass".to_string(),
            password_source: PasswordSource::Default,
            requires_encrypted_transport: host != "localhost",
        }
    }

    #[tokio::test]
    async fn test_pool_is_lazy() {
        // Nothing listens here; building the store must still succeed
        let store = PgNoteStore::new(&database_settings("localhost", "1"));
        assert!(store.pool().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_port_fails_on_use() {
        let store = PgNoteStore::new(&database_settings("localhost", "abc"));

        let err = store.list_notes().await.unwrap_err();
        assert!(err.to_string().contains("abc"));
        assert_eq!(ApiError::from(err).code(), "DB_ERROR");

        let err = store.create_note(Some("x".to_string())).await.unwrap_err();
        assert!(matches!(err.0, sqlx::Error::Configuration(_)));
    }

    #[test]
    fn test_note_serializes_as_id_and_body() {
        let note = Note {
            id: 7,
            body: "hello".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&note).unwrap(),
            serde_json::json!({ "id": 7, "body": "hello" })
        );
    }
}
