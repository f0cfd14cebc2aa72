//! Message persistence
//!
//! [`MessageStore`] is the two-statement interface the server delegates to.
//! [`SqliteStore`] implements it over a single SQLite connection that stays
//! open for the lifetime of the process.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::future::Future;
use std::str::FromStr;
use thiserror::Error;

/// Maximum length of a message body, in characters
pub const MAX_MESSAGE_LEN: usize = 500;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS messages (\
     id INTEGER PRIMARY KEY AUTOINCREMENT, \
     message VARCHAR(500) NOT NULL CHECK (length(message) <= 500))";

/// A failed data access, with the operation that failed and the driver cause
#[derive(Debug, Error)]
#[error("{context}: {source}")]
pub struct StoreError {
    pub context: &'static str,
    #[source]
    pub source: sqlx::Error,
}

impl StoreError {
    fn new(context: &'static str, source: sqlx::Error) -> Self {
        Self { context, source }
    }
}

/// Persistence backend for messages
pub trait MessageStore: Send + Sync + 'static {
    /// Insert a message and return its generated id.
    fn save(&self, text: &str) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// Return every stored message body containing `substring`, oldest first.
    fn find(&self, substring: &str)
        -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;
}

/// SQLite-backed message store.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the database at `url` and create the `messages` table if missing.
    ///
    /// The pool holds exactly one connection with no idle timeout or max
    /// lifetime, so `sqlite::memory:` keeps its contents across calls.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::new("invalid database url", e))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::new("could not open database", e))?;

        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::new("could not create messages table", e))?;

        tracing::info!("Opened message store at {}", url);

        Ok(Self { pool })
    }

    /// Close the underlying connection. Later calls fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl MessageStore for SqliteStore {
    async fn save(&self, text: &str) -> Result<i64, StoreError> {
        let result = sqlx::query("INSERT INTO messages(message) VALUES (?1)")
            .bind(text)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::new("could not insert message", e))?;
        Ok(result.last_insert_rowid())
    }

    async fn find(&self, substring: &str) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar::<_, String>(
            "SELECT message FROM messages WHERE message LIKE ?1 ORDER BY id",
        )
        .bind(format!("%{}%", substring))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::new("could not find messages", e))
    }
}
